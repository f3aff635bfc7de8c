use js_sys::{ArrayBuffer, Uint8Array};
use log::{debug, trace};
use reconnector::{Connection, Connector, Message, TransportError, TransportResult, TransportSink};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BinaryType, CloseEvent, Event, MessageEvent, WebSocket};

use crate::describe_js;

/// Opens browser `WebSocket`s.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates the connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str, sink: TransportSink) -> TransportResult<Box<dyn Connection>> {
        let ws = WebSocket::new(url).map_err(|err| TransportError::Connect(describe_js(&err)))?;
        ws.set_binary_type(BinaryType::Arraybuffer);

        let on_open = {
            let sink = sink.clone();
            Closure::<dyn FnMut()>::new(move || sink.opened())
        };
        let on_message = {
            let sink = sink.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                let data = event.data();
                if let Some(text) = data.as_string() {
                    sink.message(Message::Text(text));
                } else if let Some(buffer) = data.dyn_ref::<ArrayBuffer>() {
                    sink.message(Message::Binary(Uint8Array::new(buffer).to_vec()));
                } else {
                    trace!("ignoring websocket message of unsupported type");
                }
            })
        };
        let on_error = {
            let sink = sink.clone();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| sink.error("websocket error"))
        };
        let on_close = Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            sink.closed(event.code(), event.reason());
        });

        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));
        debug!("websocket to {url} created");

        Ok(Box::new(BrowserSocket {
            ws,
            _on_open: on_open,
            _on_message: on_message,
            _on_error: on_error,
            _on_close: on_close,
        }))
    }
}

/// One `WebSocket` plus the handlers it calls into.
struct BrowserSocket {
    ws: WebSocket,
    _on_open: Closure<dyn FnMut()>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl Connection for BrowserSocket {
    fn send(&self, message: &Message) -> TransportResult<()> {
        let sent = match message {
            Message::Text(text) => self.ws.send_with_str(text),
            Message::Binary(bytes) => self.ws.send_with_u8_array(bytes),
        };
        sent.map_err(|err| TransportError::Send(describe_js(&err)))
    }

    fn close(&self, code: u16, reason: &str) {
        if let Err(err) = self.ws.close_with_code_and_reason(code, reason) {
            debug!("websocket close failed: {}", describe_js(&err));
        }
    }
}

impl Drop for BrowserSocket {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
        let state = self.ws.ready_state();
        if state == WebSocket::CONNECTING || state == WebSocket::OPEN {
            let _ = self.ws.close();
        }
    }
}
