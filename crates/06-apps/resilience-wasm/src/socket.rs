use js_sys::{Function, Object, Reflect, Uint8Array};
use resilience_layer::{Message, ReconnectHandle, SessionEvent, SubscriptionId};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Reconnecting socket handed to page code.
#[wasm_bindgen]
pub struct JsSocket {
    handle: ReconnectHandle,
}

impl JsSocket {
    pub(crate) fn new(handle: ReconnectHandle) -> Self {
        Self { handle }
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Connecting { .. } => "connecting",
        SessionEvent::Open => "open",
        SessionEvent::Message(_) => "message",
        SessionEvent::Error(_) => "error",
        SessionEvent::Closed { .. } => "close",
        SessionEvent::Reconnecting { .. } => "reconnecting",
        SessionEvent::Disabled(_) => "disabled",
    }
}

fn message_to_js(message: &Message) -> JsValue {
    match message {
        Message::Text(text) => JsValue::from_str(text),
        Message::Binary(bytes) => Uint8Array::from(&bytes[..]).into(),
    }
}

fn event_payload(event: &SessionEvent) -> Result<JsValue, JsValue> {
    Ok(match event {
        SessionEvent::Message(message) => message_to_js(message),
        SessionEvent::Error(detail) => JsValue::from_str(detail),
        SessionEvent::Closed {
            code,
            reason,
            clean,
        } => {
            let o = Object::new();
            Reflect::set(&o, &"code".into(), &JsValue::from(*code))?;
            Reflect::set(&o, &"reason".into(), &JsValue::from_str(reason))?;
            Reflect::set(&o, &"clean".into(), &JsValue::from_bool(*clean))?;
            o.into()
        }
        SessionEvent::Connecting { attempt } => JsValue::from(*attempt),
        SessionEvent::Reconnecting { attempt, delay } => {
            let o = Object::new();
            Reflect::set(&o, &"attempt".into(), &JsValue::from(*attempt))?;
            Reflect::set(
                &o,
                &"delayMs".into(),
                &JsValue::from_f64(delay.as_millis() as f64),
            )?;
            o.into()
        }
        SessionEvent::Disabled(reason) => JsValue::from_str(&format!("{reason:?}")),
        SessionEvent::Open => JsValue::UNDEFINED,
    })
}

#[wasm_bindgen]
impl JsSocket {
    /// Sends a string or a `Uint8Array`.
    pub fn send(&self, data: JsValue) -> Result<(), JsValue> {
        let message = if let Some(text) = data.as_string() {
            Message::Text(text)
        } else if let Some(bytes) = data.dyn_ref::<Uint8Array>() {
            Message::Binary(bytes.to_vec())
        } else {
            return Err(JsValue::from_str("send expects a string or Uint8Array"));
        };
        self.handle
            .send(message)
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    pub fn close(&self) {
        self.handle.close();
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.handle.state().as_str().to_owned()
    }

    #[wasm_bindgen(getter)]
    pub fn attempts(&self) -> u32 {
        self.handle.attempts()
    }

    /// Calls `callback(payload)` for every `event` (`open`, `message`,
    /// `error`, `close`, `connecting`, `reconnecting`, `disabled`). Returns a
    /// handle for [`JsSocket::off`].
    pub fn on(&self, event: String, callback: Function) -> f64 {
        let id = self.handle.subscribe(move |session_event| {
            if event_name(session_event) != event {
                return;
            }
            let delivered = event_payload(session_event)
                .and_then(|payload| callback.call1(&JsValue::NULL, &payload));
            if let Err(err) = delivered {
                log::warn!("socket `{event}` listener threw: {err:?}");
            }
        });
        id.0 as f64
    }

    pub fn off(&self, id: f64) -> bool {
        self.handle.unsubscribe(SubscriptionId(id as u64))
    }
}
