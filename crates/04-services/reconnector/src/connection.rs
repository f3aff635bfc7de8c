//! Platform boundary: the underlying duplex connection.
//!
//! A [`Connector`] opens raw connections (a browser `WebSocket`, a mock in
//! tests). Each raw connection reports back through the [`TransportSink`] it was
//! handed; the sink is tagged with a generation so that late events from a
//! connection the session already replaced are dropped.

use std::cell::RefCell;
use std::rc::Weak;

use log::trace;

use crate::error::TransportResult;
use crate::session::SessionCore;
use crate::state::{CloseInfo, Input};

/// Payload carried over the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Text(value.to_owned())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Binary(value)
    }
}

/// One raw, non-reconnecting connection.
pub trait Connection {
    fn send(&self, message: &Message) -> TransportResult<()>;

    /// Starts closing the connection. The sink is not required to report the close.
    fn close(&self, code: u16, reason: &str);
}

/// Opens raw connections.
pub trait Connector {
    /// Starts opening `url`. Progress is reported through `sink`, possibly
    /// before this call returns.
    fn connect(&self, url: &str, sink: TransportSink) -> TransportResult<Box<dyn Connection>>;
}

/// Event entry point handed to each raw connection.
#[derive(Clone)]
pub struct TransportSink {
    generation: u64,
    session: Weak<RefCell<SessionCore>>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, session: Weak<RefCell<SessionCore>>) -> Self {
        Self {
            generation,
            session,
        }
    }

    /// Generation of the connection this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while the owning session still exists and this connection is current.
    pub fn is_current(&self) -> bool {
        self.session
            .upgrade()
            .is_some_and(|core| core.borrow().generation == self.generation)
    }

    pub fn opened(&self) {
        self.deliver(Delivery::Input(Input::Opened));
    }

    pub fn message(&self, message: Message) {
        self.deliver(Delivery::Message(message));
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.deliver(Delivery::Error(detail.into()));
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        self.deliver(Delivery::Input(Input::Closed(CloseInfo::new(code, reason))));
    }

    fn deliver(&self, delivery: Delivery) {
        let Some(core) = self.session.upgrade() else {
            trace!("transport event after session was discarded; dropping");
            return;
        };
        if core.borrow().generation != self.generation {
            trace!(
                "stale transport event from generation {}; dropping",
                self.generation
            );
            return;
        }
        SessionCore::dispatch(&core, delivery);
    }
}

/// Raw event travelling from a connection into its session.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// Opens the first connection of a session.
    Start,
    Input(Input),
    Message(Message),
    Error(String),
}
