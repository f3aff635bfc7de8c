use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use log::trace;
use reconnector::{Connection, Connector, Message, TransportError, TransportResult, TransportSink};

/// What the next `connect` call does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectScript {
    /// Reports `open` before `connect` returns.
    Open,
    /// Leaves the connection connecting; drive it through [`MockConnection`].
    Pending,
    /// `connect` itself fails.
    Refuse(String),
    /// The peer closes with this code before the connection opens.
    CloseWith(u16),
}

struct ConnectionState {
    url: String,
    sink: TransportSink,
    sent: RefCell<Vec<Message>>,
    closed_by_client: RefCell<Option<(u16, String)>>,
    fail_sends: Cell<bool>,
}

/// Test-side view of one raw connection opened by a session.
#[derive(Clone)]
pub struct MockConnection {
    state: Rc<ConnectionState>,
}

impl MockConnection {
    fn new(url: &str, sink: TransportSink) -> Self {
        Self {
            state: Rc::new(ConnectionState {
                url: url.to_owned(),
                sink,
                sent: RefCell::new(Vec::new()),
                closed_by_client: RefCell::new(None),
                fail_sends: Cell::new(false),
            }),
        }
    }

    pub fn url(&self) -> String {
        self.state.url.clone()
    }

    /// True while the session still routes this connection's events.
    pub fn is_current(&self) -> bool {
        self.state.sink.is_current()
    }

    pub fn open(&self) {
        self.state.sink.opened();
    }

    pub fn receive(&self, message: impl Into<Message>) {
        self.state.sink.message(message.into());
    }

    pub fn error(&self, detail: &str) {
        self.state.sink.error(detail);
    }

    /// Closes from the remote side.
    pub fn close_remote(&self, code: u16, reason: &str) {
        self.state.sink.closed(code, reason);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.state.sent.borrow().clone()
    }

    /// Code and reason the session closed this connection with, if it did.
    pub fn closed_by_client(&self) -> Option<(u16, String)> {
        self.state.closed_by_client.borrow().clone()
    }

    /// Makes every following `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.set(fail);
    }
}

impl Connection for MockConnection {
    fn send(&self, message: &Message) -> TransportResult<()> {
        if self.state.closed_by_client.borrow().is_some() {
            return Err(TransportError::Send("connection closed".to_owned()));
        }
        if self.state.fail_sends.get() {
            return Err(TransportError::Send("send refused by mock".to_owned()));
        }
        self.state.sent.borrow_mut().push(message.clone());
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        trace!("mock connection to {} closed by client ({code})", self.state.url);
        *self.state.closed_by_client.borrow_mut() = Some((code, reason.to_owned()));
    }
}

/// Connector whose behavior is scripted per `connect` call.
pub struct MockConnector {
    scripts: RefCell<VecDeque<ConnectScript>>,
    fallback: RefCell<ConnectScript>,
    connections: RefCell<Vec<MockConnection>>,
    attempts: RefCell<Vec<String>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Every connection stays pending until driven.
    pub fn new() -> Self {
        Self::with_fallback(ConnectScript::Pending)
    }

    /// Uses `fallback` once the scripted queue is empty.
    pub fn with_fallback(fallback: ConnectScript) -> Self {
        Self {
            scripts: RefCell::new(VecDeque::new()),
            fallback: RefCell::new(fallback),
            connections: RefCell::new(Vec::new()),
            attempts: RefCell::new(Vec::new()),
        }
    }

    /// Queues behavior for the next unscripted `connect`.
    pub fn script(&self, script: ConnectScript) {
        self.scripts.borrow_mut().push_back(script);
    }

    pub fn set_fallback(&self, script: ConnectScript) {
        *self.fallback.borrow_mut() = script;
    }

    /// Number of `connect` calls, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.attempts.borrow().len()
    }

    pub fn connections(&self) -> Vec<MockConnection> {
        self.connections.borrow().clone()
    }

    /// Most recently created connection.
    pub fn last(&self) -> Option<MockConnection> {
        self.connections.borrow().last().cloned()
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: &str, sink: TransportSink) -> TransportResult<Box<dyn Connection>> {
        self.attempts.borrow_mut().push(url.to_owned());
        let script = self
            .scripts
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.borrow().clone());
        if let ConnectScript::Refuse(detail) = script {
            return Err(TransportError::Connect(detail));
        }
        let conn = MockConnection::new(url, sink);
        self.connections.borrow_mut().push(conn.clone());
        match script {
            ConnectScript::Open => conn.open(),
            ConnectScript::CloseWith(code) => conn.close_remote(code, "scripted close"),
            ConnectScript::Pending | ConnectScript::Refuse(_) => {}
        }
        Ok(Box::new(conn))
    }
}
