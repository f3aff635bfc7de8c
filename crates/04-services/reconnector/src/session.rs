//! Session driver: applies the pure state machine to a real connection.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, trace, warn};
use resilience_core::{EventBus, SharedTimers, SubscriptionId, TimerId};

use crate::connection::{Connection, Connector, Delivery, Message, TransportSink};
use crate::error::{TransportError, TransportResult};
use crate::policy::{ReconnectPolicy, CLOSE_ABNORMAL};
use crate::state::{self, ConnState, Effect, Input, SessionEvent, SessionState};

/// Stable identity of a session; survives reconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

pub(crate) struct SessionCore {
    id: SessionId,
    url: String,
    policy: ReconnectPolicy,
    state: SessionState,
    started: bool,
    /// Bumped whenever the current raw connection is replaced or dropped.
    pub(crate) generation: u64,
    connection: Option<Rc<dyn Connection>>,
    reconnect_timer: Option<TimerId>,
    queue: VecDeque<Delivery>,
    dispatching: bool,
    connector: Rc<dyn Connector>,
    timers: SharedTimers,
    events: EventBus<SessionEvent>,
    self_ref: Weak<RefCell<SessionCore>>,
}

impl SessionCore {
    /// Queues `delivery` and drains the queue unless a drain is already running.
    ///
    /// No borrow of the core is held while effects run, so connectors, timers
    /// and listeners may call back into the session synchronously.
    pub(crate) fn dispatch(core: &Rc<RefCell<Self>>, delivery: Delivery) {
        {
            let mut inner = core.borrow_mut();
            inner.queue.push_back(delivery);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }
        loop {
            let next = core.borrow_mut().queue.pop_front();
            match next {
                Some(delivery) => Self::process(core, delivery),
                None => break,
            }
        }
        core.borrow_mut().dispatching = false;
    }

    fn process(core: &Rc<RefCell<Self>>, delivery: Delivery) {
        match delivery {
            Delivery::Start => {
                Self::apply(
                    core,
                    Effect::Emit(SessionEvent::Connecting { attempt: 0 }),
                );
                Self::apply(core, Effect::OpenConnection);
            }
            Delivery::Message(message) => {
                let events = core.borrow().events.clone();
                events.emit(&SessionEvent::Message(message));
            }
            Delivery::Error(detail) => {
                let (events, id) = {
                    let inner = core.borrow();
                    (inner.events.clone(), inner.id)
                };
                debug!("{id}: transport error: {detail}");
                events.emit(&SessionEvent::Error(detail));
            }
            Delivery::Input(input) => {
                let effects = {
                    let mut inner = core.borrow_mut();
                    let step = state::step(inner.state, &input, &inner.policy);
                    if step.next.phase != inner.state.phase {
                        debug!(
                            "{}: {} -> {} (attempts {})",
                            inner.id, inner.state.phase, step.next.phase, step.next.attempts
                        );
                    } else if step.effects.is_empty() {
                        trace!("{}: ignored {input:?} in {}", inner.id, inner.state.phase);
                    }
                    inner.state = step.next;
                    step.effects
                };
                for effect in effects {
                    Self::apply(core, effect);
                }
            }
        }
    }

    fn apply(core: &Rc<RefCell<Self>>, effect: Effect) {
        match effect {
            Effect::OpenConnection => Self::open(core),
            Effect::CloseConnection { code, reason } => {
                if let Some(conn) = Self::detach(core) {
                    conn.close(code, reason);
                }
            }
            Effect::DropConnection => {
                drop(Self::detach(core));
            }
            Effect::ScheduleReconnect(delay) => {
                let (timers, weak) = {
                    let inner = core.borrow();
                    (Rc::clone(&inner.timers), inner.self_ref.clone())
                };
                let id = timers.set_timeout(
                    delay,
                    Box::new(move || {
                        let Some(core) = weak.upgrade() else {
                            return;
                        };
                        core.borrow_mut().reconnect_timer = None;
                        SessionCore::dispatch(&core, Delivery::Input(Input::ReconnectDue));
                    }),
                );
                core.borrow_mut().reconnect_timer = Some(id);
            }
            Effect::CancelReconnect => {
                let (timers, pending) = {
                    let mut inner = core.borrow_mut();
                    (Rc::clone(&inner.timers), inner.reconnect_timer.take())
                };
                if let Some(id) = pending {
                    timers.clear_timeout(id);
                }
            }
            Effect::Emit(event) => {
                let events = core.borrow().events.clone();
                if let SessionEvent::Disabled(reason) = &event {
                    warn!("{}: disabled: {reason:?}", core.borrow().id);
                }
                events.emit(&event);
            }
        }
    }

    /// Takes the current connection and invalidates its sink.
    fn detach(core: &Rc<RefCell<Self>>) -> Option<Rc<dyn Connection>> {
        let mut inner = core.borrow_mut();
        inner.generation += 1;
        inner.connection.take()
    }

    fn open(core: &Rc<RefCell<Self>>) {
        let (connector, url, sink, id) = {
            let mut inner = core.borrow_mut();
            inner.generation += 1;
            let sink = TransportSink::new(inner.generation, inner.self_ref.clone());
            (
                Rc::clone(&inner.connector),
                inner.url.clone(),
                sink,
                inner.id,
            )
        };
        match connector.connect(&url, sink.clone()) {
            Ok(conn) => {
                let conn: Rc<dyn Connection> = Rc::from(conn);
                let stale = {
                    let mut inner = core.borrow_mut();
                    if inner.generation == sink.generation() && !inner.state.phase.is_terminal() {
                        inner.connection = Some(Rc::clone(&conn));
                        false
                    } else {
                        true
                    }
                };
                if stale {
                    trace!("{id}: connection superseded during connect; closing it");
                    conn.close(crate::policy::CLOSE_NORMAL, "superseded");
                }
            }
            Err(err) => {
                warn!("{id}: connect to {url} failed: {err}");
                sink.error(err.to_string());
                sink.closed(CLOSE_ABNORMAL, err.to_string());
            }
        }
    }
}

/// Handle to a reconnecting session.
///
/// Cloning the handle shares the session.
#[derive(Clone)]
pub struct ReconnectHandle {
    core: Rc<RefCell<SessionCore>>,
}

impl ReconnectHandle {
    pub fn session_id(&self) -> SessionId {
        self.core.borrow().id
    }

    pub fn url(&self) -> String {
        self.core.borrow().url.clone()
    }

    pub fn state(&self) -> ConnState {
        self.core.borrow().state.phase
    }

    /// Reconnects performed since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.core.borrow().state.attempts
    }

    pub fn is_disabled(&self) -> bool {
        self.core.borrow().state.is_disabled()
    }

    /// True while a reconnect timer is outstanding.
    pub fn reconnect_pending(&self) -> bool {
        self.core.borrow().reconnect_timer.is_some()
    }

    /// Opens the first connection. Calling it again has no effect.
    pub fn start(&self) {
        {
            let mut inner = self.core.borrow_mut();
            if inner.started {
                return;
            }
            inner.started = true;
        }
        SessionCore::dispatch(&self.core, Delivery::Start);
    }

    /// Sends over the current connection.
    pub fn send(&self, message: impl Into<Message>) -> TransportResult<()> {
        let conn = {
            let inner = self.core.borrow();
            match inner.state.phase {
                ConnState::Open => inner.connection.clone(),
                ConnState::Disabled(_) => return Err(TransportError::Disabled),
                ConnState::ClosedClean => return Err(TransportError::Closed),
                other => return Err(TransportError::NotOpen(other.as_str())),
            }
        };
        match conn {
            Some(conn) => conn.send(&message.into()),
            None => Err(TransportError::NotOpen("open")),
        }
    }

    /// Closes the session cleanly, cancelling any pending reconnect.
    pub fn close(&self) {
        SessionCore::dispatch(&self.core, Delivery::Input(Input::CloseRequested));
    }

    /// Observes every subsequent session event.
    pub fn subscribe(&self, listener: impl Fn(&SessionEvent) + 'static) -> SubscriptionId {
        self.core.borrow().events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.borrow().events.unsubscribe(id)
    }
}

/// Factory of reconnecting sessions over one [`Connector`].
pub struct Reconnector {
    connector: Rc<dyn Connector>,
    timers: SharedTimers,
    next_id: Cell<u64>,
}

impl Reconnector {
    pub fn new(connector: Rc<dyn Connector>, timers: SharedTimers) -> Self {
        Self {
            connector,
            timers,
            next_id: Cell::new(1),
        }
    }

    /// Creates a session without opening it, so listeners can subscribe first.
    pub fn session(&self, url: &str, policy: ReconnectPolicy) -> ReconnectHandle {
        let id = SessionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let core = Rc::new_cyclic(|weak| {
            RefCell::new(SessionCore {
                id,
                url: url.to_owned(),
                policy,
                state: SessionState::connecting(),
                started: false,
                generation: 0,
                connection: None,
                reconnect_timer: None,
                queue: VecDeque::new(),
                dispatching: false,
                connector: Rc::clone(&self.connector),
                timers: Rc::clone(&self.timers),
                events: EventBus::new(),
                self_ref: weak.clone(),
            })
        });
        ReconnectHandle { core }
    }

    /// Creates a session and opens its first connection.
    pub fn connect(&self, url: &str, policy: ReconnectPolicy) -> ReconnectHandle {
        let handle = self.session(url, policy);
        handle.start();
        handle
    }
}
