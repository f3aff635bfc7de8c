use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use log::{debug, error, info, warn};
use resilience_core::{EscalationOutcome, EscalationTarget, EventBus, SubscriptionId};

use crate::degraded::DegradedRenderer;
use crate::error::{ArbiterError, RenderError};
use crate::queue::{PendingQueue, Priority};
use crate::surface::DisplaySurface;

/// Render action of a strategy. Runs once, after the lock is granted.
pub type RenderFn = Box<dyn FnOnce(RootLease) -> Result<(), RenderError>>;

/// Failed activations tolerated before degraded mode is forced.
pub const DEFAULT_ATTEMPT_CEILING: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbiterConfig {
    pub attempt_ceiling: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            attempt_ceiling: DEFAULT_ATTEMPT_CEILING,
        }
    }
}

/// Why a registration was turned away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Refusal {
    Degraded,
    /// Degraded mode is already requested and waits only for the holder.
    EscalationPending,
    /// A strictly better-ranked strategy holds the root.
    Outranked { holder: String, priority: Priority },
}

/// Everything the arbiter does, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArbiterEvent {
    Queued { name: String, priority: Priority },
    Refused { name: String, priority: Priority, reason: Refusal },
    Activated { name: String, priority: Priority },
    Released { name: String },
    /// A queued (never active) registration was taken back.
    Withdrawn { name: String },
    Failed { name: String, error: RenderError },
    /// Degraded mode was requested while `holder` owns the root.
    EscalationDeferred { holder: String },
    DegradedActivated { reason: String },
}

/// Status event published once when degraded mode takes over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegradedActivated {
    pub reason: String,
}

/// Read-only copy of the arbitration state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArbitrationSnapshot {
    pub holder: Option<(String, Priority)>,
    /// Queued registrations in activation order.
    pub pending: Vec<(String, Priority)>,
    pub attempts: u32,
    pub ceiling: u32,
    pub degraded: bool,
    pub escalation_pending: bool,
}

struct Entry {
    id: u64,
    name: String,
    render: RenderFn,
}

struct Holder {
    id: u64,
    name: String,
    priority: Priority,
}

struct ArbitrationState {
    holder: Option<Holder>,
    pending: PendingQueue<Entry>,
    attempts: u32,
    ceiling: u32,
    degraded: bool,
    escalation_pending: bool,
    batch_depth: u32,
    pumping: bool,
    next_id: u64,
}

impl ArbitrationState {
    /// After the holder gave the root back: escalate instead of promoting?
    ///
    /// An empty queue is not a reason; the root stays unowned until the next
    /// registration.
    fn must_escalate(&self) -> Option<&'static str> {
        if self.escalation_pending {
            Some("error budget exceeded")
        } else if self.attempts >= self.ceiling {
            Some("renderer attempt ceiling reached")
        } else {
            None
        }
    }
}

enum Next {
    Activate { entry: Entry, priority: Priority },
    Degrade(&'static str),
    Idle,
}

struct ArbiterInner {
    state: RefCell<ArbitrationState>,
    surface: Rc<dyn DisplaySurface>,
    degraded: DegradedRenderer,
    events: EventBus<ArbiterEvent>,
    status: EventBus<DegradedActivated>,
}

/// Single-owner lock over the display root.
///
/// Strategies register with a priority; the best one is activated and holds
/// the root until it fails or releases it, then the next one is promoted.
/// Promotion happens synchronously inside the call that freed the root.
/// Degraded mode is terminal.
#[derive(Clone)]
pub struct RenderArbiter {
    inner: Rc<ArbiterInner>,
}

impl RenderArbiter {
    pub fn new(
        surface: Rc<dyn DisplaySurface>,
        degraded: DegradedRenderer,
        config: ArbiterConfig,
    ) -> Self {
        Self {
            inner: Rc::new(ArbiterInner {
                state: RefCell::new(ArbitrationState {
                    holder: None,
                    pending: PendingQueue::new(),
                    attempts: 0,
                    ceiling: config.attempt_ceiling.max(1),
                    degraded: false,
                    escalation_pending: false,
                    batch_depth: 0,
                    pumping: false,
                    next_id: 1,
                }),
                surface,
                degraded,
                events: EventBus::new(),
                status: EventBus::new(),
            }),
        }
    }

    /// Offers a strategy for the display root.
    ///
    /// Returns `false` without queuing when degraded mode is active or
    /// requested, or a strictly better-ranked strategy holds the root. Otherwise the strategy is
    /// queued and, when the root is free, the best queued strategy is
    /// activated before this call returns.
    pub fn register(
        &self,
        name: impl Into<String>,
        priority: Priority,
        render: impl FnOnce(RootLease) -> Result<(), RenderError> + 'static,
    ) -> bool {
        let name = name.into();
        let refusal = {
            let st = self.inner.state.borrow();
            if st.degraded {
                Some(Refusal::Degraded)
            } else if st.escalation_pending {
                Some(Refusal::EscalationPending)
            } else {
                st.holder
                    .as_ref()
                    .filter(|holder| holder.priority < priority)
                    .map(|holder| Refusal::Outranked {
                        holder: holder.name.clone(),
                        priority: holder.priority,
                    })
            }
        };
        if let Some(reason) = refusal {
            debug!("refused renderer {name} (priority {priority}): {reason:?}");
            self.inner.events.emit(&ArbiterEvent::Refused {
                name,
                priority,
                reason,
            });
            return false;
        }

        let should_pump = {
            let mut st = self.inner.state.borrow_mut();
            let id = st.next_id;
            st.next_id += 1;
            st.pending.enqueue(
                priority,
                Entry {
                    id,
                    name: name.clone(),
                    render: Box::new(render),
                },
            );
            st.holder.is_none() && st.batch_depth == 0
        };
        debug!("queued renderer {name} (priority {priority})");
        self.inner
            .events
            .emit(&ArbiterEvent::Queued { name, priority });
        if should_pump {
            self.pump();
        }
        true
    }

    /// Hands the root back (active strategy) or withdraws a queued registration.
    ///
    /// Giving the root back counts as a failed activation: the next strategy is
    /// promoted, or degraded mode takes over when the attempt ceiling is hit
    /// or an escalation is waiting. With nothing queued the root stays unowned.
    pub fn release(&self, name: &str) -> bool {
        let holder_id = self
            .inner
            .state
            .borrow()
            .holder
            .as_ref()
            .filter(|holder| holder.name == name)
            .map(|holder| holder.id);
        if let Some(id) = holder_id {
            return self.release_lease(id);
        }

        let withdrawn = self
            .inner
            .state
            .borrow_mut()
            .pending
            .retain(|entry| entry.name != name);
        if withdrawn == 0 {
            return false;
        }
        debug!("withdrew {withdrawn} queued registration(s) of {name}");
        self.inner.events.emit(&ArbiterEvent::Withdrawn {
            name: name.to_owned(),
        });
        true
    }

    /// Switches to degraded mode now, or once the current holder gives up.
    pub fn request_degraded(&self, reason: &str) -> EscalationOutcome {
        let holder = {
            let mut st = self.inner.state.borrow_mut();
            if st.degraded {
                return EscalationOutcome::AlreadyDegraded;
            }
            match &st.holder {
                Some(holder) => {
                    let name = holder.name.clone();
                    st.escalation_pending = true;
                    Some(name)
                }
                None => None,
            }
        };
        match holder {
            Some(holder) => {
                info!("degraded mode deferred: {holder} holds the display root");
                self.inner
                    .events
                    .emit(&ArbiterEvent::EscalationDeferred { holder });
                EscalationOutcome::Deferred
            }
            None => {
                self.activate_degraded(reason);
                EscalationOutcome::Activated
            }
        }
    }

    /// Queues registrations until the returned guard (and any nested guard) drops.
    pub fn batch(&self) -> BatchGuard {
        self.inner.state.borrow_mut().batch_depth += 1;
        BatchGuard {
            arbiter: self.clone(),
        }
    }

    pub fn snapshot(&self) -> ArbitrationSnapshot {
        let st = self.inner.state.borrow();
        ArbitrationSnapshot {
            holder: st
                .holder
                .as_ref()
                .map(|holder| (holder.name.clone(), holder.priority)),
            pending: st
                .pending
                .iter()
                .map(|(priority, entry)| (entry.name.clone(), priority))
                .collect(),
            attempts: st.attempts,
            ceiling: st.ceiling,
            degraded: st.degraded,
            escalation_pending: st.escalation_pending,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.state.borrow().degraded
    }

    /// Name of the strategy holding the root.
    pub fn holder(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .holder
            .as_ref()
            .map(|holder| holder.name.clone())
    }

    pub fn subscribe(&self, listener: impl Fn(&ArbiterEvent) + 'static) -> SubscriptionId {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Observes the one-shot `degraded-mode-activated` status event.
    pub fn on_degraded(&self, listener: impl Fn(&DegradedActivated) + 'static) -> SubscriptionId {
        self.inner.status.subscribe(listener)
    }

    fn pump(&self) {
        {
            let mut st = self.inner.state.borrow_mut();
            if st.pumping {
                return;
            }
            st.pumping = true;
        }
        loop {
            let next = {
                let mut st = self.inner.state.borrow_mut();
                if st.degraded || st.holder.is_some() || st.batch_depth > 0 {
                    Next::Idle
                } else if st.escalation_pending {
                    Next::Degrade("error budget exceeded")
                } else {
                    match st.pending.pop_next() {
                        Some((priority, entry)) => {
                            st.holder = Some(Holder {
                                id: entry.id,
                                name: entry.name.clone(),
                                priority,
                            });
                            Next::Activate { entry, priority }
                        }
                        None => Next::Idle,
                    }
                }
            };
            match next {
                Next::Idle => break,
                Next::Degrade(reason) => self.activate_degraded(reason),
                Next::Activate { entry, priority } => self.activate(entry, priority),
            }
        }
        self.inner.state.borrow_mut().pumping = false;
    }

    fn activate(&self, entry: Entry, priority: Priority) {
        let Entry { id, name, render } = entry;
        info!("renderer {name} (priority {priority}) holds the display root");
        self.inner.events.emit(&ArbiterEvent::Activated {
            name: name.clone(),
            priority,
        });
        let lease = RootLease {
            id,
            name,
            arbiter: Rc::downgrade(&self.inner),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || render(lease)));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error,
            Err(payload) => RenderError::Panicked(panic_message(payload.as_ref())),
        };
        self.fail_lease(id, error);
    }

    fn fail_lease(&self, id: u64, error: RenderError) {
        let (name, escalate, queued) = {
            let mut st = self.inner.state.borrow_mut();
            let Some(holder) = st.holder.take_if_id(id) else {
                debug!("ignoring failure from a strategy that no longer holds the root: {error}");
                return;
            };
            st.attempts += 1;
            (holder.name, st.must_escalate(), st.pending.len())
        };
        warn!("renderer {name} failed: {error} ({queued} queued)");
        self.inner
            .events
            .emit(&ArbiterEvent::Failed { name, error });
        self.after_vacated(escalate);
    }

    fn release_lease(&self, id: u64) -> bool {
        let (name, escalate) = {
            let mut st = self.inner.state.borrow_mut();
            let Some(holder) = st.holder.take_if_id(id) else {
                return false;
            };
            st.attempts += 1;
            (holder.name, st.must_escalate())
        };
        info!("renderer {name} released the display root");
        self.inner.events.emit(&ArbiterEvent::Released { name });
        self.after_vacated(escalate);
        true
    }

    fn after_vacated(&self, escalate: Option<&'static str>) {
        if let Some(reason) = escalate {
            self.activate_degraded(reason);
            return;
        }
        if self.inner.state.borrow().pending.is_empty() {
            info!("display root unowned until the next registration");
        }
        self.pump();
    }

    fn activate_degraded(&self, reason: &str) {
        let dropped = {
            let mut st = self.inner.state.borrow_mut();
            if st.degraded {
                return;
            }
            st.degraded = true;
            st.escalation_pending = false;
            st.holder = None;
            st.pending.drain()
        };
        // Queued render closures may own arbitrary state; drop them with no borrow held.
        drop(dropped);
        error!("degraded mode activated: {reason}");
        self.inner.degraded.render(self.inner.surface.as_ref());
        self.inner.events.emit(&ArbiterEvent::DegradedActivated {
            reason: reason.to_owned(),
        });
        self.inner.status.emit(&DegradedActivated {
            reason: reason.to_owned(),
        });
    }
}

impl EscalationTarget for RenderArbiter {
    fn request_degraded(&self, reason: &str) -> EscalationOutcome {
        RenderArbiter::request_degraded(self, reason)
    }

    fn is_degraded(&self) -> bool {
        RenderArbiter::is_degraded(self)
    }
}

trait TakeIfId {
    fn take_if_id(&mut self, id: u64) -> Option<Holder>;
}

impl TakeIfId for Option<Holder> {
    fn take_if_id(&mut self, id: u64) -> Option<Holder> {
        if self.as_ref().is_some_and(|holder| holder.id == id) {
            self.take()
        } else {
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Keeps registrations queued while alive; see [`RenderArbiter::batch`].
pub struct BatchGuard {
    arbiter: RenderArbiter,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let release = {
            let mut st = self.arbiter.inner.state.borrow_mut();
            st.batch_depth = st.batch_depth.saturating_sub(1);
            st.batch_depth == 0
        };
        if release {
            self.arbiter.pump();
        }
    }
}

/// Proof of holding the display root, handed to the active strategy.
///
/// Every write checks the lease is still current, so a strategy that lost the
/// root (or keeps async work running after failing) cannot paint over its
/// successor.
#[derive(Clone)]
pub struct RootLease {
    id: u64,
    name: String,
    arbiter: Weak<ArbiterInner>,
}

impl RootLease {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_current(&self) -> bool {
        self.arbiter.upgrade().is_some_and(|inner| {
            inner
                .state
                .borrow()
                .holder
                .as_ref()
                .is_some_and(|holder| holder.id == self.id)
        })
    }

    /// Replaces the root's contents, creating the root if needed.
    pub fn paint(&self, markup: &str) -> Result<(), ArbiterError> {
        let inner = self.arbiter.upgrade().ok_or(ArbiterError::Gone)?;
        {
            let st = inner.state.borrow();
            if st.degraded {
                return Err(ArbiterError::Degraded);
            }
            if !st.holder.as_ref().is_some_and(|holder| holder.id == self.id) {
                return Err(ArbiterError::NotOwner {
                    name: self.name.clone(),
                });
            }
        }
        if !inner.surface.exists() {
            inner.surface.create();
        }
        inner.surface.paint(markup);
        Ok(())
    }

    /// Gives the root back. Returns `false` if the lease was no longer current.
    pub fn release(&self) -> bool {
        match self.arbiter.upgrade() {
            Some(inner) => RenderArbiter { inner }.release_lease(self.id),
            None => false,
        }
    }

    /// Reports a failure that happened after the render action returned.
    pub fn fail(&self, error: RenderError) {
        if let Some(inner) = self.arbiter.upgrade() {
            RenderArbiter { inner }.fail_lease(self.id, error);
        }
    }
}
