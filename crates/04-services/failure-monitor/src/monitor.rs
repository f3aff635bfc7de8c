use std::cell::Cell;
use std::rc::{Rc, Weak};

use log::{debug, error, warn};
use resilience_core::{
    EscalationOutcome, EscalationTarget, EventBus, FailureClass, FailureKind, Signal,
    SubscriptionId,
};

use crate::budget::ErrorBudget;
use crate::classify::PageFault;

/// Counted failures tolerated before degraded mode is requested.
pub const DEFAULT_ERROR_BUDGET: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Logged but not counted (transport failures).
    Ignored { signal: Signal },
    Counted { signal: Signal, count: u32 },
    /// The budget ran out and degraded mode was requested.
    Escalated { count: u32, outcome: EscalationOutcome },
}

struct MonitorInner {
    budget: Cell<ErrorBudget>,
    escalations: Cell<u32>,
    target: Rc<dyn EscalationTarget>,
    events: EventBus<MonitorEvent>,
}

/// Classifies failures, spends the error budget, and escalates once.
///
/// Clones share the same budget.
#[derive(Clone)]
pub struct FailureMonitor {
    inner: Rc<MonitorInner>,
}

impl FailureMonitor {
    pub fn new(threshold: u32, target: Rc<dyn EscalationTarget>) -> Self {
        Self {
            inner: Rc::new(MonitorInner {
                budget: Cell::new(ErrorBudget::new(threshold)),
                escalations: Cell::new(0),
                target,
                events: EventBus::new(),
            }),
        }
    }

    /// Records an explicit failure report.
    pub fn observe(&self, signal: Signal) {
        match signal.class() {
            FailureClass::Transport => {
                debug!("transport failure (not counted): {signal}");
                self.inner.events.emit(&MonitorEvent::Ignored { signal });
            }
            FailureClass::AssetLoad | FailureClass::Generic => {
                let mut budget = self.inner.budget.get();
                let tripped = budget.record();
                self.inner.budget.set(budget);
                warn!(
                    "{} failure {}/{}: {signal}",
                    signal.class(),
                    budget.count(),
                    budget.threshold()
                );
                self.inner.events.emit(&MonitorEvent::Counted {
                    signal,
                    count: budget.count(),
                });
                if tripped {
                    self.escalate(budget.count());
                }
            }
        }
    }

    /// Records an uncaught page error or rejection.
    pub fn observe_fault(&self, fault: &PageFault) {
        self.observe(fault.to_signal());
    }

    /// True once the budget has run out. Never goes back to false.
    pub fn should_escalate(&self) -> bool {
        self.inner.budget.get().is_exhausted()
    }

    /// Failures counted so far.
    pub fn count(&self) -> u32 {
        self.inner.budget.get().count()
    }

    pub fn threshold(&self) -> u32 {
        self.inner.budget.get().threshold()
    }

    /// Times degraded mode was requested (0 or 1).
    pub fn escalation_requests(&self) -> u32 {
        self.inner.escalations.get()
    }

    pub fn subscribe(&self, listener: impl Fn(&MonitorEvent) + 'static) -> SubscriptionId {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Non-owning handle, for listeners registered on components the monitor targets.
    pub fn downgrade(&self) -> WeakMonitor {
        WeakMonitor {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn escalate(&self, count: u32) {
        self.inner.escalations.set(self.inner.escalations.get() + 1);
        let reason = FailureKind::ErrorBudgetExceeded.as_str();
        error!("error budget exhausted after {count} failures; requesting degraded mode");
        let outcome = self.inner.target.request_degraded(reason);
        debug!("degraded mode request: {outcome:?}");
        self.inner
            .events
            .emit(&MonitorEvent::Escalated { count, outcome });
    }
}

/// Weak counterpart of [`FailureMonitor`].
#[derive(Clone)]
pub struct WeakMonitor {
    inner: Weak<MonitorInner>,
}

impl WeakMonitor {
    pub fn upgrade(&self) -> Option<FailureMonitor> {
        self.inner.upgrade().map(|inner| FailureMonitor { inner })
    }
}
