//! Core primitives shared by every resilience component and both runtimes.
//!
//! Everything in the layer runs on the page's single thread, so the pieces here
//! are `Rc`/`RefCell` based and never `Send`:
//! * [`Timers`] / [`sleep`] – cancellable one-shot timers abstracted over the platform.
//! * [`EventBus`] – re-entrancy safe publish/subscribe used for every observable event.
//! * [`FailureKind`] / [`Signal`] – the failure taxonomy shared by producers and the monitor.
//! * [`EscalationTarget`] – the seam the failure monitor uses to ask for degraded mode.

mod escalation;
mod events;
mod failure;
mod timer;

pub use escalation::{EscalationOutcome, EscalationTarget};
pub use events::{EventBus, SubscriptionId};
pub use failure::{FailureClass, FailureKind, Signal};
pub use timer::{sleep, SharedTimers, Sleep, Task, TimerId, Timers};
