//! Failure monitor: counts failures against an error budget and asks for
//! degraded mode, exactly once, when the budget runs out.

mod budget;
mod classify;
mod monitor;

pub use budget::ErrorBudget;
pub use classify::{FaultKind, PageFault};
pub use monitor::{FailureMonitor, MonitorEvent, WeakMonitor, DEFAULT_ERROR_BUDGET};
