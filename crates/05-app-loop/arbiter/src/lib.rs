//! Single-owner arbitration of the page's display root.
//!
//! Rendering strategies register with a priority (lower wins). Exactly one of
//! them holds the root at a time; when it fails or gives the root back the next
//! best one is promoted. Once the attempt ceiling is reached, or the failure
//! monitor escalates, a static degraded page takes over for good.

mod arbiter;
mod degraded;
mod error;
mod queue;
mod surface;

pub use arbiter::{
    ArbiterConfig, ArbiterEvent, ArbitrationSnapshot, BatchGuard, DegradedActivated,
    RenderArbiter, RenderFn, Refusal, RootLease, DEFAULT_ATTEMPT_CEILING,
};
pub use degraded::{ContactLine, DegradedContent, DegradedRenderer};
pub use error::{ArbiterError, RenderError};
pub use queue::{PendingQueue, Priority};
pub use surface::DisplaySurface;
