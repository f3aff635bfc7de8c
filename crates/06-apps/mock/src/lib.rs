//! In-memory stand-ins for every platform trait the resilience layer consumes.
//!
//! * [`MockConnector`] / [`MockConnection`] – scriptable duplex connections.
//! * [`MockAssetHost`] – `<script>` insertion with per-url outcomes.
//! * [`MemorySurface`] – a display root that records what was painted.

mod assets;
mod surface;
mod transport;

pub use assets::{HostOp, MockAssetHost, Outcome};
pub use surface::MemorySurface;
pub use transport::{ConnectScript, MockConnection, MockConnector};
