//! Assembly of the page resilience layer.
//!
//! [`ResilienceConfig`] carries the tunables; [`LayerBuilder`] takes the
//! platform adapters (timers, transport connector, asset host, display surface)
//! and returns a wired [`ResilienceLayer`].

mod config;
mod error;
mod layer;

pub use config::{AssetConfig, ContactConfig, DegradedConfig, ResilienceConfig};
pub use error::ConfigError;
pub use layer::{LayerBuilder, ResilienceLayer};

pub use failure_monitor::{FaultKind, PageFault};
pub use reconnector::{ConnState, Message, ReconnectHandle, SessionEvent, TransportError};
pub use render_arbiter::{
    ArbiterEvent, ArbitrationSnapshot, DegradedActivated, Priority, RenderError, RootLease,
};
pub use resilience_core::{FailureKind, Signal, SubscriptionId};
pub use script_loader::{LoadResult, LoadSource};
