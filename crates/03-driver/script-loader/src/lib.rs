//! Ordered-fallback loader for external code assets.
//!
//! Each [`AssetSpec`] names an asset and its candidate sources. [`ScriptLoader::load`]
//! tries the candidates one at a time, each bounded by its own deadline, removes
//! the element of every failed attempt before moving on, and installs a no-op
//! stub when nothing works. Results are data; the loader never fails.

mod error;
mod host;
mod loader;
mod spec;

pub use error::LoadError;
pub use host::{AssetHost, AttemptFuture, ElementId};
pub use loader::{
    AttemptRecord, LoadEvent, LoadResult, LoadSource, ScriptLoader, DEFAULT_ATTEMPT_TIMEOUT,
};
pub use spec::{AssetSpec, LoadedProbe};
