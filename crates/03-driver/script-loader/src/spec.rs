use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::host::AssetHost;

/// How to tell that an asset is already available without loading it.
#[derive(Clone, Default)]
pub enum LoadedProbe {
    /// Always load.
    #[default]
    Never,
    /// The asset registers a global binding under this name.
    Binding(String),
    /// Custom check.
    Check(Rc<dyn Fn() -> bool>),
}

impl fmt::Debug for LoadedProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadedProbe::Never => f.write_str("Never"),
            LoadedProbe::Binding(name) => f.debug_tuple("Binding").field(name).finish(),
            LoadedProbe::Check(_) => f.write_str("Check(..)"),
        }
    }
}

/// Static description of an external code asset.
#[derive(Clone, Debug)]
pub struct AssetSpec {
    pub name: String,
    /// Candidate locations, tried strictly in order.
    pub sources: Vec<String>,
    pub probe: LoadedProbe,
    /// Per-attempt deadline; the loader default applies when `None`.
    pub timeout: Option<Duration>,
}

impl AssetSpec {
    pub fn new<I, S>(name: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            probe: LoadedProbe::Never,
            timeout: None,
        }
    }

    /// Uses a global binding both as the loaded probe and as the stub target.
    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.probe = LoadedProbe::Binding(binding.into());
        self
    }

    pub fn with_probe(mut self, probe: impl Fn() -> bool + 'static) -> Self {
        self.probe = LoadedProbe::Check(Rc::new(probe));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Global binding the asset is expected to define, if known.
    pub fn binding(&self) -> Option<&str> {
        match &self.probe {
            LoadedProbe::Binding(name) => Some(name),
            _ => None,
        }
    }

    /// Evaluates the loaded probe against `host`.
    pub fn is_loaded(&self, host: &dyn AssetHost) -> bool {
        match &self.probe {
            LoadedProbe::Never => false,
            LoadedProbe::Binding(name) => host.binding_present(name),
            LoadedProbe::Check(check) => check(),
        }
    }
}
