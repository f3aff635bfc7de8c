//! Failure taxonomy shared by signal producers and the failure monitor.

use std::borrow::Cow;
use std::fmt;

/// Every failure the layer knows how to name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The realtime connection closed without being asked to.
    TransportAbnormalClose,
    /// The remote peer refused the connection; the breaker tripped.
    TransportRejected,
    /// An asset candidate did not finish before its deadline.
    AssetTimeout,
    /// An asset candidate failed to load.
    AssetNetworkError,
    /// Every candidate of an asset failed and a stub was installed.
    AssetExhausted,
    /// A renderer strategy failed while holding the display root.
    RendererException,
    /// Uncaught page error or unhandled rejection with no better match.
    Uncaught,
    /// The error budget ran out and degraded mode was requested.
    ErrorBudgetExceeded,
}

impl FailureKind {
    /// Stable kebab-case name used in logs and telemetry.
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::TransportAbnormalClose => "transport-abnormal-close",
            FailureKind::TransportRejected => "transport-rejected",
            FailureKind::AssetTimeout => "asset-timeout",
            FailureKind::AssetNetworkError => "asset-network-error",
            FailureKind::AssetExhausted => "asset-exhausted",
            FailureKind::RendererException => "renderer-exception",
            FailureKind::Uncaught => "uncaught",
            FailureKind::ErrorBudgetExceeded => "error-budget-exceeded",
        }
    }

    /// Coarse class used for budgeting.
    pub const fn class(self) -> FailureClass {
        match self {
            FailureKind::TransportAbnormalClose | FailureKind::TransportRejected => {
                FailureClass::Transport
            }
            FailureKind::AssetTimeout
            | FailureKind::AssetNetworkError
            | FailureKind::AssetExhausted => FailureClass::AssetLoad,
            FailureKind::RendererException
            | FailureKind::Uncaught
            | FailureKind::ErrorBudgetExceeded => FailureClass::Generic,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budgeting class of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Realtime transport trouble; handled by the reconnector's own breaker.
    Transport,
    /// External code failed to load.
    AssetLoad,
    /// Anything else.
    Generic,
}

impl FailureClass {
    /// Name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureClass::Transport => "transport",
            FailureClass::AssetLoad => "asset-load",
            FailureClass::Generic => "generic",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit failure report sent by a component to the monitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signal {
    pub kind: FailureKind,
    /// Component or resource the failure came from (asset name, socket url, renderer).
    pub origin: Cow<'static, str>,
    pub detail: String,
}

impl Signal {
    pub fn new(
        kind: FailureKind,
        origin: impl Into<Cow<'static, str>>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            origin: origin.into(),
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        self.kind.class()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{} ({})", self.kind, self.origin)
        } else {
            write!(f, "{} ({}): {}", self.kind, self.origin, self.detail)
        }
    }
}
