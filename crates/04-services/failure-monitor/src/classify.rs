use std::fmt;

use resilience_core::{FailureKind, Signal};

/// How the page reported an uncaught failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Uncaught exception or resource `error` event.
    Error,
    /// Promise rejection nobody handled.
    UnhandledRejection,
}

/// Raw page-level failure, before classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFault {
    pub kind: FaultKind,
    pub message: String,
    /// Script url or file the failure points at, when known.
    pub source: Option<String>,
    /// The event targeted an executable-asset element (a failed `<script>`).
    pub script_target: bool,
}

const TRANSPORT_MARKERS: &[&str] = &["websocket", "socket closed", "connection closed"];
const ASSET_MARKERS: &[&str] = &[
    "loading chunk",
    "failed to fetch dynamically imported module",
    "importing a module script failed",
    "script error",
    "networkerror",
];

impl PageFault {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Error,
            message: message.into(),
            source: None,
            script_target: false,
        }
    }

    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::UnhandledRejection,
            message: message.into(),
            source: None,
            script_target: false,
        }
    }

    /// Resource `error` event from an executable-asset element.
    pub fn script_load(source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            kind: FaultKind::Error,
            message: format!("failed to load script {source}"),
            source: Some(source),
            script_target: true,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Maps the fault onto the failure taxonomy.
    pub fn classify(&self) -> FailureKind {
        if self.script_target {
            return FailureKind::AssetNetworkError;
        }
        let message = self.message.to_ascii_lowercase();
        if TRANSPORT_MARKERS.iter().any(|marker| message.contains(marker)) {
            FailureKind::TransportAbnormalClose
        } else if ASSET_MARKERS.iter().any(|marker| message.contains(marker)) {
            FailureKind::AssetNetworkError
        } else {
            FailureKind::Uncaught
        }
    }

    pub fn to_signal(&self) -> Signal {
        let origin = match (&self.source, self.kind) {
            (Some(source), _) => source.clone(),
            (None, FaultKind::Error) => "window.error".to_owned(),
            (None, FaultKind::UnhandledRejection) => "window.unhandledrejection".to_owned(),
        };
        Signal::new(self.classify(), origin, self.message.clone())
    }
}

impl fmt::Display for PageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            FaultKind::Error => "uncaught error",
            FaultKind::UnhandledRejection => "unhandled rejection",
        };
        match &self.source {
            Some(source) => write!(f, "{label} at {source}: {}", self.message),
            None => write!(f, "{label}: {}", self.message),
        }
    }
}
