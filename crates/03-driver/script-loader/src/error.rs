use std::time::Duration;

use resilience_core::FailureKind;
use thiserror::Error;

/// Why one candidate failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("could not insert element: {0}")]
    Insert(String),
}

impl LoadError {
    pub fn network(msg: impl Into<String>) -> Self {
        LoadError::Network(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            LoadError::Timeout(_) => FailureKind::AssetTimeout,
            LoadError::Network(_) | LoadError::Insert(_) => FailureKind::AssetNetworkError,
        }
    }
}
