use thiserror::Error;

/// Failure reported by a renderer strategy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer failed: {0}")]
    Failed(String),

    #[error("renderer panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    pub fn failed(msg: impl Into<String>) -> Self {
        RenderError::Failed(msg.into())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArbiterError {
    #[error("`{name}` does not hold the display root")]
    NotOwner { name: String },

    #[error("degraded mode is active")]
    Degraded,

    #[error("arbiter is gone")]
    Gone,
}

impl From<ArbiterError> for RenderError {
    fn from(err: ArbiterError) -> Self {
        RenderError::Failed(err.to_string())
    }
}
