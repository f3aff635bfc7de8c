use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection is not open (state: {0})")]
    NotOpen(&'static str),

    #[error("session disabled; the connection will not be retried")]
    Disabled,

    #[error("session closed")]
    Closed,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),
}

impl TransportError {
    pub fn connect(msg: impl Into<String>) -> Self {
        TransportError::Connect(msg.into())
    }

    pub fn send(msg: impl Into<String>) -> Self {
        TransportError::Send(msg.into())
    }
}
