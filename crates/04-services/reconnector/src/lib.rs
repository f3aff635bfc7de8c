//! Reconnecting wrapper around a persistent duplex connection.
//!
//! A [`Reconnector`] owns a platform [`Connector`] and hands out
//! [`ReconnectHandle`]s. Each handle drives one session through the machine in
//! [`state`]: bounded exponential backoff between attempts, a breaker that
//! disables the session for good on a rejection-class close code, and at most
//! one outstanding reconnect timer.

mod connection;
mod error;
mod policy;
mod session;
pub mod state;

pub use connection::{Connection, Connector, Message, TransportSink};
pub use error::{TransportError, TransportResult};
pub use policy::{
    ReconnectPolicy, CLOSE_ABNORMAL, CLOSE_FORBIDDEN, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION,
};
pub use session::{ReconnectHandle, Reconnector, SessionId};
pub use state::{CloseInfo, ConnState, DisableReason, SessionEvent};
