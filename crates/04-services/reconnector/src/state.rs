//! Pure connection-session state machine.
//!
//! ```text
//! Connecting ─open─▶ Open ─close─▶ ClosedClean            (discarded)
//!     │               │
//!     └──abnormal─────┴─▶ Reconnecting ─due─▶ Connecting  (attempts < max)
//!                     └─▶ Disabled                        (rejected, or attempts == max)
//! ```
//!
//! [`step`] never performs I/O. It returns the next state plus the [`Effect`]s
//! the driver has to carry out, which keeps the whole machine testable with
//! plain values.

use std::fmt;
use std::time::Duration;

use smallvec::{smallvec, SmallVec};

use crate::policy::ReconnectPolicy;

/// Phase of a connection session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Open,
    /// Closed on purpose; the session is discarded.
    ClosedClean,
    /// Waiting for the backoff delay before the next connection.
    Reconnecting { delay: Duration },
    /// No further connections for the rest of the page's lifetime.
    Disabled(DisableReason),
}

impl ConnState {
    /// True for states the session can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::ClosedClean | ConnState::Disabled(_))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::Connecting => "connecting",
            ConnState::Open => "open",
            ConnState::ClosedClean => "closed-clean",
            ConnState::Reconnecting { .. } => "reconnecting",
            ConnState::Disabled(_) => "disabled",
        }
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session stopped retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisableReason {
    /// The peer closed with a rejection-class code; the breaker tripped.
    Rejected { code: u16 },
    /// The retry budget ran out.
    AttemptsExhausted { attempts: u32 },
}

/// How an underlying connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Something that happened to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// The current underlying connection finished its handshake.
    Opened,
    /// The current underlying connection closed.
    Closed(CloseInfo),
    /// The backoff timer fired.
    ReconnectDue,
    /// The owner asked for a clean shutdown.
    CloseRequested,
}

/// Observable session events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new underlying connection is being opened. `attempt` is 0 for the first connect.
    Connecting { attempt: u32 },
    Open,
    Message(crate::Message),
    Error(String),
    /// An underlying connection closed. `clean` is false for abnormal closes.
    Closed {
        code: u16,
        reason: String,
        clean: bool,
    },
    /// A reconnect was scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    Disabled(DisableReason),
}

/// Work the driver must perform after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    OpenConnection,
    CloseConnection { code: u16, reason: &'static str },
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Drop the underlying connection handle without closing it.
    DropConnection,
    Emit(SessionEvent),
}

/// Mutable part of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub phase: ConnState,
    /// Reconnects performed since the last successful open.
    pub attempts: u32,
    /// A reconnect timer is outstanding.
    pub reconnect_pending: bool,
}

impl SessionState {
    /// State of a session whose first connection is being opened.
    pub fn connecting() -> Self {
        Self {
            phase: ConnState::Connecting,
            attempts: 0,
            reconnect_pending: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.phase, ConnState::Disabled(_))
    }
}

pub type Effects = SmallVec<[Effect; 4]>;

/// Result of feeding one [`Input`] to [`step`].
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub next: SessionState,
    pub effects: Effects,
}

impl Step {
    fn unchanged(state: SessionState) -> Self {
        Self {
            next: state,
            effects: SmallVec::new(),
        }
    }
}

/// Pure transition function of the session machine.
pub fn step(state: SessionState, input: &Input, policy: &ReconnectPolicy) -> Step {
    if state.phase.is_terminal() {
        return Step::unchanged(state);
    }

    match input {
        Input::Opened => match state.phase {
            ConnState::Connecting => Step {
                next: SessionState {
                    phase: ConnState::Open,
                    attempts: 0,
                    reconnect_pending: false,
                },
                effects: smallvec![Effect::Emit(SessionEvent::Open)],
            },
            _ => Step::unchanged(state),
        },

        Input::Closed(info) => on_close(state, info, policy),

        Input::ReconnectDue => match state.phase {
            ConnState::Reconnecting { .. } => Step {
                next: SessionState {
                    phase: ConnState::Connecting,
                    attempts: state.attempts,
                    reconnect_pending: false,
                },
                effects: smallvec![
                    Effect::Emit(SessionEvent::Connecting {
                        attempt: state.attempts
                    }),
                    Effect::OpenConnection,
                ],
            },
            _ => Step::unchanged(state),
        },

        Input::CloseRequested => {
            let mut effects = Effects::new();
            if state.reconnect_pending {
                effects.push(Effect::CancelReconnect);
            }
            if matches!(state.phase, ConnState::Connecting | ConnState::Open) {
                effects.push(Effect::CloseConnection {
                    code: crate::policy::CLOSE_NORMAL,
                    reason: "client closed",
                });
            }
            effects.push(Effect::Emit(SessionEvent::Closed {
                code: crate::policy::CLOSE_NORMAL,
                reason: "client closed".to_owned(),
                clean: true,
            }));
            Step {
                next: SessionState {
                    phase: ConnState::ClosedClean,
                    attempts: state.attempts,
                    reconnect_pending: false,
                },
                effects,
            }
        }
    }
}

fn on_close(state: SessionState, info: &CloseInfo, policy: &ReconnectPolicy) -> Step {
    let closed = |clean| {
        Effect::Emit(SessionEvent::Closed {
            code: info.code,
            reason: info.reason.clone(),
            clean,
        })
    };

    if policy.is_rejection(info.code) {
        // The breaker trips from any live phase, even with a reconnect pending.
        let reason = DisableReason::Rejected { code: info.code };
        let mut effects = Effects::new();
        if state.reconnect_pending {
            effects.push(Effect::CancelReconnect);
        }
        effects.push(Effect::DropConnection);
        effects.push(closed(false));
        effects.push(Effect::Emit(SessionEvent::Disabled(reason)));
        return Step {
            next: SessionState {
                phase: ConnState::Disabled(reason),
                attempts: state.attempts,
                reconnect_pending: false,
            },
            effects,
        };
    }

    if !matches!(state.phase, ConnState::Connecting | ConnState::Open) || state.reconnect_pending {
        // A reconnect is already outstanding; never stack a second one.
        return Step::unchanged(state);
    }

    if policy.is_clean(info.code) {
        return Step {
            next: SessionState {
                phase: ConnState::ClosedClean,
                attempts: state.attempts,
                reconnect_pending: false,
            },
            effects: smallvec![Effect::DropConnection, closed(true)],
        };
    }

    if state.attempts >= policy.max_attempts {
        let reason = DisableReason::AttemptsExhausted {
            attempts: state.attempts,
        };
        return Step {
            next: SessionState {
                phase: ConnState::Disabled(reason),
                attempts: state.attempts,
                reconnect_pending: false,
            },
            effects: smallvec![
                Effect::DropConnection,
                closed(false),
                Effect::Emit(SessionEvent::Disabled(reason)),
            ],
        };
    }

    let delay = policy.delay_for(state.attempts);
    let attempts = state.attempts + 1;
    Step {
        next: SessionState {
            phase: ConnState::Reconnecting { delay },
            attempts,
            reconnect_pending: true,
        },
        effects: smallvec![
            Effect::DropConnection,
            closed(false),
            Effect::Emit(SessionEvent::Reconnecting {
                attempt: attempts,
                delay,
            }),
            Effect::ScheduleReconnect(delay),
        ],
    }
}
