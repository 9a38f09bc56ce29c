// =============================================================================
// Session State Machine — lifecycle of one kline stream connection
// =============================================================================
//
//   Idle ──connect──▶ Connecting ──handshake──▶ Open
//                        │                        │
//                        └──── fault / dispose ───┴──▶ Closing(cause)
//
//   Closing(TransportError | RemoteClosed) ──closed──▶ Reconnecting
//   Closing(Replaced)                      ──closed──▶ Closed (terminal)
//
// Only the session task drives transitions; the supervisor observes them.
// =============================================================================

use serde::Serialize;

/// Why a session left the Connecting/Open states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCause {
    /// Connect failure, handshake timeout or read error.
    TransportError,
    /// The exchange closed the stream.
    RemoteClosed,
    /// The supervisor discarded the session (key change or shutdown).
    Replaced,
}

impl CloseCause {
    /// Faults reconnect; an intentional replacement never does.
    pub fn reconnects(&self) -> bool {
        !matches!(self, Self::Replaced)
    }
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportError => write!(f, "transport error"),
            Self::RemoteClosed => write!(f, "remote closed"),
            Self::Replaced => write!(f, "replaced"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing(CloseCause),
    Reconnecting,
    Closed,
}

/// Inputs that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connect,
    HandshakeOk,
    Fault(CloseCause),
    Dispose,
    TransportClosed,
}

impl SessionState {
    /// Apply `input`, returning the next state or `None` when the input is
    /// not valid in the current state.
    pub fn next(self, input: Transition) -> Option<SessionState> {
        use SessionState::*;
        use Transition::*;

        match (self, input) {
            (Idle, Connect) => Some(Connecting),
            (Connecting, HandshakeOk) => Some(Open),
            (Connecting | Open, Fault(cause)) => Some(Closing(cause)),
            (Idle | Connecting | Open, Dispose) => Some(Closing(CloseCause::Replaced)),
            (Closing(cause), TransportClosed) if cause.reconnects() => Some(Reconnecting),
            (Closing(_), TransportClosed) => Some(Closed),
            (Reconnecting, Dispose) => Some(Closed),
            _ => None,
        }
    }

    /// True while the handshake is in flight; the UI disables selection.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing(cause) => write!(f, "closing ({cause})"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
