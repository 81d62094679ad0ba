#![expect(
    clippy::module_name_repetitions,
    reason = "ConnectionState mirrors the module name for clarity at the crate root"
)]

use std::fmt;

use crate::transport::TransportError;

/// Lifecycle of a transport, as reported by the [`Transport`](crate::transport::Transport).
///
/// A [`Connection`](crate::Connection) never sets this itself; it only reacts to it.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub enum ConnectionState {
    /// Created but not started
    #[default]
    Setup,
    /// Resolving, connecting and performing the handshake
    Preparing,
    /// Handshake complete, messages can flow
    Ready,
    /// Blocked on a condition that might clear (for example no route to host)
    Waiting(TransportError),
    /// The connection failed and will not recover
    Failed(TransportError),
    /// The transport was cancelled
    Cancelled,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether no further transport activity can follow this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Cancelled)
    }

    /// The error carried by [`Self::Waiting`] or [`Self::Failed`].
    #[must_use]
    pub const fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Waiting(e) | Self::Failed(e) => Some(e),
            Self::Setup | Self::Preparing | Self::Ready | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Preparing => write!(f, "preparing"),
            Self::Ready => write!(f, "ready"),
            Self::Waiting(e) => write!(f, "waiting ({e})"),
            Self::Failed(e) => write!(f, "failed ({e})"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
