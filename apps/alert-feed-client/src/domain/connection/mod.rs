//! Connection Lifecycle State Machine
//!
//! Pure transition table for the connection manager. Side effects
//! (spawning handshakes, scheduling reconnects) live in the application
//! layer; this module only decides which transitions are legal.

use std::fmt;

/// Lifecycle state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and nothing scheduled.
    #[default]
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// Session established and topic subscribed.
    Connected,
    /// A reconnect task is scheduled.
    ReconnectPending,
    /// Process teardown; terminal.
    ShuttingDown,
}

/// Inputs that drive [`ConnectionState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `connect()` was invoked, directly or by a reconnect task.
    Connect,
    /// Handshake completed and the topic subscription is active.
    Established,
    /// Handshake, transport, or protocol failure.
    Failed,
    /// The reconnect policy ran out of attempts.
    Exhausted,
    /// Explicit teardown.
    Shutdown,
}

impl ConnectionState {
    /// Apply an event, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the event is not legal in the
    /// current state. Callers treat this as a no-op.
    pub const fn on(self, event: ConnectionEvent) -> Result<Self, TransitionError> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::ShuttingDown, _) => Err(TransitionError::Terminal),
            (_, E::Shutdown) => Ok(S::ShuttingDown),
            (S::Disconnected | S::ReconnectPending, E::Connect) => Ok(S::Connecting),
            (S::Connecting, E::Established) => Ok(S::Connected),
            (S::Disconnected | S::Connecting | S::Connected | S::ReconnectPending, E::Failed) => {
                Ok(S::ReconnectPending)
            }
            (S::ReconnectPending, E::Exhausted) => Ok(S::Disconnected),
            (from, event) => Err(TransitionError::Invalid { from, event }),
        }
    }

    /// Whether frames from the current session should still be delivered.
    #[must_use]
    pub const fn accepts_frames(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Lowercase name for logs, metrics, and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectPending => "reconnect_pending",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The manager is shutting down; no further transitions.
    #[error("connection manager is shutting down")]
    Terminal,
    /// Event not accepted in this state.
    #[error("event {event:?} not valid in state {from}")]
    Invalid {
        /// State the event was applied to.
        from: ConnectionState,
        /// The rejected event.
        event: ConnectionEvent,
    },
}
