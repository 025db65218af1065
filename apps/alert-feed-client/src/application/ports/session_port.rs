//! Session Ports (Driven Ports)
//!
//! Interfaces between the connection manager and the frame transport.
//!
//! - `SessionConnector`: opens a session (handshake included)
//! - `Session`: a live session that can subscribe and disconnect
//! - `SessionHandler`: callbacks the transport invokes for frames and errors

use std::sync::Arc;

use async_trait::async_trait;

/// A message frame received on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Destination the frame was published to.
    pub destination: String,
    /// Subscription id assigned when subscribing.
    pub subscription: Option<String>,
    /// Declared payload content type.
    pub content_type: Option<String>,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl InboundFrame {
    /// Create a frame with a payload and no optional headers.
    #[must_use]
    pub fn new(destination: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            destination: destination.into(),
            subscription: None,
            content_type: None,
            payload: payload.into(),
        }
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Connectivity failures. Every variant is recoverable by reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The connection could not be established.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The connection dropped or an I/O error occurred after establishment.
    #[error("transport error: {0}")]
    Transport(String),

    /// The frame layer reported a session-level exception.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Callbacks invoked by the transport on its own task.
pub trait SessionHandler: Send + Sync {
    /// A message frame arrived on a subscription.
    fn handle_frame(&self, frame: &InboundFrame);

    /// The frame layer raised a session-level exception.
    fn handle_exception(&self, error: SessionError);

    /// The underlying connection failed.
    fn handle_transport_error(&self, error: SessionError);
}

/// A live session returned by a successful handshake.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Subscribe to a destination, returning the subscription id.
    async fn subscribe(&self, destination: &str) -> Result<String, SessionError>;

    /// Close the session without reporting an error to its handler.
    async fn disconnect(&self);

    /// Whether the session is still open.
    fn is_connected(&self) -> bool;
}

/// Opens sessions against a server endpoint.
///
/// A single connector instance is reused across every connection attempt.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Perform the handshake. Frames and errors for the resulting session
    /// are delivered to `handler`.
    async fn connect(
        &self,
        url: &str,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Arc<dyn Session>, SessionError>;
}
