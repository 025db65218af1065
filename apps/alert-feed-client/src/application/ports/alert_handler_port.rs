//! Alert Handler Port (Driven Port)
//!
//! Interface for presentation backends that consume decoded alerts.

use crate::domain::alert::Alert;

/// Failure raised by a single handler during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("alert handler failed: {message}")]
    Failed {
        /// Failure description.
        message: String,
    },

    /// The handler panicked; the panic was caught by the dispatcher.
    #[error("alert handler panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any displayable error.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

/// Port for consuming alerts.
///
/// Invoked synchronously on the transport task. Implementations must return
/// promptly; anything that blocks (waiting on a dialog, launching a browser)
/// belongs on an auxiliary thread.
#[cfg_attr(test, mockall::automock)]
pub trait AlertHandler: Send + Sync {
    /// Handle one alert.
    fn handle(&self, alert: &Alert) -> Result<(), HandlerError>;
}
