//! Logging alert handler.

use crate::application::ports::{AlertHandler, HandlerError};
use crate::domain::alert::Alert;

/// Writes every alert to the log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAlertHandler;

impl LoggingAlertHandler {
    /// Create a new logging handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AlertHandler for LoggingAlertHandler {
    fn handle(&self, alert: &Alert) -> Result<(), HandlerError> {
        tracing::info!(
            title = alert.title(),
            alert_type = alert.alert_type().as_str(),
            "ALERT: {}",
            alert.summary()
        );
        Ok(())
    }
}
