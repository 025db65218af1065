//! Frame Dispatcher
//!
//! Subscribes a session to the personal alert topic, decodes topic frames
//! into [`Alert`]s, and fans each alert out to every registered handler.
//!
//! Handlers run synchronously in registration order. Each invocation is
//! isolated: an `Err` or a panic from one handler is logged and the
//! remaining handlers still receive the alert.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::application::ports::{AlertHandler, HandlerError, InboundFrame, Session, SessionError};
use crate::domain::alert::Alert;
use crate::infrastructure::metrics;

/// Prefix of the per-client alert topic.
pub const TOPIC_PREFIX: &str = "/topic";

/// Payload content type the dispatcher decodes.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A frame that could not be turned into an [`Alert`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame declared a non-JSON payload.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The payload is not a valid alert.
    #[error("invalid alert payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result of dispatching one alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked.
    pub failed: usize,
}

/// Decodes topic frames and delivers alerts to the handler set.
///
/// The handler set is an immutable snapshot taken at construction, so
/// transport tasks iterate it without locking.
#[derive(Clone)]
pub struct FrameDispatcher {
    handlers: Arc<[Arc<dyn AlertHandler>]>,
}

impl fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl FrameDispatcher {
    /// Create a dispatcher over the given handlers, in registration order.
    #[must_use]
    pub fn new(handlers: impl IntoIterator<Item = Arc<dyn AlertHandler>>) -> Self {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Topic carrying alerts for `personal_key`.
    #[must_use]
    pub fn topic_for(personal_key: &str) -> String {
        format!("{TOPIC_PREFIX}/{personal_key}")
    }

    /// Subscribe `session` to the alert topic for `personal_key`.
    ///
    /// # Errors
    ///
    /// Returns the session's error if the subscription could not be sent.
    pub async fn subscribe(
        &self,
        session: &dyn Session,
        personal_key: &str,
    ) -> Result<String, SessionError> {
        let topic = Self::topic_for(personal_key);
        let subscription = session.subscribe(&topic).await?;
        tracing::info!(topic = %topic, subscription = %subscription, "Subscribed to alert topic");
        Ok(subscription)
    }

    /// Decode a frame into an alert.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the content type is not JSON or the payload
    /// does not match the alert shape.
    pub fn decode(&self, frame: &InboundFrame) -> Result<Alert, DecodeError> {
        if let Some(content_type) = frame.content_type.as_deref()
            && !is_json(content_type)
        {
            return Err(DecodeError::UnsupportedContentType(content_type.to_string()));
        }
        Ok(serde_json::from_slice(&frame.payload)?)
    }

    /// Decode a frame and dispatch it.
    ///
    /// Undecodable frames are logged and dropped; `None` is returned.
    pub fn dispatch_frame(&self, frame: &InboundFrame) -> Option<DispatchOutcome> {
        metrics::record_frame_received();

        match self.decode(frame) {
            Ok(alert) => Some(self.dispatch(&alert)),
            Err(e) => {
                tracing::warn!(
                    destination = %frame.destination,
                    error = %e,
                    "Dropping undecodable frame"
                );
                metrics::record_decode_error();
                None
            }
        }
    }

    /// Deliver `alert` to every handler, in registration order.
    pub fn dispatch(&self, alert: &Alert) -> DispatchOutcome {
        tracing::debug!(
            title = alert.title(),
            alert_type = alert.alert_type().as_str(),
            handlers = self.handlers.len(),
            "Dispatching alert"
        );

        let mut outcome = DispatchOutcome::default();
        for (index, handler) in self.handlers.iter().enumerate() {
            match invoke_isolated(handler.as_ref(), alert) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    metrics::record_handler_failure();
                    tracing::error!(
                        handler = index,
                        title = alert.title(),
                        error = %e,
                        "Alert handler failed"
                    );
                }
            }
        }

        metrics::record_alert_dispatched(alert.alert_type());
        outcome
    }
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE) || mime.ends_with("+json")
}

fn invoke_isolated(handler: &dyn AlertHandler, alert: &Alert) -> Result<(), HandlerError> {
    catch_unwind(AssertUnwindSafe(|| handler.handle(alert))).unwrap_or_else(|payload| {
        Err(HandlerError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
