//! Alert Handlers
//!
//! Presentation backends implementing the `AlertHandler` port.
//!
//! - `LoggingAlertHandler`: one log line per alert
//! - `DesktopNotificationHandler`: macOS dialog with an Open Calendar action

pub mod desktop;
pub mod logging;

pub use desktop::{DEFAULT_CALENDAR_URL, DesktopNotificationConfig, DesktopNotificationHandler};
pub use logging::LoggingAlertHandler;
