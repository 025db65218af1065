//! Desktop Notification Handler (macOS)
//!
//! Shows each alert as a modal dialog through `osascript`: a short sound
//! cue at a fixed volume, then a "Meeting Alert" dialog with Dismiss and
//! Open Calendar buttons. The handler returns as soon as the process is
//! spawned; an auxiliary thread waits for the button choice and opens the
//! calendar when asked to.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::application::ports::{AlertHandler, HandlerError};
use crate::domain::alert::Alert;

/// Default link opened by the Open Calendar button.
pub const DEFAULT_CALENDAR_URL: &str = "https://calendar.google.com";

const DIALOG_TITLE: &str = "Meeting Alert";
const DISMISS_BUTTON: &str = "Dismiss";
const OPEN_CALENDAR_BUTTON: &str = "Open Calendar";
const ALERT_SOUND: &str = "/System/Library/Sounds/Glass.aiff";
const ALERT_VOLUME: u8 = 80;

/// Settings for [`DesktopNotificationHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopNotificationConfig {
    /// URL opened when the user picks Open Calendar.
    pub calendar_url: String,
    /// `.icns` file shown in the dialog; the caution icon is used when unset
    /// or missing.
    pub icon_path: Option<PathBuf>,
}

impl Default for DesktopNotificationConfig {
    fn default() -> Self {
        Self {
            calendar_url: DEFAULT_CALENDAR_URL.to_string(),
            icon_path: None,
        }
    }
}

/// [`AlertHandler`] showing a macOS dialog per alert.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotificationHandler {
    config: DesktopNotificationConfig,
}

impl DesktopNotificationHandler {
    /// Create a new handler.
    #[must_use]
    pub const fn new(config: DesktopNotificationConfig) -> Self {
        Self { config }
    }

    /// Icon shown in the dialog, if the configured file exists.
    #[must_use]
    pub fn icon(&self) -> Option<&Path> {
        self.config
            .icon_path
            .as_deref()
            .filter(|path| path.is_file())
    }

    /// `AppleScript` source for `alert`. Prints the chosen button on exit.
    #[must_use]
    pub fn script(&self, alert: &Alert) -> String {
        let icon_clause = self.icon().map_or_else(
            || "with icon caution".to_string(),
            |path| format!("with icon POSIX file \"{}\"", escape(&path.to_string_lossy())),
        );
        let message = escape(&alert.summary());

        format!(
            r#"set previousVolume to output volume of (get volume settings)
try
    set volume output volume {ALERT_VOLUME}
    do shell script "afplay {ALERT_SOUND}"
end try
set volume output volume previousVolume

tell application "System Events"
    set frontmost of process "Finder" to true
end tell

tell application "Finder"
    activate
    set choice to display dialog "{message}" with title "{DIALOG_TITLE}" buttons {{"{DISMISS_BUTTON}", "{OPEN_CALENDAR_BUTTON}"}} default button "{OPEN_CALENDAR_BUTTON}" {icon_clause}
end tell

return button returned of choice
"#
        )
    }

    fn spawn_dialog(&self, alert: &Alert) -> std::io::Result<Child> {
        Command::new("osascript")
            .arg("-e")
            .arg(self.script(alert))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
    }
}

impl AlertHandler for DesktopNotificationHandler {
    fn handle(&self, alert: &Alert) -> Result<(), HandlerError> {
        let child = self
            .spawn_dialog(alert)
            .map_err(|e| HandlerError::failed(format!("failed to launch osascript: {e}")))?;

        let calendar_url = self.config.calendar_url.clone();
        let title = alert.title().to_string();
        std::thread::Builder::new()
            .name("alert-dialog".to_string())
            .spawn(move || await_choice(child, &calendar_url, &title))
            .map_err(|e| HandlerError::failed(format!("failed to start dialog thread: {e}")))?;

        Ok(())
    }
}

/// Wait for the dialog to close and act on the chosen button.
fn await_choice(mut child: Child, calendar_url: &str, title: &str) {
    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take()
        && let Err(e) = stdout.read_to_string(&mut output)
    {
        tracing::warn!(title, error = %e, "Could not read dialog response");
    }

    match child.wait() {
        Ok(status) if !status.success() => {
            tracing::debug!(title, %status, "Dialog closed without a choice");
            return;
        }
        Err(e) => {
            tracing::warn!(title, error = %e, "Could not wait for dialog");
            return;
        }
        Ok(_) => {}
    }

    if !wants_calendar(&output) {
        tracing::debug!(title, "Alert dismissed");
        return;
    }

    tracing::info!(title, url = calendar_url, "Opening calendar");
    if let Err(e) = Command::new("open").arg(calendar_url).status() {
        tracing::warn!(url = calendar_url, error = %e, "Failed to open calendar");
    }
}

fn wants_calendar(response: &str) -> bool {
    response.trim() == OPEN_CALENDAR_BUTTON
}

/// Escape text for an `AppleScript` string literal.
fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::AlertType;

    fn standup() -> Alert {
        Alert::new("Standup", AlertType::FiveMinutes)
    }

    #[test]
    fn script_shows_dialog_with_both_buttons() {
        let script = DesktopNotificationHandler::default().script(&standup());

        assert!(script.contains(r#"with title "Meeting Alert""#));
        assert!(script.contains(r#"buttons {"Dismiss", "Open Calendar"}"#));
        assert!(script.contains(r#"default button "Open Calendar""#));
        assert!(script.contains("set volume output volume 80"));
        assert!(script.contains("Glass.aiff"));
        assert!(script.contains(&standup().summary()));
    }

    #[test]
    fn missing_icon_falls_back_to_caution() {
        let handler = DesktopNotificationHandler::new(DesktopNotificationConfig {
            icon_path: Some(PathBuf::from("/nonexistent/app.icns")),
            ..DesktopNotificationConfig::default()
        });

        assert!(handler.icon().is_none());
        assert!(handler.script(&standup()).contains("with icon caution"));
    }

    #[test]
    fn existing_icon_is_used() {
        let icon = tempfile::Builder::new().suffix(".icns").tempfile().unwrap();
        let handler = DesktopNotificationHandler::new(DesktopNotificationConfig {
            icon_path: Some(icon.path().to_path_buf()),
            ..DesktopNotificationConfig::default()
        });

        let script = handler.script(&standup());
        assert!(script.contains("with icon POSIX file"));
        assert!(script.contains(&*icon.path().to_string_lossy()));
        assert!(!script.contains("with icon caution"));
    }

    #[test]
    fn quotes_in_titles_are_escaped() {
        let alert = Alert::new(r#"Review "Q3" \ plan"#, AlertType::StartingNow);
        let script = DesktopNotificationHandler::default().script(&alert);
        assert!(script.contains(r#"Review \"Q3\" \\ plan"#));
    }

    #[test]
    fn only_open_calendar_opens_calendar() {
        assert!(wants_calendar("Open Calendar\n"));
        assert!(!wants_calendar("Dismiss\n"));
        assert!(!wants_calendar(""));
    }
}
