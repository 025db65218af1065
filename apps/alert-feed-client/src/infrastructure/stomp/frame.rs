//! STOMP Frame Types
//!
//! Commands and frames for the subset of STOMP 1.2 the client speaks.

use std::fmt;
use std::str::FromStr;

/// Frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    // Client frames
    /// Open a session.
    Connect,
    /// Open a session (STOMP 1.1+ alias of `CONNECT`).
    Stomp,
    /// Register interest in a destination.
    Subscribe,
    /// Drop a subscription.
    Unsubscribe,
    /// Publish to a destination.
    Send,
    /// Close the session.
    Disconnect,

    // Server frames
    /// Handshake accepted.
    Connected,
    /// A message on a subscribed destination.
    Message,
    /// Acknowledges a frame carrying a `receipt` header.
    Receipt,
    /// Server-side failure; the server closes the connection after sending it.
    Error,
}

impl StompCommand {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// `CONNECT`, `STOMP` and `CONNECTED` frames carry headers verbatim.
    #[must_use]
    pub const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(other.to_string()),
        })
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order. When a header repeats, the first
/// occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: Vec<u8>,
}

impl StompFrame {
    /// Frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `CONNECT` frame for `host` advertising heart-beat intervals in milliseconds.
    #[must_use]
    pub fn connect(host: &str, heart_beat: (u64, u64)) -> Self {
        Self::new(StompCommand::Connect)
            .header("accept-version", "1.1,1.2")
            .header("host", host)
            .header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1))
    }

    /// `SUBSCRIBE` frame with automatic acknowledgement.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// `DISCONNECT` frame.
    #[must_use]
    pub const fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// Human-readable summary of an `ERROR` frame.
    #[must_use]
    pub fn error_summary(&self) -> String {
        let message = self.get("message").unwrap_or("no message header");
        let body = String::from_utf8_lossy(&self.body);
        let body = body.trim();
        if body.is_empty() {
            message.to_string()
        } else {
            format!("{message}: {body}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip() {
        for command in [
            StompCommand::Connect,
            StompCommand::Subscribe,
            StompCommand::Message,
            StompCommand::Error,
        ] {
            assert_eq!(command.as_str().parse::<StompCommand>(), Ok(command));
        }
        assert!("NACK".parse::<StompCommand>().is_err());
    }

    #[test]
    fn first_header_wins() {
        let frame = StompFrame::new(StompCommand::Message)
            .header("destination", "/topic/a")
            .header("destination", "/topic/b");
        assert_eq!(frame.get("destination"), Some("/topic/a"));
        assert_eq!(frame.get("missing"), None);
    }

    #[test]
    fn subscribe_uses_auto_ack() {
        let frame = StompFrame::subscribe("sub-0", "/topic/abc123");
        assert_eq!(frame.get("id"), Some("sub-0"));
        assert_eq!(frame.get("destination"), Some("/topic/abc123"));
        assert_eq!(frame.get("ack"), Some("auto"));
    }

    #[test]
    fn connect_advertises_heart_beat() {
        let frame = StompFrame::connect("feed.example.com", (30_000, 30_000));
        assert_eq!(frame.get("accept-version"), Some("1.1,1.2"));
        assert_eq!(frame.get("heart-beat"), Some("30000,30000"));
    }

    #[test]
    fn error_summary_includes_body() {
        let frame = StompFrame::new(StompCommand::Error)
            .header("message", "malformed frame")
            .body("missing destination\n");
        assert_eq!(frame.error_summary(), "malformed frame: missing destination");
    }
}
