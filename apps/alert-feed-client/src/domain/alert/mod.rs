//! Alert Types
//!
//! Immutable notification values delivered by the feed (or created locally)
//! and consumed once by the handler set.
//!
//! # Wire Format
//!
//! ```json
//! {"title":"Standup","type":"STARTING_NOW"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// How soon the alerted event starts.
///
/// The set is fixed; every variant carries exactly one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// The event is starting right now.
    StartingNow,
    /// The event starts in one minute.
    OneMinute,
    /// The event starts in five minutes.
    FiveMinutes,
    /// The event starts in ten minutes.
    TenMinutes,
    /// The event starts in fifteen minutes.
    FifteenMinutes,
}

impl AlertType {
    /// All variants, in ascending lead time.
    pub const ALL: [Self; 5] = [
        Self::StartingNow,
        Self::OneMinute,
        Self::FiveMinutes,
        Self::TenMinutes,
        Self::FifteenMinutes,
    ];

    /// Human-readable message shown alongside the alert title.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::StartingNow => "Starting now",
            Self::OneMinute => "Starts in 1 minute",
            Self::FiveMinutes => "Starts in 5 minutes",
            Self::TenMinutes => "Starts in 10 minutes",
            Self::FifteenMinutes => "Starts in 15 minutes",
        }
    }

    /// Wire name of the variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartingNow => "STARTING_NOW",
            Self::OneMinute => "ONE_MINUTE",
            Self::FiveMinutes => "FIVE_MINUTES",
            Self::TenMinutes => "TEN_MINUTES",
            Self::FifteenMinutes => "FIFTEEN_MINUTES",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A single notification.
///
/// Fields are private so a constructed alert cannot be mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    title: String,
    #[serde(rename = "type")]
    alert_type: AlertType,
}

impl Alert {
    /// Create a new alert.
    #[must_use]
    pub fn new(title: impl Into<String>, alert_type: AlertType) -> Self {
        Self {
            title: title.into(),
            alert_type,
        }
    }

    /// Alert title (usually the meeting name).
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Alert type.
    #[must_use]
    pub const fn alert_type(&self) -> AlertType {
        self.alert_type
    }

    /// Title and type message joined for display, e.g. `Standup - Starting now`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} - {}", self.title, self.alert_type.message())
    }
}
