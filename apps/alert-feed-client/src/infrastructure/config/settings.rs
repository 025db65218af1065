//! Client Configuration Settings
//!
//! Configuration types for the alert feed client, loaded from environment
//! variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::{ConnectionSettings, ReconnectConfig};
use crate::infrastructure::handlers::{DEFAULT_CALENDAR_URL, DesktopNotificationConfig};
use crate::infrastructure::stomp::{HeartbeatConfig, StompClientConfig};

const SERVER_URL: &str = "ALERT_FEED_SERVER_URL";
const PERSONAL_KEY: &str = "ALERT_FEED_PERSONAL_KEY";
const RECONNECT_DELAY_SECS: &str = "ALERT_FEED_RECONNECT_DELAY_SECS";
const RECONNECT_STRATEGY: &str = "ALERT_FEED_RECONNECT_STRATEGY";
const RECONNECT_DELAY_MAX_SECS: &str = "ALERT_FEED_RECONNECT_DELAY_MAX_SECS";
const MAX_RECONNECT_ATTEMPTS: &str = "ALERT_FEED_MAX_RECONNECT_ATTEMPTS";
const HEARTBEAT_SEND_MS: &str = "ALERT_FEED_HEARTBEAT_SEND_MS";
const HEARTBEAT_RECEIVE_MS: &str = "ALERT_FEED_HEARTBEAT_RECEIVE_MS";
const CONNECT_TIMEOUT_SECS: &str = "ALERT_FEED_CONNECT_TIMEOUT_SECS";
const HEALTH_PORT: &str = "ALERT_FEED_HEALTH_PORT";
const DESKTOP_NOTIFICATIONS: &str = "ALERT_FEED_DESKTOP_NOTIFICATIONS";
const CALENDAR_URL: &str = "ALERT_FEED_CALENDAR_URL";
const ICON_PATH: &str = "ALERT_FEED_ICON_PATH";

/// Reconnect delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectMode {
    /// Same delay before every attempt.
    #[default]
    Fixed,
    /// Exponential backoff with jitter, capped at the maximum delay.
    Exponential,
}

impl FromStr for ReconnectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            _ => Err("expected `fixed` or `exponential`".to_string()),
        }
    }
}

/// Key naming this client's alert topic.
#[derive(Clone, PartialEq, Eq)]
pub struct PersonalKey(String);

impl PersonalKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// The raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PersonalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PersonalKey([REDACTED])")
    }
}

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectSettings {
    /// Delay before a reconnect attempt (initial delay for backoff).
    pub delay: Duration,
    /// Delay strategy.
    pub mode: ReconnectMode,
    /// Backoff cap.
    pub delay_max: Duration,
    /// Maximum consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            mode: ReconnectMode::Fixed,
            delay_max: Duration::from_secs(60),
            max_attempts: 0, // Unlimited
        }
    }
}

/// Desktop notification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    /// Whether the dialog handler is registered.
    pub desktop_enabled: bool,
    /// Link opened by the Open Calendar button.
    pub calendar_url: String,
    /// Optional dialog icon.
    pub icon_path: Option<PathBuf>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop_enabled: cfg!(target_os = "macos"),
            calendar_url: DEFAULT_CALENDAR_URL.to_string(),
            icon_path: None,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket STOMP endpoint.
    pub server_url: String,
    /// Topic key.
    pub personal_key: PersonalKey,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Heart-beat intervals advertised to the server.
    pub heartbeat: HeartbeatConfig,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Health and metrics HTTP port (0 = disabled).
    pub health_port: u16,
    /// Desktop notification settings.
    pub notifications: NotificationSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, or if a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let server_url = env.required(SERVER_URL)?;
        let personal_key = PersonalKey::new(env.required(PERSONAL_KEY)?);

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            delay: Duration::from_secs(env.parse_at_least(
                RECONNECT_DELAY_SECS,
                defaults.delay.as_secs(),
                1,
            )?),
            mode: env.parse(RECONNECT_STRATEGY, defaults.mode)?,
            delay_max: Duration::from_secs(env.parse_at_least(
                RECONNECT_DELAY_MAX_SECS,
                defaults.delay_max.as_secs(),
                1,
            )?),
            max_attempts: env.parse(MAX_RECONNECT_ATTEMPTS, defaults.max_attempts)?,
        };

        let heartbeat_defaults = HeartbeatConfig::default();
        let heartbeat = HeartbeatConfig::new(
            Duration::from_millis(env.parse(
                HEARTBEAT_SEND_MS,
                heartbeat_defaults.header_value().0,
            )?),
            Duration::from_millis(env.parse(
                HEARTBEAT_RECEIVE_MS,
                heartbeat_defaults.header_value().1,
            )?),
        );

        let connect_timeout = Duration::from_secs(env.parse_at_least(
            CONNECT_TIMEOUT_SECS,
            StompClientConfig::default().connect_timeout.as_secs(),
            1,
        )?);

        let notification_defaults = NotificationSettings::default();
        let notifications = NotificationSettings {
            desktop_enabled: env.parse_bool(
                DESKTOP_NOTIFICATIONS,
                notification_defaults.desktop_enabled,
            )?,
            calendar_url: env
                .optional(CALENDAR_URL)
                .unwrap_or(notification_defaults.calendar_url),
            icon_path: env.optional(ICON_PATH).map(PathBuf::from),
        };

        Ok(Self {
            server_url,
            personal_key,
            reconnect,
            heartbeat,
            connect_timeout,
            health_port: env.parse(HEALTH_PORT, 0)?,
            notifications,
        })
    }

    /// Reconnect policy configuration.
    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        let config = match self.reconnect.mode {
            ReconnectMode::Fixed => ReconnectConfig::fixed(self.reconnect.delay),
            ReconnectMode::Exponential => {
                ReconnectConfig::exponential(self.reconnect.delay, self.reconnect.delay_max)
            }
        };
        config.with_max_attempts(self.reconnect.max_attempts)
    }

    /// Connection manager settings.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            server_url: self.server_url.clone(),
            personal_key: self.personal_key.expose().to_string(),
            reconnect: self.reconnect_config(),
        }
    }

    /// STOMP transport configuration.
    #[must_use]
    pub fn stomp_config(&self) -> StompClientConfig {
        StompClientConfig {
            heartbeat: self.heartbeat,
            connect_timeout: self.connect_timeout,
            virtual_host: None,
        }
    }

    /// Desktop dialog configuration.
    #[must_use]
    pub fn desktop_config(&self) -> DesktopNotificationConfig {
        DesktopNotificationConfig {
            calendar_url: self.notifications.calendar_url.clone(),
            icon_path: self.notifications.icon_path.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed or is out of range.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

/// Typed access to a key lookup.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty value, trimmed. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
                value,
            })
        })
    }

    fn parse_at_least(&self, key: &str, default: u64, min: u64) -> Result<u64, ConfigError> {
        let value = self.parse(key, default)?;
        if value < min {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: format!("must be at least {min}"),
            });
        }
        Ok(value)
    }

    fn parse_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        (SERVER_URL, "wss://alerts.example.com/ws"),
        (PERSONAL_KEY, "abc123"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = config_from(&REQUIRED).unwrap();

        assert_eq!(config.server_url, "wss://alerts.example.com/ws");
        assert_eq!(config.personal_key.expose(), "abc123");
        assert_eq!(config.reconnect, ReconnectSettings::default());
        assert_eq!(config.heartbeat, HeartbeatConfig::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.health_port, 0);
        assert_eq!(config.notifications.calendar_url, DEFAULT_CALENDAR_URL);
        assert_eq!(config.notifications.icon_path, None);
        assert_eq!(config.reconnect_config(), ReconnectConfig::default());
    }

    #[test]
    fn missing_server_url_is_reported() {
        let err = config_from(&[(PERSONAL_KEY, "abc123")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar(SERVER_URL.to_string()));
    }

    #[test]
    fn blank_personal_key_is_reported() {
        let err = config_from(&[(SERVER_URL, "ws://localhost/ws"), (PERSONAL_KEY, "  ")])
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyValue(PERSONAL_KEY.to_string()));
    }

    #[test_case(RECONNECT_DELAY_SECS, "0" ; "delay below one second")]
    #[test_case(RECONNECT_DELAY_SECS, "five" ; "delay not a number")]
    #[test_case(RECONNECT_STRATEGY, "linear" ; "unknown strategy")]
    #[test_case(HEALTH_PORT, "70000" ; "port out of range")]
    #[test_case(DESKTOP_NOTIFICATIONS, "maybe" ; "not a boolean")]
    fn invalid_values_are_rejected(key: &str, value: &str) {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((key, value));

        match config_from(&pairs).unwrap_err() {
            ConfigError::InvalidValue { key: k, value: v, .. } => {
                assert_eq!(k, key);
                assert_eq!(v, value);
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn exponential_strategy_maps_to_backoff() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            (RECONNECT_STRATEGY, "Exponential"),
            (RECONNECT_DELAY_SECS, "2"),
            (RECONNECT_DELAY_MAX_SECS, "30"),
            (MAX_RECONNECT_ATTEMPTS, "10"),
        ]);
        let config = config_from(&pairs).unwrap();

        assert_eq!(
            config.reconnect_config(),
            ReconnectConfig::exponential(Duration::from_secs(2), Duration::from_secs(30))
                .with_max_attempts(10)
        );
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            (HEARTBEAT_SEND_MS, "10000"),
            (HEARTBEAT_RECEIVE_MS, "0"),
            (CONNECT_TIMEOUT_SECS, "3"),
            (HEALTH_PORT, "8085"),
            (DESKTOP_NOTIFICATIONS, "off"),
            (CALENDAR_URL, "https://calendar.example.com"),
            (ICON_PATH, "/opt/alerts/app.icns"),
        ]);
        let config = config_from(&pairs).unwrap();

        assert_eq!(config.heartbeat.header_value(), (10_000, 0));
        assert_eq!(config.stomp_config().connect_timeout, Duration::from_secs(3));
        assert_eq!(config.health_port, 8085);
        assert!(!config.notifications.desktop_enabled);
        assert_eq!(
            config.desktop_config(),
            DesktopNotificationConfig {
                calendar_url: "https://calendar.example.com".to_string(),
                icon_path: Some(PathBuf::from("/opt/alerts/app.icns")),
            }
        );
    }

    #[test]
    fn connection_settings_carry_topic_key() {
        let settings = config_from(&REQUIRED).unwrap().connection_settings();
        assert_eq!(settings.personal_key, "abc123");
        assert_eq!(settings.server_url, "wss://alerts.example.com/ws");
    }

    #[test]
    fn personal_key_is_redacted_in_debug() {
        let config = config_from(&REQUIRED).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("abc123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
