//! Configuration Module
//!
//! Environment-driven configuration for the alert feed client.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, NotificationSettings, PersonalKey, ReconnectMode,
    ReconnectSettings,
};
