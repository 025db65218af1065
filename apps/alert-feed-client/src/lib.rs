#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Alert Feed Client - Topic Subscription Daemon
//!
//! Keeps one STOMP-over-WebSocket subscription to the alert server alive
//! and fans every alert published on the user's topic out to local
//! notification handlers. Connectivity failures never end the process:
//! they collapse into a single delayed reconnect.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Alert values and the connection state machine
//!   - `alert`: `Alert` and `AlertType`
//!   - `connection`: `ConnectionState` transitions
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for sessions, handlers, and task scheduling
//!   - `services`: Connection lifecycle, frame dispatch, reconnect policy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stomp`: STOMP 1.2 codec, heart-beats, WebSocket session connector
//!   - `scheduler`: Tokio task scheduler and its logging decorator
//!   - `handlers`: Log line and macOS dialog alert handlers
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                    ┌───────────────────┐
//! Alert server ─WS──►│    StompClient    │── MESSAGE ─┐
//!                    └─────────▲─────────┘            │
//!                              │ connect              ▼
//!                    ┌─────────┴─────────┐   ┌─────────────────┐
//!                    │ ConnectionManager │   │ FrameDispatcher │──► Handler 1
//!                    └─────────┬─────────┘   └─────────────────┘──► Handler N
//!                              │ reconnect after delay
//!                    ┌─────────▼─────────┐
//!                    │ HeartbeatScheduler│
//!                    └───────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Alert types and connection states with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alert::{Alert, AlertType};
pub use domain::connection::{ConnectionEvent, ConnectionState};

// Ports
pub use application::ports::{
    AlertHandler, HandlerError, InboundFrame, Session, SessionConnector, SessionError,
    SessionHandler, TaskScheduler,
};

// Services
pub use application::services::{
    ConnectionManager, ConnectionSettings, DispatchOutcome, FrameDispatcher, ReconnectConfig,
    ReconnectStrategy,
};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, PersonalKey, ReconnectMode};

// Transport and scheduling
pub use infrastructure::scheduler::{HeartbeatScheduler, TokioTaskScheduler};
pub use infrastructure::stomp::{HeartbeatConfig, StompClient, StompClientConfig};

// Handlers
pub use infrastructure::handlers::{
    DesktopNotificationConfig, DesktopNotificationHandler, LoggingAlertHandler,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
