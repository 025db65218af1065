//! Health Check and Metrics Endpoint
//!
//! Optional HTTP endpoint reporting the feed connection and exposing
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON connection status
//! - `GET /healthz` - liveness (simple OK)
//! - `GET /readyz` - readiness (OK only while connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::ConnectionManager;
use crate::domain::connection::ConnectionState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Client version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection status.
    pub connection: ConnectionInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Subscribed and receiving.
    Healthy,
    /// Connecting or waiting to reconnect.
    Degraded,
    /// Not connected and not trying.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::ReconnectPending => Self::Degraded,
            ConnectionState::Disconnected | ConnectionState::ShuttingDown => Self::Unhealthy,
        }
    }
}

/// Feed connection status.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Lifecycle state.
    pub state: &'static str,
    /// Whether the subscription is live.
    pub connected: bool,
    /// Generation of the most recent connection attempt.
    pub session_generation: u64,
    /// Consecutive failed attempts (0 while connected).
    pub reconnect_attempts: u32,
    /// Reconnects scheduled since startup.
    pub reconnects_scheduled: u64,
    /// Registered alert handlers.
    pub handlers: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    manager: ConnectionManager,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, manager: ConnectionManager) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            manager,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.manager.state() == ConnectionState::Connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let manager = &state.manager;
    let connection_state = manager.state();

    HealthResponse {
        status: connection_state.into(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection: ConnectionInfo {
            state: connection_state.as_str(),
            connected: connection_state == ConnectionState::Connected,
            session_generation: manager.session_generation(),
            reconnect_attempts: manager.reconnect_attempts(),
            reconnects_scheduled: manager.reconnects_scheduled(),
            handlers: manager.dispatcher().handler_count(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        MockSession, Session, SessionConnector, SessionError, SessionHandler,
    };
    use crate::application::services::{ConnectionSettings, FrameDispatcher, ReconnectConfig};
    use crate::infrastructure::scheduler::TokioTaskScheduler;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct AlwaysAccept;

    #[async_trait]
    impl SessionConnector for AlwaysAccept {
        async fn connect(
            &self,
            _url: &str,
            _handler: Arc<dyn SessionHandler>,
        ) -> Result<Arc<dyn Session>, SessionError> {
            let mut session = MockSession::new();
            session
                .expect_subscribe()
                .returning(|_| Ok("sub-0".to_string()));
            session.expect_disconnect().returning(|| ());
            session.expect_is_connected().return_const(true);
            Ok(Arc::new(session))
        }
    }

    fn state() -> Arc<HealthServerState> {
        let manager = ConnectionManager::new(
            ConnectionSettings {
                server_url: "ws://feed.test/ws".to_string(),
                personal_key: "abc123".to_string(),
                reconnect: ReconnectConfig::default(),
            },
            Arc::new(AlwaysAccept),
            FrameDispatcher::new(Vec::new()),
            Arc::new(TokioTaskScheduler::new()),
        );
        Arc::new(HealthServerState::new("0.1.0".to_string(), manager))
    }

    async fn get_status(state: &Arc<HealthServerState>, uri: &str) -> StatusCode {
        router(Arc::clone(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn health_status_follows_connection_state() {
        assert_eq!(
            HealthStatus::from(ConnectionState::Connected),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from(ConnectionState::ReconnectPending),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from(ConnectionState::Disconnected),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(get_status(&state(), "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_requires_connection() {
        let state = state();
        assert_eq!(
            get_status(&state, "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(&state, "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.manager.connect();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(state.manager.state(), ConnectionState::Connected);
        assert_eq!(get_status(&state, "/readyz").await, StatusCode::OK);
        assert_eq!(get_status(&state, "/health").await, StatusCode::OK);
    }

    #[test]
    fn response_reports_connection_details() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let state = runtime.block_on(async { state() });

        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(response.connection.state, "disconnected");
        assert_eq!(response.connection.session_generation, 0);
        assert_eq!(response.connection.handlers, 0);
        assert_eq!(response.version, "0.1.0");
    }
}
