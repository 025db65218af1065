//! Alert Feed Client Binary
//!
//! Subscribes to the user's alert topic and shows incoming alerts.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin alert-feed-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALERT_FEED_SERVER_URL`: WebSocket endpoint of the alert server
//! - `ALERT_FEED_PERSONAL_KEY`: Key naming the alert topic
//!
//! ## Optional
//! - `ALERT_FEED_RECONNECT_DELAY_SECS`: Delay before reconnecting (default: 5)
//! - `ALERT_FEED_RECONNECT_STRATEGY`: fixed | exponential (default: fixed)
//! - `ALERT_FEED_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 0)
//! - `ALERT_FEED_DESKTOP_NOTIFICATIONS`: Show macOS dialogs (default: on macOS)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use alert_feed_client::application::ports::{AlertHandler, TaskScheduler};
use alert_feed_client::infrastructure::health::{HealthServer, HealthServerState};
use alert_feed_client::infrastructure::telemetry;
use alert_feed_client::{
    Alert, AlertType, ClientConfig, ConnectionManager, DesktopNotificationHandler,
    FrameDispatcher, HeartbeatScheduler, LoggingAlertHandler, StompClient, TokioTaskScheduler,
    init_metrics,
};
use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for scheduled tasks after shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv_from_ancestors();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Alert Feed Client");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Alert handlers, in delivery order
    let mut handlers: Vec<Arc<dyn AlertHandler>> = vec![Arc::new(LoggingAlertHandler::new())];
    if config.notifications.desktop_enabled {
        handlers.push(Arc::new(DesktopNotificationHandler::new(
            config.desktop_config(),
        )));
    }
    let dispatcher = FrameDispatcher::new(handlers);

    // Reconnects use the scheduler directly; heart-beats go through the logging wrapper
    let tokio_scheduler = Arc::new(TokioTaskScheduler::new());
    let heartbeat_scheduler: Arc<dyn TaskScheduler> = Arc::new(HeartbeatScheduler::new(
        Arc::clone(&tokio_scheduler) as Arc<dyn TaskScheduler>,
    ));

    let connector = Arc::new(StompClient::new(config.stomp_config(), heartbeat_scheduler));
    let manager = ConnectionManager::new(
        config.connection_settings(),
        connector,
        dispatcher,
        Arc::clone(&tokio_scheduler) as Arc<dyn TaskScheduler>,
    );

    // Startup notification goes through the same handlers as feed alerts
    let outcome = manager
        .dispatcher()
        .dispatch(&Alert::new("Alert Feed Client Started", AlertType::StartingNow));
    tracing::debug!(
        delivered = outcome.delivered,
        failed = outcome.failed,
        "Startup alert dispatched"
    );

    if config.health_port != 0 {
        if let Err(e) = init_metrics() {
            tracing::warn!(error = %e, "Prometheus recorder unavailable; /metrics disabled");
        }

        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            manager.clone(),
        ));
        let health_server =
            HealthServer::new(config.health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    manager.connect();

    tracing::info!("Alert feed client ready");

    await_shutdown(shutdown_token).await?;

    manager.shutdown().await;
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, tokio_scheduler.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Scheduled tasks did not finish before the shutdown timeout"
        );
    }

    tracing::info!("Alert feed client stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        server_url = %config.server_url,
        reconnect_delay_secs = config.reconnect.delay.as_secs(),
        health_port = config.health_port,
        desktop_notifications = config.notifications.desktop_enabled,
        "Configuration loaded"
    );
    let (heartbeat_send_ms, heartbeat_receive_ms) = config.heartbeat.header_value();
    tracing::debug!(
        topic = %FrameDispatcher::topic_for(config.personal_key.expose()),
        heartbeat_send_ms,
        heartbeat_receive_ms,
        "Subscription target"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
    Ok(())
}
