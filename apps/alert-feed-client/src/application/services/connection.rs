//! Connection Manager
//!
//! Owns the feed connection lifecycle: connect, subscribe, detect failure,
//! schedule exactly one reconnect at a time, and re-enter the cycle.
//!
//! # Guarantees
//!
//! - At most one connection attempt is in flight. `connect()` while
//!   connecting or connected is a no-op.
//! - At most one reconnect task is pending. Concurrent failure callbacks
//!   for the same broken session collapse into a single task.
//! - Every attempt gets a new session generation. Frames and errors that
//!   arrive from an older generation are discarded.
//! - No session error is fatal; the manager keeps reconnecting until
//!   [`ConnectionManager::shutdown`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::time::Instant;

use super::dispatcher::FrameDispatcher;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    InboundFrame, ScheduledTask, Session, SessionConnector, SessionError, SessionHandler, Task,
    TaskScheduler,
};
use crate::domain::connection::{ConnectionEvent, ConnectionState};
use crate::infrastructure::metrics;

/// Settings consumed by the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Server endpoint.
    pub server_url: String,
    /// Key identifying this client's alert topic.
    pub personal_key: String,
    /// Reconnect delay policy.
    pub reconnect: ReconnectConfig,
}

/// Connection lifecycle manager.
///
/// Cheap to clone; clones share the same connection.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use alert_feed_client::application::services::{
///     ConnectionManager, ConnectionSettings, FrameDispatcher, ReconnectConfig,
/// };
/// use alert_feed_client::infrastructure::scheduler::{HeartbeatScheduler, TokioTaskScheduler};
/// use alert_feed_client::infrastructure::stomp::{StompClient, StompClientConfig};
///
/// # async fn example() {
/// let scheduler = Arc::new(TokioTaskScheduler::new());
/// let heartbeats = Arc::new(HeartbeatScheduler::new(scheduler.clone()));
/// let connector = Arc::new(StompClient::new(StompClientConfig::default(), heartbeats));
///
/// let manager = ConnectionManager::new(
///     ConnectionSettings {
///         server_url: "ws://localhost:8080/ws".to_string(),
///         personal_key: "abc123".to_string(),
///         reconnect: ReconnectConfig::default(),
///     },
///     connector,
///     FrameDispatcher::new(Vec::new()),
///     scheduler,
/// );
///
/// manager.connect();
/// # manager.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
}

struct ManagerShared {
    settings: ConnectionSettings,
    connector: Arc<dyn SessionConnector>,
    dispatcher: FrameDispatcher,
    scheduler: Arc<dyn TaskScheduler>,
    runtime: Handle,
    // Lock order: state, then session / reconnect_task.
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
    session: Mutex<Option<Arc<dyn Session>>>,
    reconnect_task: Mutex<Option<ScheduledTask>>,
    policy: Mutex<ReconnectPolicy>,
    reconnects_scheduled: AtomicU64,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("server_url", &self.shared.settings.server_url)
            .field("state", &self.state())
            .field("generation", &self.session_generation())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state.
    ///
    /// The connector is reused for every attempt. The scheduler runs the
    /// reconnect tasks and is shut down by [`ConnectionManager::shutdown`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn SessionConnector>,
        dispatcher: FrameDispatcher,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        let policy = ReconnectPolicy::new(settings.reconnect.clone());
        Self {
            shared: Arc::new(ManagerShared {
                settings,
                connector,
                dispatcher,
                scheduler,
                runtime: Handle::current(),
                state: RwLock::new(ConnectionState::Disconnected),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                policy: Mutex::new(policy),
                reconnects_scheduled: AtomicU64::new(0),
            }),
        }
    }

    /// Start a connection attempt without waiting for it.
    ///
    /// No-op while connecting, connected, or shutting down.
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Schedule a reconnect after the configured delay.
    ///
    /// No-op if a reconnect task is already scheduled and has not completed.
    pub fn schedule_reconnect(&self) {
        self.shared.schedule_reconnect();
    }

    /// Cancel pending work, close the live session, and release the scheduler.
    pub async fn shutdown(&self) {
        let session = {
            let mut state = self.shared.state.write();
            match state.on(ConnectionEvent::Shutdown) {
                Ok(next) => *state = next,
                Err(_) => return,
            }
            self.shared.session.lock().take()
        };

        if let Some(task) = self.shared.reconnect_task.lock().take() {
            task.cancel();
        }
        self.shared.scheduler.shutdown();

        if let Some(session) = session {
            session.disconnect().await;
        }

        metrics::set_connection_state(ConnectionState::ShuttingDown);
        tracing::info!("Connection manager shut down");
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Generation of the most recent connection attempt (0 before the first).
    #[must_use]
    pub fn session_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Whether a reconnect task is scheduled and has not yet fired.
    #[must_use]
    pub fn is_reconnect_pending(&self) -> bool {
        self.shared
            .reconnect_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_done())
    }

    /// Consecutive failed attempts since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.policy.lock().attempt_count()
    }

    /// Total reconnect tasks scheduled over the manager's lifetime.
    #[must_use]
    pub fn reconnects_scheduled(&self) -> u64 {
        self.shared.reconnects_scheduled.load(Ordering::SeqCst)
    }

    /// The dispatcher receiving this connection's frames.
    #[must_use]
    pub fn dispatcher(&self) -> &FrameDispatcher {
        &self.shared.dispatcher
    }

    /// Settings the manager was built with.
    #[must_use]
    pub fn settings(&self) -> &ConnectionSettings {
        &self.shared.settings
    }
}

impl ManagerShared {
    fn connect(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state.write();
            match state.on(ConnectionEvent::Connect) {
                Ok(next) => *state = next,
                Err(e) => {
                    tracing::debug!(state = %*state, reason = %e, "Ignoring connect request");
                    return;
                }
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        self.start_attempt(generation);
    }

    fn start_attempt(self: &Arc<Self>, generation: u64) {
        metrics::set_connection_state(ConnectionState::Connecting);

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            shared.establish(generation).await;
        });
    }

    async fn establish(self: Arc<Self>, generation: u64) {
        tracing::info!(
            url = %self.settings.server_url,
            generation,
            "Connecting to alert feed"
        );

        let callbacks: Arc<dyn SessionHandler> = Arc::new(SessionCallbacks {
            manager: Arc::downgrade(&self),
            generation,
        });

        let session = match self
            .connector
            .connect(&self.settings.server_url, callbacks)
            .await
        {
            Ok(session) => session,
            Err(error) => {
                self.on_session_failure(generation, &error);
                return;
            }
        };

        if !self.is_current(generation) {
            tracing::debug!(generation, "Handshake finished for a superseded attempt");
            session.disconnect().await;
            return;
        }

        if let Err(error) = self
            .dispatcher
            .subscribe(session.as_ref(), &self.settings.personal_key)
            .await
        {
            session.disconnect().await;
            self.on_session_failure(generation, &error);
            return;
        }

        let established = {
            let mut state = self.state.write();
            let current = self.generation.load(Ordering::SeqCst) == generation;
            match state.on(ConnectionEvent::Established) {
                Ok(next) if current => {
                    *state = next;
                    *self.session.lock() = Some(Arc::clone(&session));
                    true
                }
                _ => false,
            }
        };

        if established {
            self.policy.lock().reset();
            metrics::set_connection_state(ConnectionState::Connected);
            tracing::info!(generation, "Connected to alert feed");
        } else {
            tracing::debug!(generation, "Session superseded before it was established");
            session.disconnect().await;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.read();
        state.accepts_frames() && self.generation.load(Ordering::SeqCst) == generation
    }

    fn on_session_failure(self: &Arc<Self>, generation: u64, error: &SessionError) {
        let broken_session = {
            let mut state = self.state.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, error = %error, "Ignoring error from superseded session");
                return;
            }
            if *state == ConnectionState::ReconnectPending {
                tracing::debug!(generation, error = %error, "Failure already reported; reconnect pending");
                return;
            }
            match state.on(ConnectionEvent::Failed) {
                Ok(next) => *state = next,
                Err(_) => return,
            }
            self.session.lock().take()
        };

        tracing::error!(
            kind = error.kind(),
            error = %error,
            generation,
            "Alert feed connection failed"
        );
        metrics::record_session_error(error.kind());
        metrics::set_connection_state(ConnectionState::ReconnectPending);

        if let Some(session) = broken_session {
            self.runtime.spawn(async move {
                session.disconnect().await;
            });
        }

        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let state = self.state.read();
        if *state == ConnectionState::ShuttingDown {
            tracing::debug!("Shutting down; not scheduling reconnect");
            return;
        }

        let mut slot = self.reconnect_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_done()) {
            tracing::debug!("Reconnect already scheduled");
            return;
        }

        let (delay, attempt) = {
            let mut policy = self.policy.lock();
            (policy.next_delay(), policy.attempt_count())
        };
        let Some(delay) = delay else {
            drop(slot);
            drop(state);
            self.give_up();
            return;
        };

        let manager = Arc::downgrade(self);
        let task: Task = Box::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.fire_reconnect();
            }
        });

        match self.scheduler.schedule(task, Instant::now() + delay) {
            Ok(handle) => {
                *slot = Some(handle);
                self.reconnects_scheduled.fetch_add(1, Ordering::SeqCst);
                metrics::record_reconnect_scheduled();
                tracing::info!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "Scheduling reconnect"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not schedule reconnect");
            }
        }
    }

    fn fire_reconnect(self: &Arc<Self>) {
        // Slot clear and Connect transition share the state lock.
        let generation = {
            let mut state = self.state.write();
            drop(self.reconnect_task.lock().take());
            match state.on(ConnectionEvent::Connect) {
                Ok(next) => *state = next,
                Err(e) => {
                    tracing::debug!(state = %*state, reason = %e, "Reconnect no longer needed");
                    return;
                }
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        tracing::info!(generation, "Reconnecting to alert feed");
        self.start_attempt(generation);
    }

    fn give_up(&self) {
        let max_attempts = self.settings.reconnect.max_attempts;
        let mut state = self.state.write();
        if let Ok(next) = state.on(ConnectionEvent::Exhausted) {
            *state = next;
            metrics::set_connection_state(next);
        }
        tracing::error!(max_attempts, "Reconnect attempts exhausted; staying disconnected");
    }
}

/// Per-session callbacks handed to the transport.
///
/// Holds a weak back-reference to the manager and the generation of the
/// attempt that created it.
struct SessionCallbacks {
    manager: Weak<ManagerShared>,
    generation: u64,
}

impl SessionHandler for SessionCallbacks {
    fn handle_frame(&self, frame: &InboundFrame) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if !manager.is_current(self.generation) {
            tracing::debug!(
                generation = self.generation,
                destination = %frame.destination,
                "Discarding frame from superseded session"
            );
            metrics::record_stale_frame();
            return;
        }
        manager.dispatcher.dispatch_frame(frame);
    }

    fn handle_exception(&self, error: SessionError) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_session_failure(self.generation, &error);
        }
    }

    fn handle_transport_error(&self, error: SessionError) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_session_failure(self.generation, &error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{AlertHandler, HandlerError, MockSession};
    use crate::domain::alert::Alert;
    use crate::infrastructure::scheduler::TokioTaskScheduler;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Connector that replays scripted outcomes and keeps every handler.
    #[derive(Default)]
    struct ScriptedConnector {
        outcomes: Mutex<VecDeque<Result<(), SessionError>>>,
        handlers: Mutex<Vec<Arc<dyn SessionHandler>>>,
    }

    impl ScriptedConnector {
        fn with(outcomes: impl IntoIterator<Item = Result<(), SessionError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                handlers: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.handlers.lock().len()
        }

        fn handler(&self, index: usize) -> Arc<dyn SessionHandler> {
            Arc::clone(&self.handlers.lock()[index])
        }
    }

    fn live_session() -> Arc<dyn Session> {
        let mut session = MockSession::new();
        session
            .expect_subscribe()
            .returning(|topic| Ok(format!("sub-{topic}")));
        session.expect_disconnect().returning(|| ());
        session.expect_is_connected().return_const(true);
        Arc::new(session)
    }

    #[async_trait]
    impl SessionConnector for ScriptedConnector {
        async fn connect(
            &self,
            _url: &str,
            handler: Arc<dyn SessionHandler>,
        ) -> Result<Arc<dyn Session>, SessionError> {
            self.handlers.lock().push(handler);
            let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
            outcome.map(|()| live_session())
        }
    }

    struct Counting(AtomicU64);

    impl AlertHandler for Counting {
        fn handle(&self, _alert: &Alert) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager_with(
        connector: Arc<ScriptedConnector>,
        handler: Arc<Counting>,
    ) -> ConnectionManager {
        ConnectionManager::new(
            ConnectionSettings {
                server_url: "ws://feed.test/ws".to_string(),
                personal_key: "abc123".to_string(),
                reconnect: ReconnectConfig::fixed(Duration::from_secs(5)),
            },
            connector,
            FrameDispatcher::new([handler as Arc<dyn AlertHandler>]),
            Arc::new(TokioTaskScheduler::new()),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn frame() -> InboundFrame {
        InboundFrame::new("/topic/abc123", r#"{"title":"Standup","type":"STARTING_NOW"}"#)
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reaches_connected() {
        let connector = ScriptedConnector::with([]);
        let manager = manager_with(connector.clone(), Arc::new(Counting(AtomicU64::new(0))));

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.session_generation(), 1);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent() {
        let connector = ScriptedConnector::with([]);
        let manager = manager_with(connector.clone(), Arc::new(Counting(AtomicU64::new(0))));

        manager.connect();
        manager.connect();
        settle().await;
        manager.connect();
        settle().await;

        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_failure_schedules_single_reconnect() {
        let connector =
            ScriptedConnector::with([Err(SessionError::Handshake("refused".to_string()))]);
        let manager = manager_with(connector.clone(), Arc::new(Counting(AtomicU64::new(0))));

        manager.connect();
        settle().await;

        assert_eq!(manager.state(), ConnectionState::ReconnectPending);
        assert!(manager.is_reconnect_pending());
        assert_eq!(manager.reconnects_scheduled(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_collapse_into_one_task() {
        let connector = ScriptedConnector::with([]);
        let manager = manager_with(connector.clone(), Arc::new(Counting(AtomicU64::new(0))));
        manager.connect();
        settle().await;

        let handler = connector.handler(0);
        handler.handle_transport_error(SessionError::Transport("reset".to_string()));
        handler.handle_exception(SessionError::Protocol("bad frame".to_string()));
        handler.handle_transport_error(SessionError::Transport("eof".to_string()));

        assert_eq!(manager.reconnects_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_from_superseded_session_are_discarded() {
        let connector = ScriptedConnector::with([]);
        let counter = Arc::new(Counting(AtomicU64::new(0)));
        let manager = manager_with(connector.clone(), counter.clone());
        manager.connect();
        settle().await;

        let first = connector.handler(0);
        first.handle_frame(&frame());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        first.handle_transport_error(SessionError::Transport("reset".to_string()));
        first.handle_frame(&frame());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(manager.session_generation(), 2);

        first.handle_frame(&frame());
        connector.handler(1).handle_frame(&frame());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_reconnect() {
        let connector =
            ScriptedConnector::with([Err(SessionError::Handshake("refused".to_string()))]);
        let manager = manager_with(connector.clone(), Arc::new(Counting(AtomicU64::new(0))));
        manager.connect();
        settle().await;
        assert!(manager.is_reconnect_pending());

        manager.shutdown().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(manager.state(), ConnectionState::ShuttingDown);
        assert_eq!(connector.attempts(), 1);

        manager.connect();
        manager.schedule_reconnect();
        settle().await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_leave_manager_disconnected() {
        let refused = || Err(SessionError::Handshake("refused".to_string()));
        let connector = ScriptedConnector::with([refused(), refused(), refused()]);
        let manager = ConnectionManager::new(
            ConnectionSettings {
                server_url: "ws://feed.test/ws".to_string(),
                personal_key: "abc123".to_string(),
                reconnect: ReconnectConfig::fixed(Duration::from_secs(1)).with_max_attempts(2),
            },
            connector.clone(),
            FrameDispatcher::new(Vec::new()),
            Arc::new(TokioTaskScheduler::new()),
        );

        manager.connect();
        settle().await;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            settle().await;
        }

        assert_eq!(connector.attempts(), 3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_reconnect_pending());
    }
}
