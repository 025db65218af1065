//! STOMP Heart-beating
//!
//! Negotiates heart-beat intervals from the `CONNECT` / `CONNECTED`
//! exchange and monitors the session:
//!
//! - **Outbound**: an EOL is requested every negotiated send interval.
//! - **Inbound**: the session is declared dead when nothing has been read
//!   for three negotiated receive intervals.
//!
//! Both loops run on a [`TaskScheduler`] and report to the session task
//! through an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::application::ports::{ScheduledTask, SchedulerError, Task, TaskScheduler};

/// Missed receive intervals tolerated before the session is declared dead.
pub const INACTIVITY_FACTOR: u32 = 3;

/// Client heart-beat settings, advertised as `cx,cy` in `CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Smallest interval at which the client can send heart-beats (0 = never).
    pub send_interval: Duration,
    /// Desired interval between server heart-beats (0 = none wanted).
    pub receive_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(30),
            receive_interval: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(send_interval: Duration, receive_interval: Duration) -> Self {
        Self {
            send_interval,
            receive_interval,
        }
    }

    /// Heart-beat header value in milliseconds.
    #[must_use]
    pub fn header_value(&self) -> (u64, u64) {
        (millis(self.send_interval), millis(self.receive_interval))
    }

    /// Combine with the server's `sx,sy` header.
    ///
    /// A missing or unparsable header disables heart-beating in both
    /// directions.
    #[must_use]
    pub fn negotiate(&self, server: Option<&str>) -> NegotiatedHeartbeat {
        let (sx, sy) = server.and_then(parse_header).unwrap_or((0, 0));
        let (cx, cy) = self.header_value();

        NegotiatedHeartbeat {
            send: combine(cx, sy),
            receive: combine(cy, sx),
        }
    }
}

/// Heart-beat intervals in effect for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiatedHeartbeat {
    /// How often the client sends.
    pub send: Option<Duration>,
    /// How often the server promised to send.
    pub receive: Option<Duration>,
}

impl NegotiatedHeartbeat {
    /// Silence after which the session is considered dead.
    #[must_use]
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.receive.map(|interval| interval * INACTIVITY_FACTOR)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_header(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn combine(ours: u64, theirs: u64) -> Option<Duration> {
    (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
}

/// Events emitted by the heart-beat tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send an EOL to the server.
    SendHeartbeat,
    /// Nothing received within the inactivity timeout.
    Timeout,
}

/// Read activity shared between the session loop and the monitor.
#[derive(Debug)]
pub struct HeartbeatState {
    last_read: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heart-beat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_read: RwLock::new(Instant::now()),
        }
    }

    /// Record that something (a frame or a heart-beat) was read.
    pub fn record_read(&self) {
        *self.last_read.write() = Instant::now();
    }

    /// Time since the last read.
    #[must_use]
    pub fn since_read(&self) -> Duration {
        self.last_read.read().elapsed()
    }
}

/// Heart-beat tasks for one session. Dropping the value cancels them.
#[derive(Debug, Default)]
pub struct HeartbeatTasks {
    tasks: Vec<ScheduledTask>,
}

impl HeartbeatTasks {
    /// Schedule the send and inactivity tasks for `negotiated`.
    ///
    /// Directions that were negotiated off get no task.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error if a task could not be scheduled.
    pub fn start(
        scheduler: &dyn TaskScheduler,
        negotiated: NegotiatedHeartbeat,
        state: Arc<HeartbeatState>,
        events: mpsc::Sender<HeartbeatEvent>,
    ) -> Result<Self, SchedulerError> {
        let mut tasks = Vec::with_capacity(2);
        let now = Instant::now();

        if let Some(interval) = negotiated.send {
            let events = events.clone();
            let task: Task = Box::new(move || {
                // A full channel already holds a pending send.
                let _ = events.try_send(HeartbeatEvent::SendHeartbeat);
            });
            tasks.push(scheduler.schedule_at_fixed_rate(task, now + interval, interval)?);
        }

        if let (Some(interval), Some(timeout)) =
            (negotiated.receive, negotiated.inactivity_timeout())
        {
            let task: Task = Box::new(move || {
                let silent_for = state.since_read();
                if silent_for > timeout {
                    tracing::warn!(
                        silent_ms = millis(silent_for),
                        timeout_ms = millis(timeout),
                        "Heart-beat timeout detected"
                    );
                    let _ = events.try_send(HeartbeatEvent::Timeout);
                }
            });
            tasks.push(scheduler.schedule_with_fixed_delay(task, now + interval, interval)?);
        }

        Ok(Self { tasks })
    }

    /// Whether no heart-beat task is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for HeartbeatTasks {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::scheduler::TokioTaskScheduler;
    use test_case::test_case;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn default_config_advertises_thirty_seconds() {
        assert_eq!(HeartbeatConfig::default().header_value(), (30_000, 30_000));
    }

    #[test_case(Some("10000,10000"), Some(30_000), Some(30_000) ; "client interval is larger")]
    #[test_case(Some("60000,45000"), Some(45_000), Some(60_000) ; "server interval is larger")]
    #[test_case(Some("0,10000"), Some(30_000), None ; "server never sends")]
    #[test_case(Some("10000,0"), None, Some(30_000) ; "server wants nothing")]
    #[test_case(Some("garbage"), None, None ; "unparsable header")]
    #[test_case(None, None, None ; "missing header")]
    fn negotiation(server: Option<&str>, send_ms: Option<u64>, receive_ms: Option<u64>) {
        let negotiated = HeartbeatConfig::default().negotiate(server);
        assert_eq!(negotiated.send, send_ms.map(Duration::from_millis));
        assert_eq!(negotiated.receive, receive_ms.map(Duration::from_millis));
    }

    #[test]
    fn client_zero_disables_direction() {
        let config = HeartbeatConfig::new(Duration::ZERO, Duration::from_secs(10));
        let negotiated = config.negotiate(Some("5000,5000"));
        assert_eq!(negotiated.send, None);
        assert_eq!(negotiated.receive, Some(Duration::from_secs(10)));
        assert_eq!(
            negotiated.inactivity_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn requests_send_every_interval() {
        let scheduler = TokioTaskScheduler::new();
        let (tx, mut rx) = mpsc::channel(8);
        let negotiated = NegotiatedHeartbeat {
            send: Some(SECOND),
            receive: None,
        };

        let _tasks =
            HeartbeatTasks::start(&scheduler, negotiated, Arc::new(HeartbeatState::new()), tx)
                .unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let mut sends = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event, HeartbeatEvent::SendHeartbeat);
            sends += 1;
        }
        assert_eq!(sends, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_triggers_timeout() {
        let scheduler = TokioTaskScheduler::new();
        let (tx, mut rx) = mpsc::channel(8);
        let negotiated = NegotiatedHeartbeat {
            send: None,
            receive: Some(SECOND),
        };

        let _tasks =
            HeartbeatTasks::start(&scheduler, negotiated, Arc::new(HeartbeatState::new()), tx)
                .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(rx.try_recv().is_err());

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(HeartbeatEvent::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn reads_keep_session_alive() {
        let scheduler = TokioTaskScheduler::new();
        let (tx, mut rx) = mpsc::channel(8);
        let state = Arc::new(HeartbeatState::new());
        let negotiated = NegotiatedHeartbeat {
            send: None,
            receive: Some(SECOND),
        };

        let _tasks = HeartbeatTasks::start(&scheduler, negotiated, state.clone(), tx).unwrap();

        for _ in 0..10 {
            tokio::time::sleep(SECOND).await;
            state.record_read();
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_tasks_stops_events() {
        let scheduler = TokioTaskScheduler::new();
        let (tx, mut rx) = mpsc::channel(8);
        let negotiated = NegotiatedHeartbeat {
            send: Some(SECOND),
            receive: Some(SECOND),
        };

        let tasks =
            HeartbeatTasks::start(&scheduler, negotiated, Arc::new(HeartbeatState::new()), tx)
                .unwrap();
        assert!(!tasks.is_empty());
        drop(tasks);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn disabled_heartbeats_schedule_nothing() {
        let scheduler = TokioTaskScheduler::new();
        let (tx, _rx) = mpsc::channel(8);

        let tasks = HeartbeatTasks::start(
            &scheduler,
            NegotiatedHeartbeat::default(),
            Arc::new(HeartbeatState::new()),
            tx,
        )
        .unwrap();

        assert!(tasks.is_empty());
        assert_eq!(scheduler.active_tasks(), 0);
    }
}
