//! Heartbeat Scheduler
//!
//! Logging decorator over a [`TaskScheduler`]. The STOMP transport schedules
//! its heart-beat sends and inactivity checks through it so every schedule
//! shows up in the log with its wall-clock start time and period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

use crate::application::ports::{ScheduledTask, SchedulerError, Task, TaskScheduler, Trigger};

/// [`TaskScheduler`] that logs each call and delegates it unchanged.
#[derive(Clone)]
pub struct HeartbeatScheduler {
    delegate: Arc<dyn TaskScheduler>,
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("shutdown", &self.delegate.is_shutdown())
            .finish()
    }
}

impl HeartbeatScheduler {
    /// Wrap `delegate`.
    #[must_use]
    pub fn new(delegate: Arc<dyn TaskScheduler>) -> Self {
        Self { delegate }
    }
}

/// Wall-clock equivalent of a monotonic instant.
fn wall_clock(at: Instant) -> DateTime<Utc> {
    let now = Instant::now();
    let offset = if at >= now {
        TimeDelta::from_std(at - now).unwrap_or(TimeDelta::zero())
    } else {
        -TimeDelta::from_std(now - at).unwrap_or(TimeDelta::zero())
    };
    Utc::now() + offset
}

impl TaskScheduler for HeartbeatScheduler {
    fn schedule(&self, task: Task, start_time: Instant) -> Result<ScheduledTask, SchedulerError> {
        tracing::info!(start_at = %wall_clock(start_time), "[Heartbeat] Scheduled task");
        self.delegate.schedule(task, start_time)
    }

    fn schedule_with_trigger(
        &self,
        task: Task,
        trigger: Arc<dyn Trigger>,
    ) -> Result<ScheduledTask, SchedulerError> {
        tracing::info!(trigger = ?trigger, "[Heartbeat] Scheduled task with trigger");
        self.delegate.schedule_with_trigger(task, trigger)
    }

    fn schedule_at_fixed_rate(
        &self,
        task: Task,
        start_time: Instant,
        period: Duration,
    ) -> Result<ScheduledTask, SchedulerError> {
        tracing::info!(
            start_at = %wall_clock(start_time),
            period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "[Heartbeat] Scheduled fixed-rate task"
        );
        self.delegate.schedule_at_fixed_rate(task, start_time, period)
    }

    fn schedule_with_fixed_delay(
        &self,
        task: Task,
        start_time: Instant,
        delay: Duration,
    ) -> Result<ScheduledTask, SchedulerError> {
        tracing::info!(
            start_at = %wall_clock(start_time),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "[Heartbeat] Scheduled fixed-delay task"
        );
        self.delegate.schedule_with_fixed_delay(task, start_time, delay)
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.delegate.is_shutdown()
    }
}
