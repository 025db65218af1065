//! Task Scheduling
//!
//! Tokio-backed implementation of the [`TaskScheduler`] port, plus the
//! logging [`HeartbeatScheduler`] wrapper used by the STOMP transport.
//!
//! Every scheduled task runs on its own spawned Tokio task under a child of
//! the scheduler's root [`CancellationToken`]. Shutting the scheduler down
//! cancels the root, which interrupts every task at its next suspension
//! point, and closes the [`TaskTracker`] so callers can wait for the tasks
//! to drain.

mod heartbeat;

pub use heartbeat::HeartbeatScheduler;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::application::ports::{
    ScheduledTask, SchedulerError, Task, TaskScheduler, Trigger, TriggerContext,
};

// =============================================================================
// Tokio Scheduler
// =============================================================================

/// [`TaskScheduler`] running each task on a spawned Tokio task.
///
/// Tasks are spawned on the runtime the scheduler was created in, so
/// scheduling works from threads outside that runtime.
#[derive(Debug)]
pub struct TokioTaskScheduler {
    runtime: Option<Handle>,
    root: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicU64,
}

impl Default for TokioTaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioTaskScheduler {
    /// Create a scheduler accepting work.
    ///
    /// Captures the current runtime if there is one. Without it, tasks are
    /// spawned on whatever runtime is current when they are scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Handle::try_current().ok())
    }

    /// Create a scheduler spawning its tasks on `runtime`.
    #[must_use]
    pub fn with_handle(runtime: Handle) -> Self {
        Self::build(Some(runtime))
    }

    fn build(runtime: Option<Handle>) -> Self {
        Self {
            runtime,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of tasks that have not yet finished.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every task to finish after [`TaskScheduler::shutdown`].
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn spawn<F>(&self, kind: &'static str, work: F) -> Result<ScheduledTask, SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(SchedulerError::ShutDown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let token = cancel.clone();

        let task = async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::trace!(task_id = id, kind, "Scheduled task cancelled");
                }
                () = work => {}
            }
        };
        let handle = match &self.runtime {
            Some(runtime) => self.tracker.spawn_on(task, runtime),
            None => self.tracker.spawn(task),
        };

        Ok(ScheduledTask::new(id, cancel, handle))
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn schedule(&self, mut task: Task, start_time: Instant) -> Result<ScheduledTask, SchedulerError> {
        self.spawn("once", async move {
            tokio::time::sleep_until(start_time).await;
            task();
        })
    }

    fn schedule_with_trigger(
        &self,
        mut task: Task,
        trigger: Arc<dyn Trigger>,
    ) -> Result<ScheduledTask, SchedulerError> {
        self.spawn("trigger", async move {
            let mut context = TriggerContext::default();
            while let Some(next) = trigger.next_execution(&context) {
                tokio::time::sleep_until(next).await;
                task();
                context = TriggerContext {
                    last_scheduled: Some(next),
                    last_completion: Some(Instant::now()),
                };
            }
        })
    }

    fn schedule_at_fixed_rate(
        &self,
        mut task: Task,
        start_time: Instant,
        period: Duration,
    ) -> Result<ScheduledTask, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        self.spawn("fixed_rate", async move {
            let mut interval = tokio::time::interval_at(start_time, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                task();
            }
        })
    }

    fn schedule_with_fixed_delay(
        &self,
        mut task: Task,
        start_time: Instant,
        delay: Duration,
    ) -> Result<ScheduledTask, SchedulerError> {
        if delay.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        self.spawn("fixed_delay", async move {
            tokio::time::sleep_until(start_time).await;
            loop {
                task();
                tokio::time::sleep(delay).await;
            }
        })
    }

    fn shutdown(&self) {
        if !self.root.is_cancelled() {
            tracing::debug!(active = self.tracker.len(), "Shutting down task scheduler");
        }
        self.root.cancel();
        self.tracker.close();
    }

    fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}

// =============================================================================
// Triggers
// =============================================================================

/// Trigger firing every `period`, measured from the previous scheduled time
/// or, with `fixed_delay`, from the previous completion.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTrigger {
    period: Duration,
    initial_delay: Duration,
    fixed_delay: bool,
}

impl PeriodicTrigger {
    /// Fixed-rate trigger with no initial delay.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            initial_delay: Duration::ZERO,
            fixed_delay: false,
        }
    }

    /// Delay the first execution.
    #[must_use]
    pub const fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Measure the period from the previous completion.
    #[must_use]
    pub const fn fixed_delay(mut self) -> Self {
        self.fixed_delay = true;
        self
    }

    /// Period between executions.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }
}

impl Trigger for PeriodicTrigger {
    fn next_execution(&self, context: &TriggerContext) -> Option<Instant> {
        let previous = if self.fixed_delay {
            context.last_completion
        } else {
            context.last_scheduled
        };
        Some(previous.map_or_else(
            || Instant::now() + self.initial_delay,
            |at| at + self.period,
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
