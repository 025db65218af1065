//! Task Scheduler Port (Driven Port)
//!
//! Interface for delayed and periodic work. The connection manager uses it
//! for reconnects; the transport uses it for heart-beats.
//!
//! Times are [`tokio::time::Instant`] so a paused test clock drives them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Work item run by the scheduler. Periodic schedules call it repeatedly.
pub type Task = Box<dyn FnMut() + Send + 'static>;

/// Execution history handed to a [`Trigger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerContext {
    /// When the previous run was scheduled for.
    pub last_scheduled: Option<Instant>,
    /// When the previous run finished.
    pub last_completion: Option<Instant>,
}

/// Computes the next execution time of a trigger-based schedule.
pub trait Trigger: Send + Sync + fmt::Debug {
    /// Next execution time, or `None` to stop.
    fn next_execution(&self, context: &TriggerContext) -> Option<Instant>;
}

/// Scheduling errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler no longer accepts work.
    #[error("scheduler has been shut down")]
    ShutDown,

    /// A periodic schedule was requested with a zero period.
    #[error("period must be greater than zero")]
    ZeroPeriod,
}

/// Handle to a scheduled task.
#[derive(Debug)]
pub struct ScheduledTask {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Wrap a spawned task and the token that cancels it.
    #[must_use]
    pub const fn new(id: u64, cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { id, cancel, handle }
    }

    /// Scheduler-assigned id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the task, interrupting it at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }

    /// Whether the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task has completed or was cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.handle.is_finished()
    }
}

/// Port for scheduling tasks.
pub trait TaskScheduler: Send + Sync {
    /// Run `task` once at `start_time`.
    fn schedule(&self, task: Task, start_time: Instant) -> Result<ScheduledTask, SchedulerError>;

    /// Run `task` at the times produced by `trigger`.
    fn schedule_with_trigger(
        &self,
        task: Task,
        trigger: Arc<dyn Trigger>,
    ) -> Result<ScheduledTask, SchedulerError>;

    /// Run `task` every `period`, measured between start times.
    fn schedule_at_fixed_rate(
        &self,
        task: Task,
        start_time: Instant,
        period: Duration,
    ) -> Result<ScheduledTask, SchedulerError>;

    /// Run `task` repeatedly with `delay` between the end of one run and the
    /// start of the next.
    fn schedule_with_fixed_delay(
        &self,
        task: Task,
        start_time: Instant,
        delay: Duration,
    ) -> Result<ScheduledTask, SchedulerError>;

    /// Cancel all outstanding work and reject new tasks.
    fn shutdown(&self);

    /// Whether [`TaskScheduler::shutdown`] has been called.
    fn is_shutdown(&self) -> bool;
}
