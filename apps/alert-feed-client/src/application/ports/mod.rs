//! Application Ports (Driven)
//!
//! Interfaces the application services depend on:
//!
//! - `AlertHandler`: presentation backends for decoded alerts
//! - `SessionConnector` / `Session` / `SessionHandler`: the frame transport
//! - `TaskScheduler` / `Trigger`: delayed and periodic work

mod alert_handler_port;
mod scheduler_port;
mod session_port;

#[cfg(test)]
pub use alert_handler_port::MockAlertHandler;
pub use alert_handler_port::{AlertHandler, HandlerError};
pub use scheduler_port::{
    ScheduledTask, SchedulerError, Task, TaskScheduler, Trigger, TriggerContext,
};
#[cfg(test)]
pub use session_port::MockSession;
pub use session_port::{InboundFrame, Session, SessionConnector, SessionError, SessionHandler};
