//! Application Services
//!
//! - `ConnectionManager`: connection lifecycle and reconnect scheduling
//! - `FrameDispatcher`: topic subscription, decoding, and handler fan-out
//! - `ReconnectPolicy`: delay computation between attempts

pub mod connection;
pub mod dispatcher;
pub mod reconnect;

pub use connection::{ConnectionManager, ConnectionSettings};
pub use dispatcher::{DecodeError, DispatchOutcome, FrameDispatcher};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, ReconnectStrategy};
