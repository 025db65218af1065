//! Application Layer - Services and port definitions.
//!
//! Orchestrates the domain types against the ports implemented by the
//! infrastructure layer.

/// Port interfaces for handlers, the frame transport, and scheduling.
pub mod ports;

/// Connection lifecycle, frame dispatch, and reconnect policy.
pub mod services;
