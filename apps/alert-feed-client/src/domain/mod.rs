//! Domain Layer - Alert values and the connection state machine.
//!
//! Pure Rust types with serialization support and no I/O.

/// Alert value types delivered by the feed.
pub mod alert;

/// Connection lifecycle states and transitions.
pub mod connection;
