//! STOMP Transport
//!
//! STOMP 1.2 over WebSocket: frame codec, heart-beat negotiation and
//! monitoring, and the [`StompClient`] session connector.

pub mod client;
pub mod codec;
pub mod frame;
pub mod heartbeat;

pub use client::{StompClient, StompClientConfig, StompSession};
pub use codec::{CodecError, StompCodec};
pub use frame::{StompCommand, StompFrame};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState, NegotiatedHeartbeat};
