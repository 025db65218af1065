//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loaded from the environment.
pub mod config;

/// Alert presentation backends (log line, desktop dialog).
pub mod handlers;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tokio-backed task scheduling.
pub mod scheduler;

/// STOMP 1.2 over WebSocket transport.
pub mod stomp;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
