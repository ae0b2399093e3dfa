//! Infrastructure Layer - Adapters and ambient concerns.
//!
//! Configuration, logging and metrics, plus the in-process loopback
//! implementation of the transport ports.

/// Connection settings and `.env` loading.
pub mod config;

/// In-process transport for tests and offline use.
pub mod loopback;

/// Metrics instrumentation.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
