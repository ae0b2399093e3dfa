//! Application Layer - Request/response engine and port definitions.
//!
//! This layer turns the transport's pushed event stream into blocking,
//! typed calls.

/// Event channel between the transport reader and a blocked caller.
pub mod channel;

/// Public connection surface.
pub mod connection;

/// Port interfaces for the wire client.
pub mod ports;

/// Request/response engine and the typed operations.
pub mod services;

/// Dispatch registrations and their teardown guards.
pub mod subscription;
