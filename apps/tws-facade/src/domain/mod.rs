//! Domain Layer - Value types and protocol events.
//!
//! Pure data types with no knowledge of transports or threads: the events a
//! transport delivers, and the values the facade hands back to callers.

/// Inbound protocol events and selectors.
pub mod events;

/// Historical bars, bar sizes and duration policies.
pub mod historical;

/// Contract descriptors and typed instruments.
pub mod instrument;

/// Account positions.
pub mod position;

/// Quote field mappings.
pub mod quote;

/// Tick field code tables.
pub mod ticks;
