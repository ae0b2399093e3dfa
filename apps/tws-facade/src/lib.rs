#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! TWS Facade - Synchronous Request/Response Client
//!
//! The trading platform's API never returns values: current time, account
//! positions, quotes and historical bars all arrive as an interleaved stream
//! of typed events pushed from a background reader. This crate issues one
//! logical request and blocks until its result has been assembled from that
//! stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Value types and protocol events
//!   - `events`: Decoded inbound events and their selectors
//!   - `instrument`, `position`, `quote`, `historical`: Results
//!
//! - **Application**: Request/response engine and port definitions
//!   - `ports`: `Transport` and `Connector` interfaces
//!   - `channel`: Event channel from reader thread to caller
//!   - `subscription`: Dispatch registrations with teardown guards
//!   - `services`: Correlation engine and typed operations
//!   - `connection`: Public blocking surface
//!
//! - **Infrastructure**: Ambient concerns and adapters
//!   - `config`: Connection settings from arguments, env and `.env`
//!   - `telemetry`: Tracing subscriber
//!   - `metrics`: `metrics` facade instrumentation
//!   - `loopback`: In-process transport
//!
//! # Request Flow
//!
//! ```text
//!  caller ── get_market_data ─► subscribe ─► request_market_data ─► Transport
//!                                   │                                   │
//!                               EventChannel ◄──── reader thread ◄──────┘
//!                                   │
//!  caller ◄── InstrumentQuote ◄─ drain until tickSnapshotEnd ─► unsubscribe
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Value types with no knowledge of transports or threads.
pub mod domain;

/// Application layer - Request/response engine and port definitions.
pub mod application;

/// Infrastructure layer - Configuration, telemetry, metrics and adapters.
pub mod infrastructure;

/// Crate error.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Public surface
pub use application::connection::{Connection, connect};
pub use error::Error;

// Ports
pub use application::ports::{Connector, HistoricalDataRequest, RegistrationId, Transport, TransportError};

// Domain types
pub use domain::events::{Event, Selector};
pub use domain::historical::{
    BarDate, BarSize, DurationPolicy, DurationSpec, FixedWindow, HistoricalBar, HistoricalError, SpanDuration,
    WhatToShow,
};
pub use domain::instrument::{ContractDescriptor, Instrument, InstrumentError, OptionType, SecurityType};
pub use domain::position::Position;
pub use domain::quote::{InstrumentQuote, OptionQuote, Quote, QuoteError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ConnectionSettings, load_dotenv};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryError, init as init_telemetry};
