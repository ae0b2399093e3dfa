//! Crate Error
//!
//! One error type for every public facade operation, composed of the
//! module errors it can surface.

use std::time::Duration;

use crate::application::channel::PopError;
use crate::application::ports::TransportError;
use crate::domain::historical::HistoricalError;
use crate::domain::instrument::InstrumentError;
use crate::domain::quote::QuoteError;
use crate::infrastructure::config::ConfigError;

/// Facade error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An event of a type the operation does not handle arrived on its
    /// channel.
    #[error("{operation}: unexpected message {received}")]
    UnexpectedMessage {
        /// Operation being served.
        operation: &'static str,
        /// Platform name of the received event.
        received: &'static str,
    },

    /// No terminal event arrived before the deadline.
    #[error("{operation}: timed out after {elapsed:?}")]
    Timeout {
        /// Operation being served.
        operation: &'static str,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The connection's cancellation token fired.
    #[error("{operation}: cancelled")]
    Cancelled {
        /// Operation being served.
        operation: &'static str,
    },

    /// The transport closed the event stream.
    #[error("{operation}: event stream disconnected")]
    Disconnected {
        /// Operation being served.
        operation: &'static str,
    },

    /// The platform reported an error for the request.
    #[error("request {request_id} failed with code {code}: {message}")]
    Api {
        /// Request id.
        request_id: i32,
        /// Platform error code.
        code: i32,
        /// Platform error text.
        message: String,
    },

    /// The arguments do not describe a valid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server time is outside the representable range.
    #[error("server time {0} is out of range")]
    InvalidTimestamp(i64),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Contract translation failure.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    /// Quote access failure.
    #[error(transparent)]
    Quote(#[from] QuoteError),

    /// Historical bar translation failure.
    #[error(transparent)]
    Historical(#[from] HistoricalError),

    /// Settings could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Map a channel wait failure for an operation.
    #[must_use]
    pub const fn from_pop(error: PopError, operation: &'static str, elapsed: Duration) -> Self {
        match error {
            PopError::Timeout => Self::Timeout { operation, elapsed },
            PopError::Cancelled => Self::Cancelled { operation },
            PopError::Disconnected => Self::Disconnected { operation },
        }
    }

    /// Short failure category, used as a metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnexpectedMessage { .. } => "unexpected_message",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Disconnected { .. } => "disconnected",
            Self::Api { .. } => "api",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::Transport(_) => "transport",
            Self::Instrument(_) => "instrument",
            Self::Quote(_) => "quote",
            Self::Historical(_) => "historical",
            Self::Config(_) => "config",
        }
    }
}
