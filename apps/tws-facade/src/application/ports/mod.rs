//! Port Interfaces
//!
//! Contracts the facade needs from the wire client. The network transport
//! and message (de)serialization live behind these traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: outbound requests plus the event dispatch registry the
//!   transport's reader thread routes inbound events through
//! - `Connector`: opens a `Transport` for resolved connection settings

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::channel::EventSender;
use crate::domain::events::Selector;
use crate::domain::instrument::ContractDescriptor;
use crate::infrastructure::config::ConnectionSettings;

/// Identifier of one registration in a transport's dispatch registry.
pub type RegistrationId = u64;

/// Transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connecting to the platform failed.
    #[error("failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        /// Host.
        host: String,
        /// Port.
        port: u16,
        /// Cause.
        reason: String,
    },

    /// The connection is no longer usable.
    #[error("not connected")]
    NotConnected,

    /// Sending a request failed.
    #[error("failed to send {request}: {reason}")]
    SendFailed {
        /// Request name.
        request: &'static str,
        /// Cause.
        reason: String,
    },

    /// The registration id is unknown to the transport.
    #[error("unknown registration {0}")]
    UnknownRegistration(RegistrationId),
}

/// Arguments of a historical data request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataRequest {
    /// Request id.
    pub request_id: i32,
    /// Requested contract.
    pub contract: ContractDescriptor,
    /// End of the range, `YYYYMMDD HH:MM:SS`.
    pub end_datetime: String,
    /// Duration string, e.g. `"5 D"`.
    pub duration: String,
    /// Bar size string, e.g. `"1 day"`.
    pub bar_size: String,
    /// Data kind, e.g. `"TRADES"`.
    pub what_to_show: String,
    /// `1` for regular trading hours only, `0` to include extended hours.
    pub use_rth: i32,
    /// Date format selector (`1` = `YYYYMMDD[  HH:MM:SS]` strings).
    pub format_date: i32,
}

/// Wire client for the trading platform.
///
/// Implementations own a background reader. For every decoded event the
/// reader pushes a copy into each registered sink whose selector set
/// contains the event's selector, in the order events arrived.
pub trait Transport: Send + Sync {
    /// Start forwarding events matching `selectors` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot accept registrations.
    fn register(&self, selectors: &[Selector], sink: EventSender) -> Result<RegistrationId, TransportError>;

    /// Stop forwarding for a registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is unknown.
    fn unregister(&self, id: RegistrationId) -> Result<(), TransportError>;

    /// Ask for the server time.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn request_current_time(&self) -> Result<(), TransportError>;

    /// Enable or disable account and portfolio updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn request_account_updates(&self, subscribe: bool, account: &str) -> Result<(), TransportError>;

    /// Request market data for a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn request_market_data(
        &self,
        request_id: i32,
        contract: &ContractDescriptor,
        generic_ticks: &str,
        snapshot: bool,
    ) -> Result<(), TransportError>;

    /// Request historical bars.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn request_historical_data(&self, request: &HistoricalDataRequest) -> Result<(), TransportError>;
}

/// Opens transports.
pub trait Connector {
    /// Connect using resolved settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>, TransportError>;
}
