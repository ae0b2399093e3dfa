//! Protocol Events
//!
//! Decoded inbound messages as delivered by a transport's reader thread,
//! and the selectors used to subscribe to them.
//!
//! Field names follow the platform's message layouts so transports can map
//! decoded messages one to one.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::instrument::ContractDescriptor;

/// Category of inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Server time response.
    CurrentTime,
    /// Price tick.
    TickPrice,
    /// End of a market data snapshot.
    TickSnapshotEnd,
    /// Option computation tick.
    TickOptionComputation,
    /// Account portfolio line.
    PortfolioUpdate,
    /// End of an account download.
    AccountDownloadEnd,
    /// Historical data bar.
    HistoricalData,
    /// Error or notice for a request.
    ApiError,
}

impl Selector {
    /// Every selector.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CurrentTime,
            Self::TickPrice,
            Self::TickSnapshotEnd,
            Self::TickOptionComputation,
            Self::PortfolioUpdate,
            Self::AccountDownloadEnd,
            Self::HistoricalData,
            Self::ApiError,
        ]
    }

    /// Platform message name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentTime => "currentTime",
            Self::TickPrice => "tickPrice",
            Self::TickSnapshotEnd => "tickSnapshotEnd",
            Self::TickOptionComputation => "tickOptionComputation",
            Self::PortfolioUpdate => "updatePortfolio",
            Self::AccountDownloadEnd => "accountDownloadEnd",
            Self::HistoricalData => "historicalData",
            Self::ApiError => "error",
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Server time, in epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTime {
    /// Epoch seconds.
    pub time: i64,
}

/// Price tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickPrice {
    /// Request id.
    pub ticker_id: i32,
    /// Tick field code.
    pub field: i32,
    /// Price.
    pub price: f64,
}

/// End of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshotEnd {
    /// Request id.
    pub ticker_id: i32,
}

/// Option computation tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOptionComputation {
    /// Request id.
    pub ticker_id: i32,
    /// Tick field code.
    pub field: i32,
    /// Implied volatility.
    pub implied_vol: f64,
    /// Delta.
    pub delta: f64,
    /// Option price.
    pub opt_price: f64,
    /// Present value of dividends.
    pub pv_dividend: f64,
    /// Gamma.
    pub gamma: f64,
    /// Vega.
    pub vega: f64,
    /// Theta.
    pub theta: f64,
    /// Underlying price.
    pub und_price: f64,
}

/// Account portfolio line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioUpdate {
    /// Held contract.
    pub contract: ContractDescriptor,
    /// Position size.
    pub position: Decimal,
    /// Current market price.
    pub market_price: f64,
    /// Current market value.
    pub market_value: f64,
    /// Average cost.
    pub average_cost: f64,
    /// Unrealized P&L.
    pub unrealized_pnl: f64,
    /// Realized P&L.
    pub realized_pnl: f64,
    /// Account name.
    pub account_name: String,
}

/// End of an account download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDownloadEnd {
    /// Account name.
    pub account_name: String,
}

/// Historical data bar, or the closing `finished…` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataBar {
    /// Request id.
    pub req_id: i32,
    /// Raw bar date.
    pub date: String,
    /// Open price.
    #[serde(default)]
    pub open: f64,
    /// High price.
    #[serde(default)]
    pub high: f64,
    /// Low price.
    #[serde(default)]
    pub low: f64,
    /// Close price.
    #[serde(default)]
    pub close: f64,
    /// Volume.
    #[serde(default)]
    pub volume: i64,
    /// Trade count.
    #[serde(default)]
    pub count: i32,
    /// Weighted average price.
    #[serde(default)]
    pub wap: f64,
    /// Whether the bar has gaps.
    #[serde(default)]
    pub has_gaps: bool,
}

/// Error or notice raised by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Request id the error refers to (`-1` for connection-level notices).
    pub id: i32,
    /// Error code.
    pub code: i32,
    /// Error text.
    pub message: String,
}

/// Id the platform puts on connection-level messages.
pub const NO_REQUEST_ID: i32 = -1;

/// Band of codes the platform uses for system notices (data farm status).
pub const NOTICE_CODES: std::ops::RangeInclusive<i32> = 2100..=2199;

/// Warning codes outside the notice band. The request they name carries on.
///
/// - 1102: connectivity restored, data maintained
/// - 10090: part of the requested market data is not subscribed
/// - 10167: displaying delayed market data
pub const WARNING_CODES: [i32; 3] = [1102, 10090, 10167];

impl ApiError {
    /// Whether the code is a notice or warning rather than a failure.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        NOTICE_CODES.contains(&self.code) || WARNING_CODES.contains(&self.code)
    }

    /// Whether the message concerns the connection rather than one request.
    #[must_use]
    pub const fn is_connection_level(&self) -> bool {
        self.id == NO_REQUEST_ID
    }
}

// =============================================================================
// Event
// =============================================================================

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Server time.
    CurrentTime(CurrentTime),
    /// Price tick.
    TickPrice(TickPrice),
    /// End of snapshot.
    TickSnapshotEnd(TickSnapshotEnd),
    /// Option computation tick.
    TickOptionComputation(TickOptionComputation),
    /// Portfolio line.
    PortfolioUpdate(PortfolioUpdate),
    /// End of account download.
    AccountDownloadEnd(AccountDownloadEnd),
    /// Historical bar.
    HistoricalData(HistoricalDataBar),
    /// Error or notice.
    ApiError(ApiError),
}

impl Event {
    /// Selector this event is routed by.
    #[must_use]
    pub const fn selector(&self) -> Selector {
        match self {
            Self::CurrentTime(_) => Selector::CurrentTime,
            Self::TickPrice(_) => Selector::TickPrice,
            Self::TickSnapshotEnd(_) => Selector::TickSnapshotEnd,
            Self::TickOptionComputation(_) => Selector::TickOptionComputation,
            Self::PortfolioUpdate(_) => Selector::PortfolioUpdate,
            Self::AccountDownloadEnd(_) => Selector::AccountDownloadEnd,
            Self::HistoricalData(_) => Selector::HistoricalData,
            Self::ApiError(_) => Selector::ApiError,
        }
    }

    /// Platform message name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.selector().as_str()
    }

    /// Request id carried by the event, for request-scoped messages.
    #[must_use]
    pub const fn request_id(&self) -> Option<i32> {
        match self {
            Self::TickPrice(e) => Some(e.ticker_id),
            Self::TickSnapshotEnd(e) => Some(e.ticker_id),
            Self::TickOptionComputation(e) => Some(e.ticker_id),
            Self::HistoricalData(e) => Some(e.req_id),
            Self::ApiError(e) => Some(e.id),
            Self::CurrentTime(_) | Self::PortfolioUpdate(_) | Self::AccountDownloadEnd(_) => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
