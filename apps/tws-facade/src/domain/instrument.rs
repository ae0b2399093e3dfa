//! Instrument Types
//!
//! Raw contract descriptors exchanged with the platform and the typed
//! instruments they translate into.
//!
//! A [`ContractDescriptor`] plays two roles:
//! - As a request argument ("ticket"), built with [`ContractDescriptor::stock`]
//!   or [`ContractDescriptor::option`].
//! - As a field of inbound events (portfolio updates), translated into an
//!   [`Instrument`] with [`Instrument::try_from`].

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default currency for ticket builders.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Default routing exchange for ticket builders.
pub const DEFAULT_EXCHANGE: &str = "SMART";

// =============================================================================
// Errors
// =============================================================================

/// Instrument translation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    /// The descriptor's security type is neither stock nor option.
    #[error("do not know how to handle instrument of type {sec_type}: {symbol}")]
    UnsupportedSecurityType {
        /// Raw security type tag.
        sec_type: String,
        /// Local symbol of the contract.
        symbol: String,
    },

    /// A descriptor field could not be interpreted.
    #[error("invalid {field} '{value}' for contract {symbol}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
        /// Local symbol of the contract.
        symbol: String,
    },
}

// =============================================================================
// Security Type
// =============================================================================

/// Security type tag of a contract descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecurityType {
    /// Stock or ETF (`STK`).
    #[default]
    Stock,
    /// Option (`OPT`).
    Option,
    /// Any other tag, kept verbatim.
    Other(String),
}

impl SecurityType {
    /// Wire tag for this security type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stock => "STK",
            Self::Option => "OPT",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for SecurityType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "STK" => Self::Stock,
            "OPT" => Self::Option,
            _ => Self::Other(tag),
        }
    }
}

impl From<SecurityType> for String {
    fn from(sec_type: SecurityType) -> Self {
        sec_type.as_str().to_string()
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Contract Descriptor
// =============================================================================

/// Raw contract structure as carried by the protocol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractDescriptor {
    /// Contract id assigned by the platform (0 when unknown).
    pub con_id: i64,
    /// Security type tag.
    pub sec_type: SecurityType,
    /// Symbol (the underlying for options).
    pub symbol: String,
    /// Local symbol (the ticker).
    pub local_symbol: String,
    /// Currency.
    pub currency: String,
    /// Routing exchange.
    pub exchange: String,
    /// Primary listing exchange.
    pub primary_exchange: String,
    /// Contract multiplier, as sent on the wire.
    pub multiplier: String,
    /// Option right (`C` or `P`).
    pub right: String,
    /// Option strike.
    pub strike: f64,
    /// Option expiry, `YYYYMMDD`.
    pub expiry: String,
}

impl ContractDescriptor {
    /// Stock ticket with the default currency and exchange.
    #[must_use]
    pub fn stock(ticker: impl Into<String>) -> Self {
        Self::ticket(SecurityType::Stock, ticker.into())
    }

    /// Option ticket with the default currency and exchange.
    ///
    /// The ticker is the option's local symbol (e.g. `"AAPL  140118C00500000"`).
    #[must_use]
    pub fn option(ticker: impl Into<String>) -> Self {
        Self::ticket(SecurityType::Option, ticker.into())
    }

    /// Override the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Override the routing exchange.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    fn ticket(sec_type: SecurityType, ticker: String) -> Self {
        Self {
            sec_type,
            local_symbol: ticker,
            currency: DEFAULT_CURRENCY.to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Instruments
// =============================================================================

/// Identity shared by every instrument kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIdentity {
    ticker: String,
    contract_id: i64,
    currency: String,
    exchange: String,
}

impl InstrumentIdentity {
    fn from_descriptor(contract: &ContractDescriptor) -> Self {
        let exchange = if contract.primary_exchange.is_empty() {
            contract.exchange.clone()
        } else {
            contract.primary_exchange.clone()
        };

        Self {
            ticker: contract.local_symbol.clone(),
            contract_id: contract.con_id,
            currency: contract.currency.clone(),
            exchange,
        }
    }

    /// The instrument ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// The platform contract id.
    #[must_use]
    pub const fn contract_id(&self) -> i64 {
        self.contract_id
    }

    /// The instrument's currency.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// The instrument's primary exchange.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

/// A stock (`STK`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    identity: InstrumentIdentity,
}

impl Stock {
    /// Shared identity fields.
    #[must_use]
    pub const fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }
}

/// Option type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Call option.
    Call,
    /// Put option.
    Put,
}

impl OptionType {
    /// Lowercase name (`"call"` / `"put"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }

    fn from_right(right: &str) -> Option<Self> {
        match right {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stock option (`OPT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOption {
    identity: InstrumentIdentity,
    underlying: String,
    contract_size: Option<u32>,
    option_type: OptionType,
    strike_price: Decimal,
    expiration_date: NaiveDate,
}

impl StockOption {
    fn from_descriptor(contract: &ContractDescriptor) -> Result<Self, InstrumentError> {
        let invalid = |field: &'static str, value: &str| InstrumentError::InvalidField {
            field,
            value: value.to_string(),
            symbol: contract.local_symbol.clone(),
        };

        let contract_size = if contract.multiplier.trim().is_empty() {
            None
        } else {
            let size = contract
                .multiplier
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid("multiplier", &contract.multiplier))?;
            Some(size)
        };

        let option_type =
            OptionType::from_right(&contract.right).ok_or_else(|| invalid("right", &contract.right))?;

        let strike_price =
            Decimal::try_from(contract.strike).map_err(|_| invalid("strike", &contract.strike.to_string()))?;

        let expiration_date = contract
            .expiry
            .get(..8)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
            .ok_or_else(|| invalid("expiry", &contract.expiry))?;

        Ok(Self {
            identity: InstrumentIdentity::from_descriptor(contract),
            underlying: contract.symbol.clone(),
            contract_size,
            option_type,
            strike_price,
            expiration_date,
        })
    }

    /// Shared identity fields.
    #[must_use]
    pub const fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }

    /// The underlying equity ticker.
    #[must_use]
    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    /// Contract size (multiplier), when the platform sent one.
    #[must_use]
    pub const fn contract_size(&self) -> Option<u32> {
        self.contract_size
    }

    /// Call or put.
    #[must_use]
    pub const fn option_type(&self) -> OptionType {
        self.option_type
    }

    /// Strike price.
    #[must_use]
    pub const fn strike_price(&self) -> Decimal {
        self.strike_price
    }

    /// Expiration date.
    #[must_use]
    pub const fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }
}

/// A typed instrument translated from a [`ContractDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instrument {
    /// Stock.
    Stock(Stock),
    /// Stock option.
    StockOption(StockOption),
}

impl Instrument {
    /// Shared identity fields.
    #[must_use]
    pub const fn identity(&self) -> &InstrumentIdentity {
        match self {
            Self::Stock(stock) => &stock.identity,
            Self::StockOption(option) => &option.identity,
        }
    }

    /// The instrument ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        self.identity().ticker()
    }

    /// The option details, if this is an option.
    #[must_use]
    pub const fn as_option(&self) -> Option<&StockOption> {
        match self {
            Self::StockOption(option) => Some(option),
            Self::Stock(_) => None,
        }
    }
}

impl TryFrom<&ContractDescriptor> for Instrument {
    type Error = InstrumentError;

    fn try_from(contract: &ContractDescriptor) -> Result<Self, Self::Error> {
        match &contract.sec_type {
            SecurityType::Stock => Ok(Self::Stock(Stock {
                identity: InstrumentIdentity::from_descriptor(contract),
            })),
            SecurityType::Option => StockOption::from_descriptor(contract).map(Self::StockOption),
            SecurityType::Other(tag) => Err(InstrumentError::UnsupportedSecurityType {
                sec_type: tag.clone(),
                symbol: contract.local_symbol.clone(),
            }),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stock(_) => write!(f, "Stock({})", self.ticker()),
            Self::StockOption(_) => write!(f, "StockOption({})", self.ticker()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
