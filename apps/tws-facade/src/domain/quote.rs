//! Quote Types
//!
//! Field mappings built from market data snapshots.
//!
//! A field is present only if the platform delivered it. Enumerating fields
//! never fails; asking for a specific unknown field through
//! [`Quote::field`] does.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::domain::instrument::ContractDescriptor;

/// Well-known field names.
pub mod fields {
    /// Bid price / bid leg.
    pub const BID: &str = "bid";
    /// Ask price / ask leg.
    pub const ASK: &str = "ask";
    /// Last trade price / last leg.
    pub const LAST: &str = "last";
    /// Session high.
    pub const HIGH: &str = "high";
    /// Session low.
    pub const LOW: &str = "low";
    /// Previous close.
    pub const CLOSE: &str = "close";
    /// Model leg of an option quote.
    pub const MODEL: &str = "model";
    /// Derived midpoint leg of an option quote.
    pub const MID: &str = "mid";
    /// Key of the embedded option quote on an instrument quote.
    pub const OPTION: &str = "option";

    /// Option computation: option price.
    pub const PRICE: &str = "price";
    /// Option computation: delta.
    pub const DELTA: &str = "delta";
    /// Option computation: gamma.
    pub const GAMMA: &str = "gamma";
    /// Option computation: vega.
    pub const VEGA: &str = "vega";
    /// Option computation: theta.
    pub const THETA: &str = "theta";
    /// Option computation: underlying price.
    pub const UNDERLYING_PRICE: &str = "underlying_price";
    /// Option computation: present value of dividends.
    pub const PV_DIVIDENDS: &str = "pv_dividends";
    /// Option computation: implied volatility.
    pub const IMPLIED_VOL: &str = "implied_vol";
}

/// Quote access error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    /// The quote does not contain the requested field.
    #[error("quote does not contain element \"{0}\"")]
    MissingField(String),

    /// A midpoint was requested without both bid and ask legs.
    #[error("mid is only available if both bid and ask are available")]
    MidUnavailable,
}

// =============================================================================
// Quote
// =============================================================================

/// A mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quote {
    fields: BTreeMap<String, f64>,
}

impl Quote {
    /// Create an empty quote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.fields.insert(name.into(), value);
    }

    /// Value of a field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    /// Whether a field is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Value of a field.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::MissingField`] if the field was not delivered.
    pub fn field(&self, name: &str) -> Result<f64, QuoteError> {
        self.get(name)
            .ok_or_else(|| QuoteError::MissingField(name.to_string()))
    }

    /// Names of the delivered fields, in lexical order.
    pub fn available_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of delivered fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Quote {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

// =============================================================================
// Option Quote
// =============================================================================

/// Option computation legs (`bid`, `ask`, `last`, `model`), each a [`Quote`]
/// of greeks and prices.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptionQuote {
    legs: BTreeMap<String, Quote>,
    #[serde(skip)]
    mid: OnceLock<Quote>,
}

impl OptionQuote {
    /// Create an option quote from its legs.
    #[must_use]
    pub fn new(legs: BTreeMap<String, Quote>) -> Self {
        Self {
            legs,
            mid: OnceLock::new(),
        }
    }

    /// Replace a leg.
    ///
    /// A midpoint that was already derived is kept as is.
    pub fn set_leg(&mut self, name: impl Into<String>, leg: Quote) {
        self.legs.insert(name.into(), leg);
    }

    /// A leg by name, including a derived `mid` once computed.
    #[must_use]
    pub fn leg(&self, name: &str) -> Option<&Quote> {
        self.legs
            .get(name)
            .or_else(|| (name == fields::MID).then(|| self.mid.get()).flatten())
    }

    /// Whether a leg is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.leg(name).is_some()
    }

    /// Names of the present legs.
    #[must_use]
    pub fn available_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.legs.keys().map(String::as_str).collect();
        if !self.legs.contains_key(fields::MID) && self.mid.get().is_some() {
            names.push(fields::MID);
            names.sort_unstable();
        }
        names
    }

    /// Bid leg.
    #[must_use]
    pub fn bid(&self) -> Option<&Quote> {
        self.legs.get(fields::BID)
    }

    /// Ask leg.
    #[must_use]
    pub fn ask(&self) -> Option<&Quote> {
        self.legs.get(fields::ASK)
    }

    /// Last leg.
    #[must_use]
    pub fn last(&self) -> Option<&Quote> {
        self.legs.get(fields::LAST)
    }

    /// Model leg.
    #[must_use]
    pub fn model(&self) -> Option<&Quote> {
        self.legs.get(fields::MODEL)
    }

    /// Midpoint between the bid and ask legs.
    ///
    /// Derived on first call from every field present on both sides and
    /// cached; later calls return the cached leg.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::MidUnavailable`] if bid or ask is missing.
    pub fn mid(&self) -> Result<&Quote, QuoteError> {
        if let Some(mid) = self.legs.get(fields::MID) {
            return Ok(mid);
        }
        if let Some(mid) = self.mid.get() {
            return Ok(mid);
        }

        let (Some(bid), Some(ask)) = (self.bid(), self.ask()) else {
            return Err(QuoteError::MidUnavailable);
        };

        let derived: Quote = bid
            .iter()
            .filter_map(|(name, b)| ask.get(name).map(|a| (name, (b + a) / 2.0)))
            .collect();

        Ok(self.mid.get_or_init(|| derived))
    }
}

// =============================================================================
// Instrument Quote
// =============================================================================

/// Snapshot quote for a requested contract.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentQuote {
    contract: ContractDescriptor,
    quote: Quote,
    option: Option<OptionQuote>,
}

impl InstrumentQuote {
    /// Assemble a snapshot quote.
    #[must_use]
    pub const fn new(contract: ContractDescriptor, quote: Quote, option: Option<OptionQuote>) -> Self {
        Self {
            contract,
            quote,
            option,
        }
    }

    /// The contract the quote was requested for.
    #[must_use]
    pub const fn contract(&self) -> &ContractDescriptor {
        &self.contract
    }

    /// The price fields.
    #[must_use]
    pub const fn quote(&self) -> &Quote {
        &self.quote
    }

    /// The embedded option quote, if option computations were delivered.
    #[must_use]
    pub const fn option(&self) -> Option<&OptionQuote> {
        self.option.as_ref()
    }

    /// Value of a price field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.quote.get(name)
    }

    /// Whether a field (including `"option"`) is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        if name == fields::OPTION {
            return self.option.is_some();
        }
        self.quote.has(name)
    }

    /// Value of a price field.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::MissingField`] if the field was not delivered.
    pub fn field(&self, name: &str) -> Result<f64, QuoteError> {
        self.quote.field(name)
    }

    /// Names of the present fields, with `"option"` when an option quote is
    /// attached.
    #[must_use]
    pub fn available_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.quote.available_fields().collect();
        if self.option.is_some() {
            names.push(fields::OPTION);
            names.sort_unstable();
        }
        names
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(price: f64, delta: f64) -> Quote {
        [(fields::PRICE, price), (fields::DELTA, delta)]
            .into_iter()
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn quote_reports_only_delivered_fields() {
        let mut quote = Quote::new();
        quote.insert(fields::BID, 10.0);
        quote.insert(fields::ASK, 10.5);

        assert_eq!(quote.available_fields().collect::<Vec<_>>(), vec!["ask", "bid"]);
        assert_eq!(quote.get(fields::BID), Some(10.0));
        assert!(!quote.has(fields::LAST));
        assert_eq!(quote.get(fields::LAST), None);
    }

    #[test]
    fn quote_field_errors_on_unknown() {
        let quote = Quote::new();
        let err = quote.field("volume").unwrap_err();
        assert_eq!(err, QuoteError::MissingField("volume".to_string()));
        assert_eq!(err.to_string(), "quote does not contain element \"volume\"");
    }

    #[test]
    fn quote_insert_overwrites() {
        let mut quote = Quote::new();
        quote.insert(fields::LAST, 1.0);
        quote.insert(fields::LAST, 2.0);
        assert_eq!(quote.len(), 1);
        assert_eq!(quote.get(fields::LAST), Some(2.0));
    }

    #[test]
    fn mid_averages_bid_and_ask() {
        let option = OptionQuote::new(BTreeMap::from([
            (fields::BID.to_string(), leg(1.0, 0.5)),
            (fields::ASK.to_string(), leg(1.2, 0.7)),
        ]));

        let mid = option.mid().unwrap();
        assert_close(mid.field(fields::PRICE).unwrap(), 1.1);
        assert_close(mid.field(fields::DELTA).unwrap(), 0.6);
    }

    #[test]
    fn mid_only_covers_fields_on_both_sides() {
        let mut ask = leg(1.2, 0.7);
        ask.insert(fields::GAMMA, 0.1);
        let option = OptionQuote::new(BTreeMap::from([
            (fields::BID.to_string(), leg(1.0, 0.5)),
            (fields::ASK.to_string(), ask),
        ]));

        let mid = option.mid().unwrap();
        assert!(!mid.has(fields::GAMMA));
        assert_eq!(mid.len(), 2);
    }

    #[test]
    fn mid_is_cached() {
        let mut option = OptionQuote::new(BTreeMap::from([
            (fields::BID.to_string(), leg(1.0, 0.5)),
            (fields::ASK.to_string(), leg(1.2, 0.7)),
        ]));

        let first = option.mid().unwrap().clone();
        option.set_leg(fields::BID, leg(3.0, 0.9));
        let second = option.mid().unwrap();

        assert_eq!(&first, second);
        assert!(option.has(fields::MID));
        assert!(option.available_fields().contains(&fields::MID));
    }

    #[test]
    fn mid_requires_bid_and_ask() {
        let option = OptionQuote::new(BTreeMap::from([(fields::BID.to_string(), leg(1.0, 0.5))]));

        assert_eq!(option.mid().unwrap_err(), QuoteError::MidUnavailable);
        assert!(!option.has(fields::MID));
    }

    #[test]
    fn delivered_mid_leg_wins() {
        let option = OptionQuote::new(BTreeMap::from([(fields::MID.to_string(), leg(5.0, 0.1))]));
        assert_eq!(option.mid().unwrap().get(fields::PRICE), Some(5.0));
    }

    #[test]
    fn instrument_quote_lists_option_key() {
        let quote: Quote = [(fields::LAST, 3.5)].into_iter().collect();
        let option = OptionQuote::new(BTreeMap::from([(fields::MODEL.to_string(), leg(3.4, 0.4))]));
        let snapshot = InstrumentQuote::new(ContractDescriptor::option("X"), quote, Some(option));

        assert_eq!(snapshot.available_fields(), vec!["last", "option"]);
        assert!(snapshot.has(fields::OPTION));
        assert!(snapshot.option().unwrap().model().is_some());
        assert!(snapshot.field(fields::BID).is_err());
    }

    #[test]
    fn instrument_quote_without_option() {
        let snapshot = InstrumentQuote::new(ContractDescriptor::stock("AAPL"), Quote::new(), None);
        assert!(snapshot.available_fields().is_empty());
        assert!(!snapshot.has(fields::OPTION));
        assert_eq!(snapshot.contract().local_symbol, "AAPL");
    }
}
