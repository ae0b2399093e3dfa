//! Market Data Snapshot
//!
//! A one-shot snapshot arrives as price ticks and option computation ticks
//! for the request id, closed by `tickSnapshotEnd`. Unknown tick codes are
//! dropped; a later tick for the same field replaces the earlier one.

use std::collections::BTreeMap;

use super::{Correlation, Operation, RequestContext, Step, api_error, belongs_to, execute, unexpected};
use crate::domain::events::{Event, Selector, TickOptionComputation};
use crate::domain::instrument::ContractDescriptor;
use crate::domain::quote::{InstrumentQuote, OptionQuote, Quote, fields};
use crate::domain::ticks::{option_field_name, price_field_name};
use crate::error::Error;

/// Generic tick list sent with snapshot requests.
const GENERIC_TICKS: &str = "";

/// Aggregates the ticks of one snapshot request.
#[derive(Debug)]
pub struct MarketDataSnapshot {
    request_id: i32,
    contract: ContractDescriptor,
    quote: Quote,
    option_legs: BTreeMap<String, Quote>,
}

impl MarketDataSnapshot {
    /// Start aggregating for a request.
    #[must_use]
    pub fn new(request_id: i32, contract: ContractDescriptor) -> Self {
        Self {
            request_id,
            contract,
            quote: Quote::new(),
            option_legs: BTreeMap::new(),
        }
    }
}

/// Option computation tick as a leg quote.
fn option_leg(tick: &TickOptionComputation) -> Quote {
    [
        (fields::PRICE, tick.opt_price),
        (fields::DELTA, tick.delta),
        (fields::GAMMA, tick.gamma),
        (fields::VEGA, tick.vega),
        (fields::THETA, tick.theta),
        (fields::UNDERLYING_PRICE, tick.und_price),
        (fields::PV_DIVIDENDS, tick.pv_dividend),
        (fields::IMPLIED_VOL, tick.implied_vol),
    ]
    .into_iter()
    .collect()
}

impl Correlation for MarketDataSnapshot {
    type Output = InstrumentQuote;
    const OPERATION: Operation = Operation::MarketData;

    fn selectors(&self) -> &'static [Selector] {
        &[
            Selector::TickPrice,
            Selector::TickSnapshotEnd,
            Selector::TickOptionComputation,
            Selector::ApiError,
        ]
    }

    fn on_event(&mut self, event: Event) -> Result<Step, Error> {
        let ticks = matches!(
            event,
            Event::TickPrice(_) | Event::TickSnapshotEnd(_) | Event::TickOptionComputation(_)
        );
        if ticks && !belongs_to(Self::OPERATION, self.request_id, &event) {
            return Ok(Step::Continue);
        }

        match event {
            Event::TickSnapshotEnd(_) => Ok(Step::Done),
            Event::TickPrice(tick) => {
                if let Some(name) = price_field_name(tick.field) {
                    self.quote.insert(name, tick.price);
                }
                Ok(Step::Continue)
            }
            Event::TickOptionComputation(tick) => {
                if let Some(name) = option_field_name(tick.field) {
                    self.option_legs.insert(name.to_string(), option_leg(&tick));
                }
                Ok(Step::Continue)
            }
            Event::ApiError(error) => api_error(Self::OPERATION, Some(self.request_id), error),
            other => Err(unexpected(Self::OPERATION, &other)),
        }
    }

    fn finish(self) -> Result<Self::Output, Error> {
        let option = (!self.option_legs.is_empty()).then(|| OptionQuote::new(self.option_legs));
        Ok(InstrumentQuote::new(self.contract, self.quote, option))
    }
}

/// Request a snapshot quote for a contract.
///
/// # Errors
///
/// Returns an error if the request fails, the platform rejects it, or an
/// unexpected event arrives.
pub fn get_market_data(
    ctx: RequestContext<'_>,
    request_id: i32,
    contract: &ContractDescriptor,
) -> Result<InstrumentQuote, Error> {
    tracing::debug!(request_id, symbol = %contract.local_symbol, "Requesting market data snapshot");

    execute(ctx, MarketDataSnapshot::new(request_id, contract.clone()), || {
        ctx.transport
            .request_market_data(request_id, contract, GENERIC_TICKS, true)
            .map_err(Error::from)
    })
}

// =============================================================================
// Tests
// =============================================================================
