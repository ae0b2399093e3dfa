//! Historical Bars
//!
//! Bars stream in for the request id and the series closes with a bar whose
//! date starts with the `finished` marker. That closing bar is not part of
//! the result.

use chrono::NaiveDateTime;

use super::{Correlation, Operation, RequestContext, Step, api_error, belongs_to, execute, unexpected};
use crate::application::ports::HistoricalDataRequest;
use crate::domain::events::{Event, Selector};
use crate::domain::historical::{
    BarSize, DurationPolicy, HistoricalBar, WhatToShow, format_end_datetime, is_finished_sentinel,
};
use crate::domain::instrument::ContractDescriptor;
use crate::error::Error;

/// `YYYYMMDD[  HH:MM:SS]` date strings.
const FORMAT_DATE_STRINGS: i32 = 1;

/// Parameters of a historical query, before sizing.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalQuery {
    /// Start of the range.
    pub from: NaiveDateTime,
    /// End of the range.
    pub to: NaiveDateTime,
    /// Bar size.
    pub bar_size: BarSize,
    /// Data kind.
    pub what_to_show: WhatToShow,
    /// Include bars outside regular trading hours.
    pub extended_hours: bool,
}

impl HistoricalQuery {
    /// Build the outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `from` is not before `to`.
    pub fn to_request(
        &self,
        request_id: i32,
        contract: &ContractDescriptor,
        policy: &dyn DurationPolicy,
    ) -> Result<HistoricalDataRequest, Error> {
        if self.from >= self.to {
            return Err(Error::InvalidRequest(format!(
                "historical range start {} is not before end {}",
                self.from, self.to
            )));
        }

        Ok(HistoricalDataRequest {
            request_id,
            contract: contract.clone(),
            end_datetime: format_end_datetime(self.to),
            duration: policy.duration(self.from, self.to, self.bar_size).to_string(),
            bar_size: self.bar_size.as_str().to_string(),
            what_to_show: self.what_to_show.as_str().to_string(),
            use_rth: i32::from(!self.extended_hours),
            format_date: FORMAT_DATE_STRINGS,
        })
    }
}

/// Collects bars until the `finished` marker.
#[derive(Debug)]
pub struct HistoricalSeries {
    request_id: i32,
    bars: Vec<HistoricalBar>,
}

impl HistoricalSeries {
    /// Start collecting for a request.
    #[must_use]
    pub const fn new(request_id: i32) -> Self {
        Self {
            request_id,
            bars: Vec::new(),
        }
    }
}

impl Correlation for HistoricalSeries {
    type Output = Vec<HistoricalBar>;
    const OPERATION: Operation = Operation::HistoricalData;

    fn selectors(&self) -> &'static [Selector] {
        &[Selector::HistoricalData, Selector::ApiError]
    }

    fn on_event(&mut self, event: Event) -> Result<Step, Error> {
        if matches!(event, Event::HistoricalData(_)) && !belongs_to(Self::OPERATION, self.request_id, &event) {
            return Ok(Step::Continue);
        }

        match event {
            Event::HistoricalData(bar) if is_finished_sentinel(&bar.date) => Ok(Step::Done),
            Event::HistoricalData(bar) => {
                self.bars.push(HistoricalBar::try_from(&bar)?);
                Ok(Step::Continue)
            }
            Event::ApiError(error) => api_error(Self::OPERATION, Some(self.request_id), error),
            other => Err(unexpected(Self::OPERATION, &other)),
        }
    }

    fn finish(self) -> Result<Self::Output, Error> {
        Ok(self.bars)
    }
}

/// Fetch historical bars for a contract.
///
/// # Errors
///
/// Returns an error if the range is empty, the request fails, the platform
/// rejects it, or a bar cannot be translated.
pub fn get_historical_data(
    ctx: RequestContext<'_>,
    request_id: i32,
    contract: &ContractDescriptor,
    query: &HistoricalQuery,
    policy: &dyn DurationPolicy,
) -> Result<Vec<HistoricalBar>, Error> {
    let request = query.to_request(request_id, contract, policy)?;
    tracing::debug!(
        request_id,
        symbol = %contract.local_symbol,
        end = %request.end_datetime,
        duration = %request.duration,
        bar_size = %request.bar_size,
        "Requesting historical data"
    );

    execute(ctx, HistoricalSeries::new(request_id), || {
        ctx.transport.request_historical_data(&request).map_err(Error::from)
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{ApiError, HistoricalDataBar, TickPrice};
    use crate::domain::historical::{BarDate, DurationSpec, FixedWindow, SpanDuration};

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn query(extended_hours: bool) -> HistoricalQuery {
        HistoricalQuery {
            from: at("2013-01-01 00:00:00"),
            to: at("2013-01-05 16:00:00"),
            bar_size: BarSize::Day1,
            what_to_show: WhatToShow::Trades,
            extended_hours,
        }
    }

    fn bar(req_id: i32, date: &str, close: f64) -> Event {
        Event::HistoricalData(HistoricalDataBar {
            req_id,
            date: date.to_string(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000,
            count: 10,
            wap: close,
            has_gaps: false,
        })
    }

    #[test]
    fn builds_request_from_query() {
        let contract = ContractDescriptor::stock("IBM");
        let request = query(false).to_request(4, &contract, &SpanDuration).unwrap();

        assert_eq!(request.request_id, 4);
        assert_eq!(request.end_datetime, "20130105 16:00:00");
        assert_eq!(request.duration, "5 D");
        assert_eq!(request.bar_size, "1 day");
        assert_eq!(request.what_to_show, "TRADES");
        assert_eq!(request.use_rth, 1);
        assert_eq!(request.format_date, 1);
    }

    #[test]
    fn extended_hours_clears_rth_flag() {
        let contract = ContractDescriptor::stock("IBM");
        let request = query(true).to_request(1, &contract, &SpanDuration).unwrap();
        assert_eq!(request.use_rth, 0);
    }

    #[test]
    fn fixed_window_overrides_span() {
        let contract = ContractDescriptor::stock("IBM");
        let policy = FixedWindow(DurationSpec::days(365));
        let request = query(false).to_request(1, &contract, &policy).unwrap();
        assert_eq!(request.duration, "365 D");
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut q = query(false);
        q.from = q.to;
        let err = q
            .to_request(1, &ContractDescriptor::stock("IBM"), &SpanDuration)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn sentinel_terminates_and_is_excluded() {
        let mut series = HistoricalSeries::new(3);

        assert_eq!(series.on_event(bar(3, "20130102", 10.0)).unwrap(), Step::Continue);
        assert_eq!(series.on_event(bar(3, "20130103", 11.0)).unwrap(), Step::Continue);
        assert_eq!(
            series
                .on_event(bar(3, "finished-20130101  00:00:00-20130105  16:00:00", -1.0))
                .unwrap(),
            Step::Done
        );

        let bars = series.finish().unwrap();
        assert_eq!(bars.len(), 2);
        assert!(matches!(bars[0].date, BarDate::Date(_)));
        assert_eq!(bars[1].close, 11.0);
    }

    #[test]
    fn intraday_dates_parse_as_datetime() {
        let mut series = HistoricalSeries::new(3);
        series.on_event(bar(3, "20130102  09:30:00", 10.0)).unwrap();

        let bars = series.finish().unwrap();
        assert_eq!(bars[0].date, BarDate::DateTime(at("2013-01-02 09:30:00")));
    }

    #[test]
    fn malformed_date_fails() {
        let mut series = HistoricalSeries::new(3);
        assert!(matches!(
            series.on_event(bar(3, "2013-01-02", 10.0)),
            Err(Error::Historical(_))
        ));
    }

    #[test]
    fn other_requests_are_ignored() {
        let mut series = HistoricalSeries::new(3);
        assert_eq!(series.on_event(bar(9, "finished", 0.0)).unwrap(), Step::Continue);
        assert_eq!(series.on_event(bar(9, "20130102", 1.0)).unwrap(), Step::Continue);
        assert!(series.finish().unwrap().is_empty());
    }

    #[test]
    fn tick_is_unexpected() {
        let mut series = HistoricalSeries::new(3);
        let tick = Event::TickPrice(TickPrice {
            ticker_id: 3,
            field: 1,
            price: 1.0,
        });
        assert!(matches!(
            series.on_event(tick),
            Err(Error::UnexpectedMessage { received: "tickPrice", .. })
        ));
    }

    #[test]
    fn tick_for_other_request_is_unexpected() {
        let mut series = HistoricalSeries::new(3);
        let tick = Event::TickPrice(TickPrice {
            ticker_id: 9,
            field: 1,
            price: 1.0,
        });
        assert!(matches!(
            series.on_event(tick),
            Err(Error::UnexpectedMessage {
                operation: "historical_data",
                received: "tickPrice"
            })
        ));
    }

    #[test]
    fn connection_loss_fails_series() {
        let mut series = HistoricalSeries::new(3);
        series.on_event(bar(3, "20130102", 10.0)).unwrap();
        let lost = Event::ApiError(ApiError {
            id: -1,
            code: 1100,
            message: "Connectivity between IB and TWS has been lost".to_string(),
        });

        assert!(matches!(series.on_event(lost), Err(Error::Api { code: 1100, .. })));
    }
}
