//! Historical Data Types
//!
//! Bars, bar sizes, data kinds and the duration policy used to size a
//! historical data request.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::events::HistoricalDataBar;

/// Date prefix of the bar that closes a historical series.
pub const FINISHED_MARKER: &str = "finished";

/// Whether a bar date marks the end of a historical series.
#[must_use]
pub fn is_finished_sentinel(date: &str) -> bool {
    date.starts_with(FINISHED_MARKER)
}

/// Historical data error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoricalError {
    /// A bar date could not be parsed.
    #[error("invalid bar date: '{0}'")]
    InvalidDate(String),

    /// A duration string could not be parsed.
    #[error("invalid duration: '{0}'")]
    InvalidDuration(String),
}

// =============================================================================
// Bars
// =============================================================================

/// Bar timestamp: a calendar date for daily bars, a full timestamp otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BarDate {
    /// Calendar date (`YYYYMMDD`).
    Date(NaiveDate),
    /// Date and time (`YYYYMMDD  HH:MM:SS`).
    DateTime(NaiveDateTime),
}

impl BarDate {
    /// Calendar date part.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Date(d) => *d,
            Self::DateTime(dt) => dt.date(),
        }
    }
}

/// Parse a bar date string.
///
/// Eight characters parse as a calendar date. Longer strings are a date and
/// a time separated by whitespace; a trailing time zone token is ignored.
///
/// # Errors
///
/// Returns [`HistoricalError::InvalidDate`] if the string matches neither form.
pub fn parse_bar_date(raw: &str) -> Result<BarDate, HistoricalError> {
    let invalid = || HistoricalError::InvalidDate(raw.to_string());

    if raw.len() == 8 {
        return NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map(BarDate::Date)
            .map_err(|_| invalid());
    }

    let mut parts = raw.split_whitespace();
    let (Some(date), Some(time)) = (parts.next(), parts.next()) else {
        return Err(invalid());
    };

    let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S").map_err(|_| invalid())?;

    Ok(BarDate::DateTime(date.and_time(time)))
}

/// One bar of a historical series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalBar {
    /// Bar date.
    pub date: BarDate,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: i64,
    /// Trade count.
    pub count: i32,
    /// Weighted average price.
    pub wap: f64,
    /// Whether the bar has gaps.
    pub has_gaps: bool,
}

impl TryFrom<&HistoricalDataBar> for HistoricalBar {
    type Error = HistoricalError;

    fn try_from(bar: &HistoricalDataBar) -> Result<Self, Self::Error> {
        Ok(Self {
            date: parse_bar_date(&bar.date)?,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            count: bar.count,
            wap: bar.wap,
            has_gaps: bar.has_gaps,
        })
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Bar size (request frequency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarSize {
    /// 1 second.
    Sec1,
    /// 5 seconds.
    Sec5,
    /// 15 seconds.
    Sec15,
    /// 30 seconds.
    Sec30,
    /// 1 minute.
    Min1,
    /// 2 minutes.
    Min2,
    /// 3 minutes.
    Min3,
    /// 5 minutes.
    Min5,
    /// 15 minutes.
    Min15,
    /// 30 minutes.
    Min30,
    /// 1 hour.
    Hour1,
    /// 1 day.
    Day1,
    /// 1 week.
    Week1,
    /// 1 month.
    Month1,
}

impl BarSize {
    /// Wire string for the bar size.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sec1 => "1 secs",
            Self::Sec5 => "5 secs",
            Self::Sec15 => "15 secs",
            Self::Sec30 => "30 secs",
            Self::Min1 => "1 min",
            Self::Min2 => "2 mins",
            Self::Min3 => "3 mins",
            Self::Min5 => "5 mins",
            Self::Min15 => "15 mins",
            Self::Min30 => "30 mins",
            Self::Hour1 => "1 hour",
            Self::Day1 => "1 day",
            Self::Week1 => "1 week",
            Self::Month1 => "1 month",
        }
    }

    /// Whether bars are one day or coarser.
    #[must_use]
    pub const fn is_daily(self) -> bool {
        matches!(self, Self::Day1 | Self::Week1 | Self::Month1)
    }
}

impl fmt::Display for BarSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of data to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WhatToShow {
    /// Trade prices.
    #[default]
    Trades,
    /// Bid/ask midpoint.
    Midpoint,
    /// Bid prices.
    Bid,
    /// Ask prices.
    Ask,
    /// Bid and ask.
    BidAsk,
    /// Historical volatility.
    HistoricalVolatility,
    /// Option implied volatility.
    OptionImpliedVolatility,
}

impl WhatToShow {
    /// Wire string for the data kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "TRADES",
            Self::Midpoint => "MIDPOINT",
            Self::Bid => "BID",
            Self::Ask => "ASK",
            Self::BidAsk => "BID_ASK",
            Self::HistoricalVolatility => "HISTORICAL_VOLATILITY",
            Self::OptionImpliedVolatility => "OPTION_IMPLIED_VOLATILITY",
        }
    }
}

impl fmt::Display for WhatToShow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format the end of a requested range (`YYYYMMDD HH:MM:SS`).
#[must_use]
pub fn format_end_datetime(end: NaiveDateTime) -> String {
    end.format("%Y%m%d %H:%M:%S").to_string()
}

// =============================================================================
// Duration
// =============================================================================

/// Unit of a request duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationUnit {
    /// Seconds (`S`).
    Seconds,
    /// Days (`D`).
    Days,
    /// Weeks (`W`).
    Weeks,
    /// Months (`M`).
    Months,
    /// Years (`Y`).
    Years,
}

impl DurationUnit {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Seconds => "S",
            Self::Days => "D",
            Self::Weeks => "W",
            Self::Months => "M",
            Self::Years => "Y",
        }
    }
}

/// Request duration, rendered as `"<amount> <unit>"` (e.g. `"3600 S"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DurationSpec {
    /// Number of units.
    pub amount: u64,
    /// Unit.
    pub unit: DurationUnit,
}

impl DurationSpec {
    /// Duration in seconds.
    #[must_use]
    pub const fn seconds(amount: u64) -> Self {
        Self {
            amount,
            unit: DurationUnit::Seconds,
        }
    }

    /// Duration in days.
    #[must_use]
    pub const fn days(amount: u64) -> Self {
        Self {
            amount,
            unit: DurationUnit::Days,
        }
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.as_str())
    }
}

impl FromStr for DurationSpec {
    type Err = HistoricalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HistoricalError::InvalidDuration(s.to_string());

        let mut parts = s.split_whitespace();
        let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        let amount = amount.parse::<u64>().map_err(|_| invalid())?;
        let unit = match unit.to_uppercase().as_str() {
            "S" => DurationUnit::Seconds,
            "D" => DurationUnit::Days,
            "W" => DurationUnit::Weeks,
            "M" => DurationUnit::Months,
            "Y" => DurationUnit::Years,
            _ => return Err(invalid()),
        };

        if amount == 0 {
            return Err(invalid());
        }

        Ok(Self { amount, unit })
    }
}

/// Strategy that sizes the duration of a historical data request.
pub trait DurationPolicy: Send + Sync + fmt::Debug {
    /// Duration to request for the range `[from, to]` at the given bar size.
    fn duration(&self, from: NaiveDateTime, to: NaiveDateTime, bar_size: BarSize) -> DurationSpec;
}

/// Duration covering the requested range: whole days (rounded up) for daily
/// bars, seconds otherwise. Never less than one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanDuration;

impl DurationPolicy for SpanDuration {
    fn duration(&self, from: NaiveDateTime, to: NaiveDateTime, bar_size: BarSize) -> DurationSpec {
        let seconds = u64::try_from((to - from).num_seconds()).unwrap_or(0).max(1);

        if bar_size.is_daily() {
            DurationSpec::days(seconds.div_ceil(86_400))
        } else {
            DurationSpec::seconds(seconds)
        }
    }
}

/// Constant duration regardless of the requested range.
///
/// Reproduces deployments that pin the window to a fixed value; bars before
/// `to - window` are not returned even when `from` asks for them.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindow(pub DurationSpec);

impl DurationPolicy for FixedWindow {
    fn duration(&self, _from: NaiveDateTime, _to: NaiveDateTime, _bar_size: BarSize) -> DurationSpec {
        self.0
    }
}

// =============================================================================
// Tests
// =============================================================================
