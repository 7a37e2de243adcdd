//! Decoded real-time event records

use crate::enums::Tape;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Aggregate trading activity during one time window
///
/// Sent for both the per-second (`A`) and per-minute (`AM`) channels;
/// the two share a shape and differ only in window length. Timestamps
/// are millisecond epoch on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateBar {
    /// Event discriminator (`A` or `AM`)
    #[serde(rename = "ev")]
    pub event_type: String,
    /// Ticker symbol
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Volume traded during the window
    #[serde(rename = "v")]
    pub volume: u64,
    /// Today's accumulated volume
    #[serde(rename = "av")]
    pub day_accumulated_volume: u64,
    /// Today's official opening price
    #[serde(rename = "op", default)]
    pub day_open_price: Option<Decimal>,
    /// Today's volume-weighted average price
    #[serde(rename = "a")]
    pub day_average_price: Decimal,
    /// Volume-weighted average price for the window
    #[serde(rename = "vw")]
    pub average_price: Decimal,
    /// Opening price of the window
    #[serde(rename = "o")]
    pub open: Decimal,
    /// Highest price during the window
    #[serde(rename = "h")]
    pub high: Decimal,
    /// Lowest price during the window
    #[serde(rename = "l")]
    pub low: Decimal,
    /// Closing price of the window
    #[serde(rename = "c")]
    pub close: Decimal,
    /// Average trade size during the window
    #[serde(rename = "z")]
    pub average_trade_size: Decimal,
    /// Window start
    #[serde(rename = "s", with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,
    /// Window end
    #[serde(rename = "e", with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,
    /// Whether this aggregate is for an OTC ticker
    #[serde(rename = "otc", default)]
    pub over_the_counter: bool,
}

/// A single executed trade (`T` channel)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveTrade {
    /// Event discriminator (`T`)
    #[serde(rename = "ev")]
    pub event_type: String,
    /// Ticker symbol
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Exchange ID, per Polygon's exchange reference data
    #[serde(rename = "x")]
    pub exchange_id: u32,
    /// Unique trade ID
    #[serde(rename = "i")]
    pub trade_id: String,
    /// Tape on which the trade was recorded
    #[serde(rename = "z", default)]
    pub tape: Tape,
    /// Trade price
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Trade size
    #[serde(rename = "s")]
    pub size: u64,
    /// Trade condition codes
    #[serde(rename = "c", default)]
    pub conditions: Option<Vec<i32>>,
    /// Trade timestamp
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Per-symbol sequence number; increasing but not necessarily
    /// sequential
    #[serde(rename = "q")]
    pub sequence_number: u64,
    /// Trade Reporting Facility ID, when reported off-exchange
    #[serde(rename = "trfi", default)]
    pub trade_reporting_facility: Option<i32>,
    /// Timestamp at which the TRF received the trade
    #[serde(
        rename = "trft",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub trade_reporting_facility_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deserialize_aggregate_bar() {
        let json = r#"{
            "ev": "AM", "sym": "SPY", "v": 4110, "av": 9470157,
            "op": 437.89, "a": 438.0, "vw": 438.12,
            "o": 438.1, "h": 438.2, "l": 438.05, "c": 438.15,
            "z": 60, "s": 1610144640000, "e": 1610144700000
        }"#;

        let bar: AggregateBar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.symbol, "SPY");
        assert_eq!(bar.volume, 4110);
        assert_eq!(bar.close, dec!(438.15));
        assert_eq!(bar.day_open_price, Some(dec!(437.89)));
        assert_eq!(bar.start.timestamp_millis(), 1_610_144_640_000);
        assert!(!bar.over_the_counter);
    }

    #[test]
    fn deserialize_trade() {
        let json = r#"{
            "ev": "T", "sym": "MSFT", "x": 4, "i": "12345",
            "z": 3, "p": 114.125, "s": 100, "c": [0, 12],
            "t": 1536036818784, "q": 3681328
        }"#;

        let trade: LiveTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.symbol, "MSFT");
        assert_eq!(trade.tape, Tape::Nasdaq);
        assert_eq!(trade.price, dec!(114.125));
        assert_eq!(trade.conditions.as_deref(), Some(&[0, 12][..]));
        assert_eq!(trade.trade_reporting_facility, None);
    }
}
