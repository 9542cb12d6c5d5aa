//! Canonical Price Update Types
//!
//! The normalized shape every inbound price observation is converted to
//! before it reaches the cache and the pub/sub layer. Two producers feed it:
//! real-time trades from the upstream WebSocket and periodic OHLC snapshots
//! from the quote REST API. Both serialize to the same downstream payload.
//!
//! # Wire Format (published JSON)
//!
//! ```json
//! {
//!   "ticker": "AAPL",
//!   "price": "187.32",
//!   "ts": 1723000000000,
//!   "volume": "120",
//!   "source": "finnhub",
//!   "rawType": "trade",
//!   "conditions": ["1"]
//! }
//! ```
//!
//! Snapshot updates additionally carry `open`, `high`, `low`,
//! `previousClose`, `change`, and `changePercent`. Decimals are serialized
//! as strings, timestamps as epoch milliseconds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source tag attached to every update produced by this service.
pub const SOURCE_TAG: &str = "finnhub";

/// Raw type tag for updates normalized from real-time trades.
pub const RAW_TYPE_TRADE: &str = "trade";

/// Raw type tag for updates normalized from OHLC quote snapshots.
pub const RAW_TYPE_QUOTE: &str = "quote";

// =============================================================================
// Price Update
// =============================================================================

/// A normalized price observation, ready for cache write and publish.
///
/// Ephemeral by design: built per inbound message, serialized into the two
/// sinks, then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Upstream symbol, passed through unmodified.
    pub ticker: String,
    /// Last traded price (trades) or current price (snapshots).
    pub price: Decimal,
    /// Observation timestamp in epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
    /// Trade volume; absent for snapshot updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    /// Originating provider tag.
    pub source: String,
    /// Upstream message kind this update was normalized from.
    pub raw_type: String,
    /// Trade condition codes, when the upstream entry carried any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    /// Session open price (snapshot updates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    /// Session high (snapshot updates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    /// Session low (snapshot updates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    /// Previous session close (snapshot updates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,
    /// Absolute change since previous close (snapshot updates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,
    /// Percentage change since previous close (snapshot updates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,
}

impl PriceUpdate {
    /// Build an update from a real-time trade observation.
    #[must_use]
    pub fn from_trade(
        ticker: impl Into<String>,
        price: Decimal,
        ts: DateTime<Utc>,
        volume: Option<Decimal>,
        conditions: Option<Vec<String>>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            ts,
            volume,
            source: SOURCE_TAG.to_string(),
            raw_type: RAW_TYPE_TRADE.to_string(),
            conditions,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            change: None,
            change_percent: None,
        }
    }

    /// Build an update from an OHLC quote snapshot.
    ///
    /// The snapshot API reports no observation time of its own, so the
    /// caller supplies the fetch time as `ts`.
    #[must_use]
    pub fn from_snapshot(ticker: impl Into<String>, snapshot: &QuoteSnapshot, ts: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            price: snapshot.current_price,
            ts,
            volume: None,
            source: SOURCE_TAG.to_string(),
            raw_type: RAW_TYPE_QUOTE.to_string(),
            conditions: None,
            open: Some(snapshot.open),
            high: Some(snapshot.high),
            low: Some(snapshot.low),
            previous_close: Some(snapshot.previous_close),
            change: snapshot.change,
            change_percent: snapshot.change_percent,
        }
    }
}

// =============================================================================
// Quote Snapshot
// =============================================================================

/// A full OHLC quote snapshot from the external snapshot source.
///
/// Carries the book-keeping figures the tick stream does not: open, high,
/// low, and previous close.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    /// Current price.
    pub current_price: Decimal,
    /// Session open.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Previous session close.
    pub previous_close: Decimal,
    /// Absolute change since previous close, when reported.
    pub change: Option<Decimal>,
    /// Percentage change since previous close, when reported.
    pub change_percent: Option<Decimal>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_723_000_000_000).unwrap()
    }

    #[test]
    fn trade_update_serializes_camel_case() {
        let update = PriceUpdate::from_trade(
            "AAPL",
            dec!(187.32),
            ts(),
            Some(dec!(120)),
            Some(vec!["1".to_string()]),
        );

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["ticker"], "AAPL");
        assert_eq!(json["price"], "187.32");
        assert_eq!(json["ts"], 1_723_000_000_000_i64);
        assert_eq!(json["volume"], "120");
        assert_eq!(json["source"], "finnhub");
        assert_eq!(json["rawType"], "trade");
        assert_eq!(json["conditions"][0], "1");
    }

    #[test]
    fn trade_update_omits_absent_fields() {
        let update = PriceUpdate::from_trade("AAPL", dec!(187.32), ts(), None, None);

        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("volume").is_none());
        assert!(json.get("conditions").is_none());
        assert!(json.get("open").is_none());
        assert!(json.get("previousClose").is_none());
    }

    #[test]
    fn snapshot_update_carries_ohlc() {
        let snapshot = QuoteSnapshot {
            current_price: dec!(101.5),
            open: dec!(99.0),
            high: dec!(102.0),
            low: dec!(98.5),
            previous_close: dec!(100.0),
            change: Some(dec!(1.5)),
            change_percent: Some(dec!(1.5)),
        };

        let update = PriceUpdate::from_snapshot("MSFT", &snapshot, ts());

        assert_eq!(update.raw_type, RAW_TYPE_QUOTE);
        assert_eq!(update.price, dec!(101.5));
        assert!(update.volume.is_none());

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["open"], "99.0");
        assert_eq!(json["previousClose"], "100.0");
        assert_eq!(json["changePercent"], "1.5");
        assert_eq!(json["rawType"], "quote");
    }
}
