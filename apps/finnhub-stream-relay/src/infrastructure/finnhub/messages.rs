//! Finnhub WebSocket Message Types
//!
//! Wire format types for the Finnhub trade stream.
//!
//! # Outbound Control Frames
//!
//! ```json
//! {"type":"subscribe","symbol":"AAPL"}
//! {"type":"unsubscribe","symbol":"AAPL"}
//! ```
//!
//! # Inbound Data Frames
//!
//! ```json
//! {"type":"trade","data":[{"s":"AAPL","p":187.32,"t":1723000000000,"v":120,"c":["1"]}]}
//! ```
//!
//! The server also emits `{"type":"ping"}` keepalives and other message
//! kinds (`news`, …); everything that is not a `trade` frame is ignored.
//!
//! # References
//!
//! - [Finnhub WebSocket Trades](https://finnhub.io/docs/api/websocket-trades)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Message type discriminator for inbound trade frames.
const TYPE_TRADE: &str = "trade";

/// Message type discriminator for server keepalives.
const TYPE_PING: &str = "ping";

// =============================================================================
// Outbound Control Frames
// =============================================================================

/// Control action for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Start streaming trades for a symbol.
    Subscribe,
    /// Stop streaming trades for a symbol.
    Unsubscribe,
}

/// An outbound subscribe/unsubscribe frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRequest {
    /// Control action.
    #[serde(rename = "type")]
    pub action: ControlAction,
    /// Target symbol, passed through unmodified.
    pub symbol: String,
}

impl ControlRequest {
    /// Build a subscribe frame for `symbol`.
    #[must_use]
    pub fn subscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            symbol: symbol.into(),
        }
    }

    /// Build an unsubscribe frame for `symbol`.
    #[must_use]
    pub fn unsubscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            symbol: symbol.into(),
        }
    }

    /// Serialize to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// One trade entry inside a `trade` frame's `data` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeEntry {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Last traded price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Trade timestamp (epoch milliseconds).
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Trade volume.
    #[serde(rename = "v", default)]
    pub volume: Option<Decimal>,
    /// Trade condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Option<Vec<String>>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A batch of trade entries.
    Trades(Vec<TradeEntry>),
    /// Server keepalive.
    Ping,
    /// Any other message kind; carried for trace logging only.
    Other(String),
}

/// Decode one inbound text frame.
///
/// Only the envelope and, for `trade` frames, the `data` array are parsed;
/// unrecognized message kinds decode to [`FeedMessage::Other`] without
/// touching their payload.
///
/// # Errors
///
/// Returns an error when the text is not valid JSON, has no string `type`
/// field, or a `trade` frame's entries do not match the expected shape.
pub fn decode(text: &str) -> Result<FeedMessage, serde_json::Error> {
    use serde::de::Error;

    let value: serde_json::Value = serde_json::from_str(text)?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| serde_json::Error::custom("missing message type"))?;

    match kind {
        TYPE_TRADE => {
            let data = value
                .get("data")
                .cloned()
                .unwrap_or_else(|| serde_json::Value::Array(vec![]));
            let entries: Vec<TradeEntry> = serde_json::from_value(data)?;
            Ok(FeedMessage::Trades(entries))
        }
        TYPE_PING => Ok(FeedMessage::Ping),
        other => Ok(FeedMessage::Other(other.to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn control_frames_serialize_to_wire_format() {
        let subscribe = ControlRequest::subscribe("AAPL").to_json().unwrap();
        assert_eq!(subscribe, r#"{"type":"subscribe","symbol":"AAPL"}"#);

        let unsubscribe = ControlRequest::unsubscribe("AAPL").to_json().unwrap();
        assert_eq!(unsubscribe, r#"{"type":"unsubscribe","symbol":"AAPL"}"#);
    }

    #[test]
    fn trade_frame_decodes_entries() {
        let text = r#"{"type":"trade","data":[
            {"s":"AAPL","p":187.32,"t":1723000000000,"v":120,"c":["1","12"]},
            {"s":"BINANCE:BTCUSDT","p":64000.5,"t":1723000000001,"v":0.002}
        ]}"#;

        let FeedMessage::Trades(entries) = decode(text).unwrap() else {
            panic!("expected trades");
        };

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol, "AAPL");
        assert_eq!(entries[0].price, dec!(187.32));
        assert_eq!(
            entries[0].timestamp,
            Utc.timestamp_millis_opt(1_723_000_000_000).unwrap()
        );
        assert_eq!(entries[0].conditions.as_deref(), Some(&["1".to_string(), "12".to_string()][..]));
        assert_eq!(entries[1].volume, Some(dec!(0.002)));
        assert!(entries[1].conditions.is_none());
    }

    #[test]
    fn trade_frame_with_empty_data_decodes_to_empty_batch() {
        let decoded = decode(r#"{"type":"trade","data":[]}"#).unwrap();
        assert_eq!(decoded, FeedMessage::Trades(vec![]));

        let missing_data = decode(r#"{"type":"trade"}"#).unwrap();
        assert_eq!(missing_data, FeedMessage::Trades(vec![]));
    }

    #[test]
    fn ping_and_unknown_kinds_are_recognized() {
        assert_eq!(decode(r#"{"type":"ping"}"#).unwrap(), FeedMessage::Ping);
        assert_eq!(
            decode(r#"{"type":"news","data":[{"headline":"x"}]}"#).unwrap(),
            FeedMessage::Other("news".to_string())
        );
    }

    #[test]
    fn malformed_frames_error() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"data":[]}"#).is_err());
        assert!(decode(r#"{"type":"trade","data":[{"p":1.0}]}"#).is_err());
    }

    #[test]
    fn empty_symbol_entries_still_decode() {
        // Filtering empty symbols is the client's job, not the codec's.
        let text = r#"{"type":"trade","data":[{"s":"","p":1.5,"t":1723000000000}]}"#;
        let FeedMessage::Trades(entries) = decode(text).unwrap() else {
            panic!("expected trades");
        };
        assert_eq!(entries[0].symbol, "");
    }
}
