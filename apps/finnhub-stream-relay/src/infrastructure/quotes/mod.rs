//! Finnhub Quote Snapshot Client
//!
//! REST client for the `/quote` endpoint, implementing the
//! [`QuoteSource`] port for the periodic refresher.
//!
//! # Wire Format
//!
//! ```json
//! {"c": 101.5, "o": 99.0, "h": 102.0, "l": 98.5, "pc": 100.0, "d": 1.5, "dp": 1.5}
//! ```
//!
//! # References
//!
//! - [Finnhub Quote](https://finnhub.io/docs/api/quote)

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{QuoteError, QuoteSource};
use crate::domain::tick::QuoteSnapshot;

/// Production REST base URL.
pub const DEFAULT_API_URL: &str = "https://finnhub.io/api/v1";

// =============================================================================
// Wire Types
// =============================================================================

/// Response body of the `/quote` endpoint.
#[derive(Debug, Clone, Deserialize)]
struct QuoteResponse {
    /// Current price.
    c: Decimal,
    /// Open price of the day.
    o: Decimal,
    /// High price of the day.
    h: Decimal,
    /// Low price of the day.
    l: Decimal,
    /// Previous close price.
    pc: Decimal,
    /// Change.
    #[serde(default)]
    d: Option<Decimal>,
    /// Percent change.
    #[serde(default)]
    dp: Option<Decimal>,
}

impl From<QuoteResponse> for QuoteSnapshot {
    fn from(response: QuoteResponse) -> Self {
        Self {
            current_price: response.c,
            open: response.o,
            high: response.h,
            low: response.l,
            previous_close: response.pc,
            change: response.d,
            change_percent: response.dp,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// REST client for quote snapshots.
pub struct FinnhubQuoteApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl FinnhubQuoteApi {
    /// Create a client against the production API.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_API_URL, token)
    }

    /// Create a client against a custom base URL (tests, proxies).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl QuoteSource for FinnhubQuoteApi {
    async fn get_quote(&self, symbol: &str) -> Result<QuoteSnapshot, QuoteError> {
        let url = format!("{}/quote", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol), ("token", &self.token)])
            .send()
            .await
            .map_err(|e| QuoteError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| QuoteError::Request(e.to_string()))?;

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Malformed(e.to_string()))?;

        Ok(quote.into())
    }
}

impl std::fmt::Debug for FinnhubQuoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubQuoteApi")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
