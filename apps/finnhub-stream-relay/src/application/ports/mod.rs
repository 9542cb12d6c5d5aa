//! Port Interfaces
//!
//! Contracts between the use cases and the outside world, following the
//! Hexagonal Architecture pattern. Infrastructure adapters implement these;
//! tests substitute mocks.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`PriceSink`]: latest-price cache plus per-symbol topic publishing
//! - [`QuoteSource`]: OHLC snapshot fetches from the external quote API
//!
//! The upstream feed's control port ([`crate::domain::pool::FeedCommands`])
//! lives in the domain layer because the pool itself drives it.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::tick::{PriceUpdate, QuoteSnapshot};

// =============================================================================
// Price Sink
// =============================================================================

/// Errors surfaced by a [`PriceSink`] implementation.
///
/// All of them are logged and swallowed by the callers: a failing cache
/// write must not block publishing and vice versa.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The update could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The cache write failed.
    #[error("cache write failed: {0}")]
    Cache(String),

    /// The topic publish failed.
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Destination for normalized price updates: a write-through latest-price
/// cache and a per-symbol pub/sub topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSink: Send + Sync {
    /// Store `update` as the latest price for its symbol, with expiry.
    async fn cache_latest(&self, update: &PriceUpdate) -> Result<(), SinkError>;

    /// Publish `update` to the symbol's topic.
    async fn publish(&self, update: &PriceUpdate) -> Result<(), SinkError>;
}

// =============================================================================
// Quote Source
// =============================================================================

/// Errors surfaced by a [`QuoteSource`] implementation.
#[derive(Debug, Error)]
pub enum QuoteError {
    /// The snapshot request failed (network, HTTP status).
    #[error("quote request failed: {0}")]
    Request(String),

    /// The response body did not match the expected shape.
    #[error("malformed quote response: {0}")]
    Malformed(String),
}

/// External source of full OHLC quote snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the current snapshot for `symbol`.
    async fn get_quote(&self, symbol: &str) -> Result<QuoteSnapshot, QuoteError>;
}
