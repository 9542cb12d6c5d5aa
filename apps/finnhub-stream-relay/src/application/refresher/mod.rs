//! Periodic Quote Refresher
//!
//! On a fixed interval, fetches a full OHLC snapshot for every symbol that
//! currently has at least one active viewer and pushes it through the same
//! fan-out path as real-time ticks, on the same per-symbol topics. This
//! complements the trade stream with the book-keeping figures it does not
//! carry (open, high, low, previous close).
//!
//! A failure fetching one symbol is logged and skipped; the rest of the
//! cycle proceeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PriceSink, QuoteSource};
use crate::application::relay;
use crate::domain::pool::SubscriptionPool;
use crate::domain::tick::PriceUpdate;

/// Timer-driven OHLC snapshot refresher for actively-viewed symbols.
pub struct QuoteRefresher {
    pool: Arc<SubscriptionPool>,
    quotes: Arc<dyn QuoteSource>,
    sink: Arc<dyn PriceSink>,
    interval: Duration,
    cancel: CancellationToken,
}

impl QuoteRefresher {
    /// Create a refresher polling every `interval`.
    #[must_use]
    pub fn new(
        pool: Arc<SubscriptionPool>,
        quotes: Arc<dyn QuoteSource>,
        sink: Arc<dyn PriceSink>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            quotes,
            sink,
            interval,
            cancel,
        }
    }

    /// Run refresh cycles until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a cycle never races
        // startup wiring.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Quote refresher cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh_cycle().await;
                }
            }
        }
    }

    /// Fetch and fan out one snapshot per actively-viewed symbol.
    pub async fn refresh_cycle(&self) {
        let symbols = self.pool.active_tickers();
        if symbols.is_empty() {
            return;
        }

        tracing::debug!(count = symbols.len(), "Refreshing quotes");
        for symbol in symbols {
            match self.quotes.get_quote(&symbol).await {
                Ok(snapshot) => {
                    let update = PriceUpdate::from_snapshot(&symbol, &snapshot, Utc::now());
                    relay::fan_out(self.sink.as_ref(), &update).await;
                }
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "Quote refresh failed; skipping symbol");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
