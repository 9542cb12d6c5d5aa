//! Tick Normalizer & Fan-out
//!
//! Drains the feed event channel, converts raw trade entries into the
//! canonical [`PriceUpdate`] shape, and fans each update out to the two
//! sinks: the latest-price cache (write-through, with expiry) and the
//! per-symbol pub/sub topic.
//!
//! The two sink writes are independent: a cache failure is logged and does
//! not block publishing, and vice versa. Connection lifecycle events from
//! the feed update the shared [`FeedStatus`] consumed by the health
//! endpoint.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::PriceSink;
use crate::domain::tick::PriceUpdate;
use crate::infrastructure::finnhub::{FeedEvent, FeedStatus};
use crate::infrastructure::metrics;

/// Write one update through both sinks, logging failures independently.
///
/// This is the single fan-out path shared by the real-time relay and the
/// periodic quote refresher.
pub async fn fan_out(sink: &dyn PriceSink, update: &PriceUpdate) {
    if let Err(e) = sink.cache_latest(update).await {
        metrics::record_cache_error();
        tracing::warn!(ticker = %update.ticker, error = %e, "Latest-price cache write failed");
    }

    match sink.publish(update).await {
        Ok(()) => metrics::record_update_published(),
        Err(e) => {
            metrics::record_publish_error();
            tracing::warn!(ticker = %update.ticker, error = %e, "Price publish failed");
        }
    }
}

/// Consumes feed events and fans normalized updates out to the sinks.
pub struct TickRelay {
    events: mpsc::Receiver<FeedEvent>,
    sink: Arc<dyn PriceSink>,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl TickRelay {
    /// Create a relay reading from `events`.
    #[must_use]
    pub fn new(
        events: mpsc::Receiver<FeedEvent>,
        sink: Arc<dyn PriceSink>,
        status: Arc<FeedStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            sink,
            status,
            cancel,
        }
    }

    /// Process events until cancelled or the feed side hangs up.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Tick relay cancelled");
                    return;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::info!("Feed event channel closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Connected => {
                self.status.set_connected(true);
                self.status.set_reconnect_attempts(0);
                tracing::info!("Upstream feed connected");
            }
            FeedEvent::Disconnected => {
                self.status.set_connected(false);
                tracing::warn!("Upstream feed disconnected");
            }
            FeedEvent::Reconnecting { attempt } => {
                self.status.set_reconnect_attempts(attempt);
                tracing::info!(attempt, "Upstream feed reconnecting");
            }
            FeedEvent::Trade(entry) => {
                if entry.symbol.is_empty() {
                    tracing::debug!("Dropping trade with empty symbol");
                    return;
                }

                self.status.increment_messages();

                let update = PriceUpdate::from_trade(
                    entry.symbol,
                    entry.price,
                    entry.timestamp,
                    entry.volume,
                    entry.conditions,
                );
                fan_out(self.sink.as_ref(), &update).await;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
