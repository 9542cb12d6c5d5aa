//! Redis Adapters
//!
//! Two adapters share one Redis deployment:
//!
//! - [`RedisPriceSink`]: the write-through latest-price cache
//!   (`SET <cache-prefix><symbol> <json> EX <ttl>`) plus the downstream
//!   pub/sub broker (`PUBLISH <topic-prefix><symbol> <json>`);
//! - [`SessionEventListener`]: subscriber on the control channel carrying
//!   downstream session lifecycle events, forwarded to the
//!   [`SessionEventBridge`].
//!
//! Topic names embed the raw symbol unescaped by default; symbols such as
//! `BINANCE:BTCUSDT` produce topics like `prices.BINANCE:BTCUSDT`. Brokers
//! with strict naming schemes can opt into sanitizing via configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;

use crate::application::bridge::{SessionEvent, SessionEventBridge};
use crate::application::ports::{PriceSink, SinkError};
use crate::domain::tick::PriceUpdate;

/// Delay before retrying a lost pub/sub connection.
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// Price Sink
// =============================================================================

/// Configuration for the price sink.
#[derive(Debug, Clone)]
pub struct RedisSinkConfig {
    /// Prefix for latest-price cache keys.
    pub cache_prefix: String,
    /// Prefix for per-symbol topic names.
    pub topic_prefix: String,
    /// Expiry for cache entries.
    pub cache_ttl: Duration,
    /// Replace delimiter-unsafe characters in topic names. Off by default:
    /// symbols pass through as-is.
    pub sanitize_topic_symbols: bool,
}

impl Default for RedisSinkConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "price:latest:".to_string(),
            topic_prefix: "prices.".to_string(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            sanitize_topic_symbols: false,
        }
    }
}

impl RedisSinkConfig {
    /// Cache key for a symbol's latest price.
    #[must_use]
    pub fn cache_key(&self, symbol: &str) -> String {
        format!("{}{}", self.cache_prefix, symbol)
    }

    /// Topic name for a symbol's price updates.
    ///
    /// The symbol is embedded as-is unless `sanitize_topic_symbols` is set,
    /// in which case delimiter-unsafe characters become underscores.
    #[must_use]
    pub fn topic(&self, symbol: &str) -> String {
        if self.sanitize_topic_symbols {
            let sanitized: String = symbol
                .chars()
                .map(|c| {
                    if c.is_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("{}{}", self.topic_prefix, sanitized)
        } else {
            format!("{}{}", self.topic_prefix, symbol)
        }
    }
}

/// Redis-backed implementation of the [`PriceSink`] port.
#[derive(Clone)]
pub struct RedisPriceSink {
    conn: ConnectionManager,
    config: RedisSinkConfig,
}

impl RedisPriceSink {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial connection cannot be established;
    /// once established, the connection manager reconnects on its own.
    pub async fn connect(url: &str, config: RedisSinkConfig) -> Result<Self, SinkError> {
        let client = redis::Client::open(url).map_err(|e| SinkError::Cache(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SinkError::Cache(e.to_string()))?;

        tracing::info!("Redis connection established");
        Ok(Self { conn, config })
    }
}

#[async_trait]
impl PriceSink for RedisPriceSink {
    async fn cache_latest(&self, update: &PriceUpdate) -> Result<(), SinkError> {
        let payload = serde_json::to_string(update)?;
        let key = self.config.cache_key(&update.ticker);

        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(key, payload, self.config.cache_ttl.as_secs())
            .await
            .map_err(|e| SinkError::Cache(e.to_string()))?;

        Ok(())
    }

    async fn publish(&self, update: &PriceUpdate) -> Result<(), SinkError> {
        let payload = serde_json::to_string(update)?;
        let topic = self.config.topic(&update.ticker);

        let mut conn = self.conn.clone();
        let () = conn
            .publish(topic, payload)
            .await
            .map_err(|e| SinkError::Publish(e.to_string()))?;

        Ok(())
    }
}

impl std::fmt::Debug for RedisPriceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPriceSink")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Session Event Listener
// =============================================================================

/// Subscribes to the session event control channel and forwards events to
/// the bridge. Malformed payloads are logged and dropped.
pub struct SessionEventListener {
    client: redis::Client,
    channel: String,
    bridge: Arc<SessionEventBridge>,
    cancel: CancellationToken,
}

impl SessionEventListener {
    /// Create a listener for `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error when the Redis URL is invalid.
    pub fn new(
        url: &str,
        channel: String,
        bridge: Arc<SessionEventBridge>,
        cancel: CancellationToken,
    ) -> Result<Self, SinkError> {
        let client = redis::Client::open(url).map_err(|e| SinkError::Cache(e.to_string()))?;
        Ok(Self {
            client,
            channel,
            bridge,
            cancel,
        })
    }

    /// Listen until cancelled, re-establishing the pub/sub connection on
    /// failure.
    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Session event listener cancelled");
                return;
            }

            match self.listen_once().await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "Session event subscription lost; retrying");
                    tokio::select! {
                        () = self.cancel.cancelled() => return,
                        () = tokio::time::sleep(LISTENER_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    async fn listen_once(&self) -> Result<(), redis::RedisError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "Listening for session events");

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Err(redis::RedisError::from((
                            redis::ErrorKind::IoError,
                            "pub/sub stream ended",
                        )));
                    };

                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(error = %e, "Unreadable session event payload");
                            continue;
                        }
                    };

                    match serde_json::from_str::<SessionEvent>(&payload) {
                        Ok(event) => self.bridge.handle(event),
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping malformed session event");
                        }
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
