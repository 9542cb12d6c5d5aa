//! Finnhub Stream Relay Binary
//!
//! Starts the market data relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin finnhub-stream-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Credentials
//! - `FINNHUB_TOKEN`: Finnhub API token. When absent, the upstream
//!   subsystem is disabled with a warning instead of failing startup.
//!
//! ## Optional
//! - `REDIS_URL`: Redis endpoint (default: redis://localhost:6379/0)
//! - `RELAY_UPSTREAM_CAPACITY`: Upstream subscription cap (default: 50)
//! - `RELAY_REFRESH_INTERVAL_SECS`: Quote refresh interval (default: 10)
//! - `RELAY_CACHE_TTL_SECS`: Latest-price cache TTL (default: 86400)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `RELAY_RECONNECT_DELAY_INITIAL_MS` / `RELAY_RECONNECT_DELAY_MAX_SECS`:
//!   Reconnect backoff bounds (defaults: 500 / 30)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use finnhub_stream_relay::infrastructure::finnhub::{FeedConfig, FeedEvent, FeedStatus, FinnhubClient};
use finnhub_stream_relay::infrastructure::health::{HealthServer, HealthServerState};
use finnhub_stream_relay::infrastructure::quotes::FinnhubQuoteApi;
use finnhub_stream_relay::infrastructure::redis::{
    RedisPriceSink, RedisSinkConfig, SessionEventListener,
};
use finnhub_stream_relay::infrastructure::{metrics, telemetry};
use finnhub_stream_relay::{
    QuoteRefresher, ReconnectConfig, RelayConfig, SessionEventBridge, SubscriptionPool, TickRelay,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    telemetry::init();

    tracing::info!("Starting Finnhub Stream Relay");

    let _metrics_handle = metrics::init_metrics();

    let config = RelayConfig::from_env();
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Feed client and control handle. The handle exists even without
    // credentials so the pool can keep bookkeeping; only the I/O task is
    // gated on the token.
    let reconnect = ReconnectConfig {
        initial_delay: config.websocket.reconnect_delay_initial,
        max_delay: config.websocket.reconnect_delay_max,
        multiplier: config.websocket.reconnect_delay_multiplier,
        jitter_factor: config.websocket.reconnect_jitter,
        max_attempts: config.websocket.max_reconnect_attempts,
    };

    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(config.channels.tick_capacity);
    let feed_status = Arc::new(FeedStatus::new());

    let feed_config = config.token.as_ref().map_or_else(
        || FeedConfig::new(String::new(), reconnect.clone()),
        |token| FeedConfig::with_token(token.as_str(), reconnect.clone()),
    );
    let (feed_client, feed_handle) =
        FinnhubClient::new(feed_config, event_tx, shutdown_token.clone());

    // When disabled, the client is parked (not run) so its event channel
    // stays open and the relay simply idles.
    let _parked_client = if config.upstream_enabled() {
        tokio::spawn(async move {
            if let Err(e) = feed_client.run().await {
                tracing::error!(error = %e, "Feed client error");
            }
        });
        None
    } else {
        tracing::warn!(
            "FINNHUB_TOKEN is not set; upstream market data feed is disabled. \
             Viewer subscriptions will be tracked but receive no live updates."
        );
        Some(feed_client)
    };

    // Subscription pool driven by session events.
    let pool = Arc::new(SubscriptionPool::new(
        config.pool.upstream_capacity,
        Arc::new(feed_handle),
    ));
    let bridge = Arc::new(SessionEventBridge::new(
        Arc::clone(&pool),
        config.bridge.destination_prefix.clone(),
    ));

    // Redis sink shared by the relay and the refresher.
    let sink_config = RedisSinkConfig {
        cache_prefix: config.sink.cache_prefix.clone(),
        topic_prefix: config.sink.topic_prefix.clone(),
        cache_ttl: config.sink.cache_ttl,
        sanitize_topic_symbols: config.sink.sanitize_topic_symbols,
    };
    let sink = Arc::new(RedisPriceSink::connect(&config.redis_url, sink_config).await?);

    // Tick relay: feed events -> cache + pub/sub.
    let relay = TickRelay::new(
        event_rx,
        Arc::clone(&sink) as Arc<dyn finnhub_stream_relay::PriceSink>,
        Arc::clone(&feed_status),
        shutdown_token.clone(),
    );
    tokio::spawn(relay.run());

    // Session event listener: control channel -> bridge -> pool.
    let listener = SessionEventListener::new(
        &config.redis_url,
        config.bridge.session_event_channel.clone(),
        bridge,
        shutdown_token.clone(),
    )?;
    tokio::spawn(listener.run());

    // Periodic quote refresher shares the upstream credential; without it
    // there is nothing to poll.
    if let Some(token) = &config.token {
        let refresher = QuoteRefresher::new(
            Arc::clone(&pool),
            Arc::new(FinnhubQuoteApi::new(token.as_str())),
            Arc::clone(&sink) as Arc<dyn finnhub_stream_relay::PriceSink>,
            config.refresher.interval,
            shutdown_token.clone(),
        );
        tokio::spawn(refresher.run());
    }

    // Health server.
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        config.upstream_enabled(),
        Arc::clone(&feed_status),
        Arc::clone(&pool),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Stream relay ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Stream relay stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        upstream_enabled = config.upstream_enabled(),
        upstream_capacity = config.pool.upstream_capacity,
        refresh_interval_secs = config.refresher.interval.as_secs(),
        cache_ttl_secs = config.sink.cache_ttl.as_secs(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        topic_prefix = %config.sink.topic_prefix,
        cache_prefix = %config.sink.cache_prefix,
        destination_prefix = %config.bridge.destination_prefix,
        session_event_channel = %config.bridge.session_event_channel,
        "Naming conventions"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
