#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Finnhub Stream Relay - Market Data Multiplexer
//!
//! Maintains a single connection to the Finnhub trade WebSocket, bounds the
//! number of concurrently tracked upstream symbols, and relays normalized
//! price updates to Redis: a latest-price cache with expiry plus per-symbol
//! pub/sub topics consumed by downstream viewers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pooling logic and canonical types
//!   - `pool`: Bounded LRU subscription pool and viewer interest tracking
//!   - `tick`: Normalized price update and quote snapshot types
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the price sinks and the quote source
//!   - `bridge`: Session lifecycle events to pool operations
//!   - `relay`: Tick normalization and fan-out
//!   - `refresher`: Periodic OHLC snapshot refresh
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: WebSocket client for the trade stream, REST quote client
//!   - `redis`: Cache/pub-sub sink and session event listener
//!   - `config`: Environment-driven configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                                      ┌─────────────┐     ┌───────────────┐
//! Finnhub trade WS ───► FinnhubClient ─► Tick Relay  ├────►│ Redis cache + │──► Viewer 1
//!                            ▲         │  (normalize)│     │ pub/sub topics│──► Viewer N
//! Finnhub /quote ──► Quote Refresher ──►─────────────┘     └───────────────┘
//!                            │
//! Session events ──► Bridge ─► Subscription Pool (bounded, LRU eviction)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pooling logic and canonical types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pool::{
    AdmitOutcome, FeedCommands, PoolStats, SessionId, SubscriptionId, SubscriptionPool, Symbol,
};
pub use domain::tick::{PriceUpdate, QuoteSnapshot};

// Application services
pub use application::bridge::{SessionEvent, SessionEventBridge};
pub use application::ports::{PriceSink, QuoteSource, SinkError};
pub use application::refresher::QuoteRefresher;
pub use application::relay::TickRelay;

// Infrastructure config
pub use infrastructure::config::{FinnhubToken, RelayConfig};

// Feed client (for integration tests)
pub use infrastructure::finnhub::{
    FeedConfig, FeedEvent, FeedHandle, FeedStatus, FinnhubClient,
    reconnect::ReconnectConfig,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
