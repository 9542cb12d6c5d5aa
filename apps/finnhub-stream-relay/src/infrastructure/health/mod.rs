//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, and
//! Prometheus metrics. Used by container orchestrators, load balancers, and
//! monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the feed)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::pool::SubscriptionPool;
use crate::infrastructure::finnhub::FeedStatus;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Upstream feed currently disconnected.
    Degraded,
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Whether the upstream subsystem is enabled (credentials configured).
    pub enabled: bool,
    /// Whether the feed is connected.
    pub connected: bool,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Data messages received since startup.
    pub messages_received: u64,
}

/// Subscription pool status.
#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    /// Symbols currently subscribed upstream.
    pub pooled: usize,
    /// Upstream subscription cap.
    pub capacity: usize,
    /// Symbols with at least one active viewer.
    pub viewed_symbols: usize,
    /// Sessions holding at least one subscription.
    pub sessions: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub feed: FeedInfo,
    /// Subscription pool status.
    pub pool: PoolInfo,
}

// =============================================================================
// Health Server
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed_enabled: bool,
    feed: Arc<FeedStatus>,
    pool: Arc<SubscriptionPool>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed_enabled: bool,
        feed: Arc<FeedStatus>,
        pool: Arc<SubscriptionPool>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed_enabled,
            feed,
            pool,
        }
    }

    fn snapshot(&self) -> HealthResponse {
        let pool_stats = self.pool.stats();
        let connected = self.feed.is_connected();

        let status = if connected || !self.feed_enabled {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthResponse {
            status,
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            feed: FeedInfo {
                enabled: self.feed_enabled,
                connected,
                reconnect_attempts: self.feed.reconnect_attempts(),
                messages_received: self.feed.messages_received(),
            },
            pool: PoolInfo {
                pooled: pool_stats.pooled,
                capacity: pool_stats.capacity,
                viewed_symbols: pool_stats.viewed,
                sessions: pool_stats.sessions,
            },
        }
    }
}

/// Health check HTTP server error.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Could not bind the listen address.
    #[error("failed to bind health server: {0}")]
    Bind(std::io::Error),

    /// Serving failed.
    #[error("health server error: {0}")]
    Serve(std::io::Error),
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when the listen address cannot be bound or serving
    /// fails.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health))
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route("/metrics", get(metrics_endpoint))
            .with_state(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await.map_err(HealthServerError::Bind)?;
        tracing::info!(%addr, "Health server listening");

        let cancel = self.cancel;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    Json(state.snapshot())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    // Ready when the feed is connected, or when it is deliberately disabled
    // (the relay still serves session events and cached data paths).
    if state.feed.is_connected() || !state.feed_enabled {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "feed disconnected")
    }
}

async fn metrics_endpoint() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "metrics not initialized".to_string(),
            )
        },
        |handle| (StatusCode::OK, handle.render()),
    )
}

// =============================================================================
// Tests
// =============================================================================
