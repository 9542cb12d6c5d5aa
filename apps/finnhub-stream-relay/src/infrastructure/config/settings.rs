//! Relay Configuration Settings
//!
//! Configuration types for the stream relay, loaded from environment
//! variables. Every setting has a default; the only special case is the
//! upstream API token, whose absence disables the upstream subsystem with a
//! warning instead of failing startup.

use std::time::Duration;

/// Upstream API token.
///
/// The `Debug` implementation redacts the value for safe logging.
#[derive(Clone)]
pub struct FinnhubToken(String);

impl FinnhubToken {
    /// Wrap a non-empty token. Returns `None` for empty input.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() { None } else { Some(Self(token)) }
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for FinnhubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FinnhubToken").field(&"[REDACTED]").finish()
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter applied to reconnection delays (fraction of the delay).
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.1,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Subscription pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum concurrent upstream symbol subscriptions. Eviction scans are
    /// linear in this value.
    pub upstream_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            upstream_capacity: 50,
        }
    }
}

/// Periodic quote refresher settings.
#[derive(Debug, Clone)]
pub struct RefresherSettings {
    /// Interval between refresh cycles.
    pub interval: Duration,
}

impl Default for RefresherSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Cache and pub/sub sink settings.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Prefix for latest-price cache keys.
    pub cache_prefix: String,
    /// Prefix for per-symbol topic names.
    pub topic_prefix: String,
    /// Expiry for cache entries.
    pub cache_ttl: Duration,
    /// Replace delimiter-unsafe characters in topic names.
    pub sanitize_topic_symbols: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            cache_prefix: "price:latest:".to_string(),
            topic_prefix: "prices.".to_string(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            sanitize_topic_symbols: false,
        }
    }
}

/// Session event bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Destination prefix viewers subscribe under.
    pub destination_prefix: String,
    /// Redis channel carrying session lifecycle events.
    pub session_event_channel: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            destination_prefix: "/topic/prices.".to_string(),
            session_event_channel: "session-events".to_string(),
        }
    }
}

/// Internal channel settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the feed-to-relay tick channel.
    pub tick_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            tick_capacity: 1024,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream API token; `None` disables the upstream subsystem.
    pub token: Option<FinnhubToken>,
    /// Redis connection URL.
    pub redis_url: String,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Subscription pool settings.
    pub pool: PoolSettings,
    /// Quote refresher settings.
    pub refresher: RefresherSettings,
    /// Cache and pub/sub settings.
    pub sink: SinkSettings,
    /// Session event bridge settings.
    pub bridge: BridgeSettings,
    /// Internal channel settings.
    pub channels: ChannelSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            token: None,
            redis_url: "redis://localhost:6379/0".to_string(),
            websocket: WebSocketSettings::default(),
            pool: PoolSettings::default(),
            refresher: RefresherSettings::default(),
            sink: SinkSettings::default(),
            bridge: BridgeSettings::default(),
            channels: ChannelSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// Infallible: every setting has a default, and a missing
    /// `FINNHUB_TOKEN` is represented as `None` rather than an error.
    #[must_use]
    pub fn from_env() -> Self {
        let token = std::env::var("FINNHUB_TOKEN")
            .ok()
            .and_then(FinnhubToken::new);

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| RelayConfig::default().redis_url);

        let websocket = WebSocketSettings {
            reconnect_delay_initial: parse_env_duration_millis(
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                WebSocketSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                WebSocketSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                WebSocketSettings::default().reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_env_f64(
                "RELAY_RECONNECT_JITTER",
                WebSocketSettings::default().reconnect_jitter,
            ),
            max_reconnect_attempts: parse_env_u32(
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                WebSocketSettings::default().max_reconnect_attempts,
            ),
        };

        let pool = PoolSettings {
            upstream_capacity: parse_env_usize(
                "RELAY_UPSTREAM_CAPACITY",
                PoolSettings::default().upstream_capacity,
            ),
        };

        let refresher = RefresherSettings {
            interval: parse_env_duration_secs(
                "RELAY_REFRESH_INTERVAL_SECS",
                RefresherSettings::default().interval,
            ),
        };

        let sink = SinkSettings {
            cache_prefix: parse_env_string("RELAY_CACHE_PREFIX", SinkSettings::default().cache_prefix),
            topic_prefix: parse_env_string("RELAY_TOPIC_PREFIX", SinkSettings::default().topic_prefix),
            cache_ttl: parse_env_duration_secs(
                "RELAY_CACHE_TTL_SECS",
                SinkSettings::default().cache_ttl,
            ),
            sanitize_topic_symbols: parse_env_bool(
                "RELAY_SANITIZE_TOPIC_SYMBOLS",
                SinkSettings::default().sanitize_topic_symbols,
            ),
        };

        let bridge = BridgeSettings {
            destination_prefix: parse_env_string(
                "RELAY_DESTINATION_PREFIX",
                BridgeSettings::default().destination_prefix,
            ),
            session_event_channel: parse_env_string(
                "RELAY_SESSION_EVENT_CHANNEL",
                BridgeSettings::default().session_event_channel,
            ),
        };

        let channels = ChannelSettings {
            tick_capacity: parse_env_usize(
                "RELAY_TICK_CHANNEL_CAPACITY",
                ChannelSettings::default().tick_capacity,
            ),
        };

        let server = ServerSettings {
            health_port: parse_env_u16("RELAY_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Self {
            token,
            redis_url,
            websocket,
            pool,
            refresher,
            sink,
            bridge,
            channels,
            server,
        }
    }

    /// Whether the upstream subsystem is enabled (a token is configured).
    #[must_use]
    pub const fn upstream_enabled(&self) -> bool {
        self.token.is_some()
    }
}

fn parse_env_string(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_none() {
        assert!(FinnhubToken::new("").is_none());
        assert!(FinnhubToken::new("tok").is_some());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = FinnhubToken::new("super-secret").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn defaults_are_sensible() {
        let config = RelayConfig::default();
        assert!(!config.upstream_enabled());
        assert_eq!(config.pool.upstream_capacity, 50);
        assert_eq!(config.refresher.interval, Duration::from_secs(10));
        assert_eq!(config.sink.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.sink.topic_prefix, "prices.");
        assert_eq!(config.bridge.destination_prefix, "/topic/prices.");
        assert!(!config.sink.sanitize_topic_symbols);
    }

    #[test]
    fn websocket_defaults_match_backoff_policy() {
        let settings = WebSocketSettings::default();
        assert_eq!(settings.reconnect_delay_initial, Duration::from_millis(500));
        assert_eq!(settings.reconnect_delay_max, Duration::from_secs(30));
        assert!((settings.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_reconnect_attempts, 0);
    }
}
