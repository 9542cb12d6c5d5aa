//! Tracing Initialization
//!
//! Sets up the global `tracing` subscriber with an env-filter. Log levels
//! are controlled through `RUST_LOG` (default: `info` plus `info` for this
//! crate).
//!
//! # Usage
//!
//! ```ignore
//! use finnhub_stream_relay::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!("ready");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter directives when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "info,finnhub_stream_relay=info";

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored so tests can
/// initialize freely.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
