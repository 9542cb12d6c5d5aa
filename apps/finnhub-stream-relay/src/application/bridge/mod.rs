//! Session Event Bridge
//!
//! Adapts downstream protocol lifecycle events into subscription pool
//! operations. Viewers express interest by subscribing to destinations of
//! the form `<prefix><symbol>` (for example `/topic/prices.AAPL`); anything
//! that does not match the configured prefix is ignored.
//!
//! Disconnects always trigger the pool's bulk removal, regardless of how
//! many subscriptions the session held.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::pool::{AdmitOutcome, SubscriptionPool};
use crate::infrastructure::metrics;

// =============================================================================
// Session Events
// =============================================================================

/// A downstream protocol lifecycle event.
///
/// # Wire Format
///
/// ```json
/// {"event":"subscribe","sessionId":"s1","subscriptionId":"sub-1","destination":"/topic/prices.AAPL"}
/// {"event":"unsubscribe","sessionId":"s1","subscriptionId":"sub-1"}
/// {"event":"disconnect","sessionId":"s1"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum SessionEvent {
    /// A viewer subscribed to a destination.
    #[serde(rename_all = "camelCase")]
    Subscribe {
        /// Owning session.
        session_id: String,
        /// Subscription id, unique within the session.
        subscription_id: String,
        /// Destination string the viewer subscribed to.
        destination: String,
    },
    /// A viewer cancelled one subscription.
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        /// Owning session.
        session_id: String,
        /// Subscription id being cancelled.
        subscription_id: String,
    },
    /// A session disconnected entirely.
    #[serde(rename_all = "camelCase")]
    Disconnect {
        /// The disconnected session.
        session_id: String,
    },
}

// =============================================================================
// Bridge
// =============================================================================

/// Translates [`SessionEvent`]s into [`SubscriptionPool`] calls.
pub struct SessionEventBridge {
    pool: Arc<SubscriptionPool>,
    destination_prefix: String,
}

impl SessionEventBridge {
    /// Create a bridge recognizing destinations under `destination_prefix`.
    #[must_use]
    pub fn new(pool: Arc<SubscriptionPool>, destination_prefix: String) -> Self {
        Self {
            pool,
            destination_prefix,
        }
    }

    /// Apply one downstream event to the pool.
    pub fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::Subscribe {
                session_id,
                subscription_id,
                destination,
            } => {
                let Some(symbol) = self.symbol_from_destination(&destination) else {
                    tracing::debug!(%destination, "Ignoring non-price destination");
                    return;
                };

                let outcome = self.pool.add_interest(&session_id, &subscription_id, symbol);
                match outcome {
                    AdmitOutcome::Admitted | AdmitOutcome::AlreadyPooled => {
                        tracing::debug!(session = %session_id, symbol, "Viewer subscribed");
                    }
                    AdmitOutcome::AdmittedAfterEviction(victim) => {
                        metrics::record_pool_eviction();
                        tracing::info!(symbol, evicted = %victim, "Evicted idle symbol for new subscription");
                    }
                    AdmitOutcome::Rejected => {
                        metrics::record_pool_rejection();
                        tracing::warn!(
                            session = %session_id,
                            symbol,
                            "Upstream subscription cap reached; symbol not subscribed"
                        );
                    }
                    AdmitOutcome::Ignored => {
                        tracing::debug!(%destination, "Ignoring empty symbol");
                    }
                }
            }
            SessionEvent::Unsubscribe {
                session_id,
                subscription_id,
            } => {
                self.pool.remove_interest(&session_id, &subscription_id);
                tracing::debug!(session = %session_id, subscription = %subscription_id, "Viewer unsubscribed");
            }
            SessionEvent::Disconnect { session_id } => {
                self.pool.remove_session(&session_id);
                tracing::debug!(session = %session_id, "Session disconnected");
            }
        }
    }

    /// Extract the symbol from a destination, if it matches the prefix.
    fn symbol_from_destination<'a>(&self, destination: &'a str) -> Option<&'a str> {
        destination
            .strip_prefix(&self.destination_prefix)
            .filter(|symbol| !symbol.is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================
