//! Bounded Upstream Subscription Pool
//!
//! Tracks which downstream sessions are viewing which symbols and keeps
//! every actively-viewed symbol subscribed upstream, under a hard cap on
//! concurrent upstream subscriptions.
//!
//! # Design
//!
//! Three pieces of state:
//! - intents: per-session map of subscription id to symbol, so one session
//!   may hold several subscriptions to the same symbol;
//! - viewers: derived symbol-to-sessions sets, consulted to decide whether
//!   a pooled symbol is evictable;
//! - pooled: the recency-ordered list of symbols currently subscribed
//!   upstream (most recently referenced at the tail), guarded by a single
//!   mutex so the admit/evict decision is atomic per call.
//!
//! Removing interest never unsubscribes upstream. An unviewed symbol stays
//! pooled until a full pool needs its slot, which trades a little upstream
//! bandwidth for not resubscribing symbols viewers bounce between.
//!
//! Upstream calls go through [`FeedCommands`], whose implementations must
//! be non-blocking (the pool invokes them while holding the pool mutex).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

// =============================================================================
// Types
// =============================================================================

/// Identifier of a downstream session (connection).
pub type SessionId = String;

/// Identifier of a single subscription within a session.
pub type SubscriptionId = String;

/// A symbol string as used by the upstream feed.
pub type Symbol = String;

/// Non-blocking control surface of the upstream feed connection.
///
/// Both operations are fire-and-forget: implementations update local
/// bookkeeping and queue a frame for the I/O task, returning immediately.
pub trait FeedCommands: Send + Sync {
    /// Request an upstream subscription for `symbol`. Idempotent.
    fn subscribe(&self, symbol: &str);

    /// Request an upstream unsubscription for `symbol`.
    fn unsubscribe(&self, symbol: &str);
}

/// Outcome of an [`SubscriptionPool::add_interest`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The symbol was already pooled; it was moved to the most-recently-used
    /// position and no upstream call was made.
    AlreadyPooled,
    /// The symbol was admitted into spare capacity and subscribed upstream.
    Admitted,
    /// The pool was full; the contained zero-viewer symbol was unsubscribed
    /// and evicted to admit the new one.
    AdmittedAfterEviction(Symbol),
    /// The pool was full and every pooled symbol still has a viewer. The
    /// interest was recorded but no upstream subscription exists for it.
    Rejected,
    /// The symbol was empty; the call was a no-op.
    Ignored,
}

/// Point-in-time pool statistics for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Symbols currently subscribed upstream.
    pub pooled: usize,
    /// Maximum upstream subscriptions.
    pub capacity: usize,
    /// Symbols with at least one active viewer.
    pub viewed: usize,
    /// Sessions holding at least one subscription.
    pub sessions: usize,
}

// =============================================================================
// Subscription Pool
// =============================================================================

/// Bounded registry mapping downstream viewer interest to upstream
/// subscriptions.
///
/// Thread-safe: membership maps are concurrent, and the pooled-set decision
/// runs under one mutex acquisition per mutating call, so two threads can
/// never both claim the last free slot.
pub struct SubscriptionPool {
    capacity: usize,
    feed: Arc<dyn FeedCommands>,
    intents: DashMap<SessionId, HashMap<SubscriptionId, Symbol>>,
    viewers: DashMap<Symbol, HashSet<SessionId>>,
    pooled: Mutex<Vec<Symbol>>,
}

impl SubscriptionPool {
    /// Create a pool bounded at `capacity` upstream subscriptions.
    #[must_use]
    pub fn new(capacity: usize, feed: Arc<dyn FeedCommands>) -> Self {
        Self {
            capacity,
            feed,
            intents: DashMap::new(),
            viewers: DashMap::new(),
            pooled: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Record one viewer subscription and ensure its symbol is subscribed
    /// upstream, evicting an unviewed symbol if the pool is full.
    ///
    /// Calling twice with different subscription ids for the same symbol and
    /// session is allowed and tracked separately. Re-using a subscription id
    /// for a new symbol releases the viewer's claim on the old one.
    pub fn add_interest(&self, session: &str, subscription: &str, symbol: &str) -> AdmitOutcome {
        if symbol.is_empty() {
            return AdmitOutcome::Ignored;
        }

        let previous = self
            .intents
            .entry(session.to_owned())
            .or_default()
            .insert(subscription.to_owned(), symbol.to_owned());

        if let Some(prev) = previous {
            if prev != symbol {
                self.drop_viewer_if_unreferenced(session, &prev);
            }
        }

        self.viewers
            .entry(symbol.to_owned())
            .or_default()
            .insert(session.to_owned());

        self.ensure_pooled(symbol)
    }

    /// Delete one subscription. The symbol loses this session as a viewer
    /// only when no other subscription of the session references it.
    ///
    /// Never unsubscribes upstream: the symbol stays pooled until evicted.
    pub fn remove_interest(&self, session: &str, subscription: &str) {
        let removed = self
            .intents
            .get_mut(session)
            .and_then(|mut subs| subs.remove(subscription));
        self.intents.remove_if(session, |_, subs| subs.is_empty());

        if let Some(symbol) = removed {
            self.drop_viewer_if_unreferenced(session, &symbol);
        }
    }

    /// Delete every subscription owned by `session` (used on disconnect).
    ///
    /// Symbols left with zero viewers remain pooled until evicted.
    pub fn remove_session(&self, session: &str) {
        let Some((_, subs)) = self.intents.remove(session) else {
            return;
        };

        let symbols: HashSet<Symbol> = subs.into_values().collect();
        for symbol in symbols {
            if let Some(mut sessions) = self.viewers.get_mut(&symbol) {
                sessions.remove(session);
            }
            self.viewers.remove_if(&symbol, |_, sessions| sessions.is_empty());
        }
    }

    /// Symbols with at least one active viewer: the set the periodic quote
    /// refresher polls. A superset relation with the pooled set is not
    /// guaranteed in either direction.
    #[must_use]
    pub fn active_tickers(&self) -> Vec<Symbol> {
        self.viewers
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Symbols currently subscribed upstream, least recently referenced
    /// first.
    #[must_use]
    pub fn pooled_symbols(&self) -> Vec<Symbol> {
        self.pooled.lock().clone()
    }

    /// The configured upstream subscription cap.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current statistics for health reporting.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pooled: self.pooled.lock().len(),
            capacity: self.capacity,
            viewed: self.viewers.len(),
            sessions: self.intents.len(),
        }
    }

    /// Admit `symbol` into the pooled set, applying the eviction policy.
    ///
    /// Single critical section per call. `FeedCommands` calls happen inside
    /// it so upstream frames are queued in decision order; they must not
    /// block.
    fn ensure_pooled(&self, symbol: &str) -> AdmitOutcome {
        let mut pooled = self.pooled.lock();

        if let Some(pos) = pooled.iter().position(|s| s == symbol) {
            let touched = pooled.remove(pos);
            pooled.push(touched);
            return AdmitOutcome::AlreadyPooled;
        }

        if pooled.len() < self.capacity {
            pooled.push(symbol.to_owned());
            self.feed.subscribe(symbol);
            return AdmitOutcome::Admitted;
        }

        // Full: scan least-recently-referenced first for a symbol nobody is
        // viewing any more.
        let victim_pos = pooled
            .iter()
            .position(|s| self.viewers.get(s).is_none_or(|v| v.is_empty()));

        match victim_pos {
            Some(pos) => {
                let victim = pooled.remove(pos);
                self.feed.unsubscribe(&victim);
                pooled.push(symbol.to_owned());
                self.feed.subscribe(symbol);
                AdmitOutcome::AdmittedAfterEviction(victim)
            }
            None => AdmitOutcome::Rejected,
        }
    }

    /// Remove `session` from `symbol`'s viewer set unless another of the
    /// session's subscriptions still references the symbol.
    fn drop_viewer_if_unreferenced(&self, session: &str, symbol: &str) {
        let still_referenced = self
            .intents
            .get(session)
            .is_some_and(|subs| subs.values().any(|s| s == symbol));
        if still_referenced {
            return;
        }

        if let Some(mut sessions) = self.viewers.get_mut(symbol) {
            sessions.remove(session);
        }
        self.viewers.remove_if(symbol, |_, sessions| sessions.is_empty());
    }
}

impl std::fmt::Debug for SubscriptionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionPool")
            .field("capacity", &self.capacity)
            .field("pooled", &self.pooled.lock().len())
            .field("viewed", &self.viewers.len())
            .field("sessions", &self.intents.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum FeedCall {
        Subscribe(String),
        Unsubscribe(String),
    }

    #[derive(Default)]
    struct RecordingFeed {
        calls: Mutex<Vec<FeedCall>>,
    }

    impl RecordingFeed {
        fn calls(&self) -> Vec<FeedCall> {
            self.calls.lock().clone()
        }

        fn subscribes_for(&self, symbol: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| **c == FeedCall::Subscribe(symbol.to_string()))
                .count()
        }
    }

    impl FeedCommands for RecordingFeed {
        fn subscribe(&self, symbol: &str) {
            self.calls.lock().push(FeedCall::Subscribe(symbol.to_string()));
        }

        fn unsubscribe(&self, symbol: &str) {
            self.calls.lock().push(FeedCall::Unsubscribe(symbol.to_string()));
        }
    }

    fn pool_with_capacity(capacity: usize) -> (SubscriptionPool, Arc<RecordingFeed>) {
        let feed = Arc::new(RecordingFeed::default());
        let pool = SubscriptionPool::new(capacity, Arc::clone(&feed) as Arc<dyn FeedCommands>);
        (pool, feed)
    }

    #[test]
    fn first_interest_subscribes_upstream() {
        let (pool, feed) = pool_with_capacity(10);

        let outcome = pool.add_interest("session-a", "sub-1", "AAPL");

        assert_eq!(outcome, AdmitOutcome::Admitted);
        assert_eq!(feed.calls(), vec![FeedCall::Subscribe("AAPL".to_string())]);
        assert_eq!(pool.pooled_symbols(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn shared_symbol_subscribes_upstream_once() {
        let (pool, feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "AAPL");
        let outcome = pool.add_interest("session-b", "sub-1", "AAPL");

        assert_eq!(outcome, AdmitOutcome::AlreadyPooled);
        assert_eq!(feed.subscribes_for("AAPL"), 1);
    }

    #[test]
    fn remove_with_remaining_viewer_keeps_subscription() {
        let (pool, feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "AAPL");
        pool.add_interest("session-b", "sub-1", "AAPL");
        pool.remove_interest("session-a", "sub-1");

        assert!(!feed.calls().contains(&FeedCall::Unsubscribe("AAPL".to_string())));
        assert_eq!(pool.active_tickers(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn last_viewer_leaving_does_not_unsubscribe() {
        let (pool, feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "AAPL");
        pool.remove_interest("session-a", "sub-1");

        // The symbol is no longer viewed but stays pooled until evicted.
        assert!(pool.active_tickers().is_empty());
        assert_eq!(pool.pooled_symbols(), vec!["AAPL".to_string()]);
        assert!(!feed.calls().contains(&FeedCall::Unsubscribe("AAPL".to_string())));
    }

    #[test]
    fn full_pool_with_all_viewed_rejects_silently() {
        let (pool, feed) = pool_with_capacity(2);

        pool.add_interest("session-a", "sub-1", "X");
        pool.add_interest("session-b", "sub-1", "Y");
        let before = feed.calls().len();

        let outcome = pool.add_interest("session-c", "sub-1", "Z");

        assert_eq!(outcome, AdmitOutcome::Rejected);
        assert_eq!(feed.calls().len(), before, "no upstream call on rejection");
        assert_eq!(pool.stats().pooled, 2);
        assert_eq!(pool.pooled_symbols(), vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn full_pool_evicts_unviewed_symbol() {
        let (pool, feed) = pool_with_capacity(2);

        pool.add_interest("session-a", "sub-1", "X");
        pool.add_interest("session-b", "sub-1", "Y");
        pool.remove_interest("session-a", "sub-1");

        // Y has a viewer, X has none; pool is still {X, Y}.
        assert_eq!(pool.pooled_symbols(), vec!["X".to_string(), "Y".to_string()]);

        let outcome = pool.add_interest("session-c", "sub-1", "Z");

        assert_eq!(outcome, AdmitOutcome::AdmittedAfterEviction("X".to_string()));
        assert!(feed.calls().contains(&FeedCall::Unsubscribe("X".to_string())));
        assert!(feed.calls().contains(&FeedCall::Subscribe("Z".to_string())));
        assert_eq!(pool.pooled_symbols(), vec!["Y".to_string(), "Z".to_string()]);
        assert_eq!(pool.stats().pooled, 2);
    }

    #[test]
    fn eviction_scans_least_recently_referenced_first() {
        let (pool, feed) = pool_with_capacity(2);

        pool.add_interest("session-a", "sub-1", "X");
        pool.add_interest("session-b", "sub-1", "Y");
        pool.remove_session("session-a");
        pool.remove_session("session-b");

        // Both unviewed; X is least recently referenced.
        pool.add_interest("session-c", "sub-1", "Z");
        assert!(feed.calls().contains(&FeedCall::Unsubscribe("X".to_string())));
        assert_eq!(pool.pooled_symbols(), vec!["Y".to_string(), "Z".to_string()]);

        pool.remove_session("session-c");
        pool.add_interest("session-d", "sub-1", "W");
        assert!(feed.calls().contains(&FeedCall::Unsubscribe("Y".to_string())));
        assert_eq!(pool.pooled_symbols(), vec!["Z".to_string(), "W".to_string()]);
    }

    #[test]
    fn touching_a_pooled_symbol_refreshes_recency() {
        let (pool, _feed) = pool_with_capacity(3);

        pool.add_interest("session-a", "sub-1", "X");
        pool.add_interest("session-a", "sub-2", "Y");
        pool.add_interest("session-b", "sub-1", "X");

        // X was re-referenced after Y, so Y is now the LRU end.
        assert_eq!(pool.pooled_symbols(), vec!["Y".to_string(), "X".to_string()]);
    }

    #[test]
    fn disconnect_removes_all_intents_but_leaves_symbols_pooled() {
        let (pool, feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "X");
        pool.add_interest("session-a", "sub-2", "Y");
        pool.add_interest("session-b", "sub-1", "Y");

        pool.remove_session("session-a");

        assert_eq!(pool.active_tickers(), vec!["Y".to_string()]);
        let mut pooled = pool.pooled_symbols();
        pooled.sort();
        assert_eq!(pooled, vec!["X".to_string(), "Y".to_string()]);
        assert!(!feed.calls().iter().any(|c| matches!(c, FeedCall::Unsubscribe(_))));
    }

    #[test]
    fn duplicate_subscription_ids_are_tracked_separately() {
        let (pool, _feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "AAPL");
        pool.add_interest("session-a", "sub-2", "AAPL");

        pool.remove_interest("session-a", "sub-1");
        assert_eq!(pool.active_tickers(), vec!["AAPL".to_string()]);

        pool.remove_interest("session-a", "sub-2");
        assert!(pool.active_tickers().is_empty());
    }

    #[test]
    fn reused_subscription_id_releases_previous_symbol() {
        let (pool, _feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "AAPL");
        pool.add_interest("session-a", "sub-1", "MSFT");

        assert_eq!(pool.active_tickers(), vec!["MSFT".to_string()]);
    }

    #[test]
    fn empty_symbol_is_ignored() {
        let (pool, feed) = pool_with_capacity(10);

        let outcome = pool.add_interest("session-a", "sub-1", "");

        assert_eq!(outcome, AdmitOutcome::Ignored);
        assert!(feed.calls().is_empty());
        assert!(pool.pooled_symbols().is_empty());
    }

    #[test]
    fn removing_unknown_interest_is_a_no_op() {
        let (pool, feed) = pool_with_capacity(10);

        pool.add_interest("session-a", "sub-1", "AAPL");
        pool.remove_interest("session-b", "sub-9");
        pool.remove_session("session-z");

        assert_eq!(pool.active_tickers(), vec!["AAPL".to_string()]);
        assert_eq!(feed.calls().len(), 1);
    }

    #[test]
    fn stats_reflect_state() {
        let (pool, _feed) = pool_with_capacity(5);

        pool.add_interest("session-a", "sub-1", "X");
        pool.add_interest("session-a", "sub-2", "Y");
        pool.add_interest("session-b", "sub-1", "X");

        let stats = pool.stats();
        assert_eq!(stats.pooled, 2);
        assert_eq!(stats.capacity, 5);
        assert_eq!(stats.viewed, 2);
        assert_eq!(stats.sessions, 2);
    }

    #[test]
    fn concurrent_adds_respect_capacity() {
        use std::thread;

        let feed = Arc::new(RecordingFeed::default());
        let pool = Arc::new(SubscriptionPool::new(
            8,
            Arc::clone(&feed) as Arc<dyn FeedCommands>,
        ));

        let mut handles = vec![];
        for i in 0..16 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                pool.add_interest(&format!("session-{i}"), "sub-1", &format!("SYM{i}"));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(pool.stats().pooled <= 8);
        // All sixteen intents were recorded even though only eight fit.
        assert_eq!(pool.stats().sessions, 16);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // For any sequence of adds the pooled set never exceeds capacity.
            #[test]
            fn pool_never_exceeds_capacity(
                ops in prop::collection::vec((0u8..8, 0u8..24), 1..200),
                capacity in 1usize..6,
            ) {
                let feed = Arc::new(RecordingFeed::default());
                let pool = SubscriptionPool::new(capacity, feed as Arc<dyn FeedCommands>);

                for (session, symbol) in ops {
                    pool.add_interest(
                        &format!("session-{session}"),
                        &format!("sub-{symbol}"),
                        &format!("SYM{symbol}"),
                    );
                    prop_assert!(pool.stats().pooled <= capacity);
                }
            }
        }
    }
}
