//! Subscription Pool Integration Tests
//!
//! Drives the pool through the session event bridge the way the downstream
//! protocol does, asserting the capacity, eviction, and upstream-call
//! behavior end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use parking_lot::Mutex;

use finnhub_stream_relay::{
    AdmitOutcome, FeedCommands, SessionEvent, SessionEventBridge, SubscriptionPool,
};

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
}

impl FeedCommands for RecordingFeed {
    fn subscribe(&self, symbol: &str) {
        self.calls.lock().push(FeedCall::Subscribe(symbol.to_string()));
    }

    fn unsubscribe(&self, symbol: &str) {
        self.calls.lock().push(FeedCall::Unsubscribe(symbol.to_string()));
    }
}

fn setup(capacity: usize) -> (SessionEventBridge, Arc<SubscriptionPool>, Arc<RecordingFeed>) {
    let feed = Arc::new(RecordingFeed::default());
    let pool = Arc::new(SubscriptionPool::new(
        capacity,
        Arc::clone(&feed) as Arc<dyn FeedCommands>,
    ));
    let bridge = SessionEventBridge::new(Arc::clone(&pool), "/topic/prices.".to_string());
    (bridge, pool, feed)
}

fn subscribe(bridge: &SessionEventBridge, session: &str, subscription: &str, symbol: &str) {
    bridge.handle(SessionEvent::Subscribe {
        session_id: session.to_string(),
        subscription_id: subscription.to_string(),
        destination: format!("/topic/prices.{symbol}"),
    });
}

#[test]
fn capacity_two_eviction_scenario() {
    // Pool capacity = 2; A views X, B views Y; A leaves X; C subscribes Z.
    // Expect: unsubscribe(X), subscribe(Z), pool = {Y, Z}.
    let (bridge, pool, feed) = setup(2);

    subscribe(&bridge, "session-a", "sub-1", "X");
    subscribe(&bridge, "session-b", "sub-1", "Y");

    bridge.handle(SessionEvent::Unsubscribe {
        session_id: "session-a".to_string(),
        subscription_id: "sub-1".to_string(),
    });
    // No viewer on X, but it stays pooled.
    assert_eq!(pool.pooled_symbols(), vec!["X".to_string(), "Y".to_string()]);

    subscribe(&bridge, "session-c", "sub-1", "Z");

    assert_eq!(
        feed.calls(),
        vec![
            FeedCall::Subscribe("X".to_string()),
            FeedCall::Subscribe("Y".to_string()),
            FeedCall::Unsubscribe("X".to_string()),
            FeedCall::Subscribe("Z".to_string()),
        ]
    );
    assert_eq!(pool.pooled_symbols(), vec!["Y".to_string(), "Z".to_string()]);
}

#[test]
fn full_pool_of_viewed_symbols_rejects_newcomers() {
    let (bridge, pool, feed) = setup(2);

    subscribe(&bridge, "session-a", "sub-1", "X");
    subscribe(&bridge, "session-b", "sub-1", "Y");
    let calls_before = feed.calls().len();

    subscribe(&bridge, "session-c", "sub-1", "Z");

    assert_eq!(feed.calls().len(), calls_before);
    assert_eq!(pool.stats().pooled, 2);
    // The viewer's interest is still tracked for when capacity frees up.
    let mut active = pool.active_tickers();
    active.sort();
    assert_eq!(active, vec!["X".to_string(), "Y".to_string(), "Z".to_string()]);
}

#[test]
fn disconnect_then_new_symbol_reclaims_the_slot() {
    let (bridge, pool, feed) = setup(2);

    subscribe(&bridge, "session-a", "sub-1", "X");
    subscribe(&bridge, "session-a", "sub-2", "Y");

    bridge.handle(SessionEvent::Disconnect {
        session_id: "session-a".to_string(),
    });
    // Disconnect never unsubscribes by itself.
    assert_eq!(pool.stats().pooled, 2);
    assert!(pool.active_tickers().is_empty());

    subscribe(&bridge, "session-b", "sub-1", "Z");

    assert!(feed.calls().contains(&FeedCall::Unsubscribe("X".to_string())));
    assert_eq!(pool.pooled_symbols(), vec!["Y".to_string(), "Z".to_string()]);
}

#[test]
fn two_sessions_one_upstream_subscribe() {
    let (bridge, pool, feed) = setup(10);

    subscribe(&bridge, "session-a", "sub-1", "AAPL");
    subscribe(&bridge, "session-b", "sub-7", "AAPL");

    let subscribes = feed
        .calls()
        .iter()
        .filter(|c| matches!(c, FeedCall::Subscribe(s) if s == "AAPL"))
        .count();
    assert_eq!(subscribes, 1);
    assert_eq!(pool.stats().pooled, 1);

    // One session leaving must not unsubscribe the other's symbol.
    bridge.handle(SessionEvent::Disconnect {
        session_id: "session-a".to_string(),
    });
    assert!(!feed.calls().contains(&FeedCall::Unsubscribe("AAPL".to_string())));
    assert_eq!(pool.active_tickers(), vec!["AAPL".to_string()]);
}

#[test]
fn direct_add_interest_reports_outcomes() {
    let (_bridge, pool, _feed) = setup(1);

    assert_eq!(pool.add_interest("s1", "sub-1", "X"), AdmitOutcome::Admitted);
    assert_eq!(pool.add_interest("s2", "sub-1", "X"), AdmitOutcome::AlreadyPooled);
    assert_eq!(pool.add_interest("s3", "sub-1", "Y"), AdmitOutcome::Rejected);

    pool.remove_session("s1");
    pool.remove_session("s2");
    assert_eq!(
        pool.add_interest("s3", "sub-2", "Y"),
        AdmitOutcome::AdmittedAfterEviction("X".to_string())
    );
}
