//! Finnhub WebSocket Client
//!
//! Owns the single live connection to the Finnhub trade stream and
//! reconciles desired subscriptions with actual upstream state.
//!
//! # Connection Lifecycle
//!
//! Authentication is a token query parameter on the connection URL; there
//! is no handshake. On every successful connect the client sends a
//! subscribe frame for each pending and each previously-active symbol (the
//! provider forgets subscriptions across connections), then processes
//! inbound frames until the connection drops. Drops are non-fatal: the
//! client backs off exponentially and reconnects, keeping its subscription
//! bookkeeping intact so resubscription is automatic.
//!
//! # Control Surface
//!
//! [`FeedHandle`] is the cheap, cloneable control surface handed to the
//! subscription pool. Its `subscribe`/`unsubscribe` calls update local
//! bookkeeping under a mutex and queue a command to the I/O task over an
//! unbounded channel, so they never block and are safe to invoke while
//! holding the pool's critical section.
//!
//! Without credentials the composition root never spawns [`FinnhubClient::run`];
//! the handle still accepts calls and accumulates pending symbols, making
//! the whole component a warning-level no-op rather than a crash.

pub mod messages;
pub mod reconnect;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use self::messages::{ControlRequest, FeedMessage, TradeEntry};
use self::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::pool::FeedCommands;
use crate::infrastructure::metrics;

/// Production WebSocket endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://ws.finnhub.io";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket error (handshake or transport).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An outbound frame could not be sent.
    #[error("failed to send frame: {0}")]
    Send(String),

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Feed Events
// =============================================================================

/// Events emitted by the feed client toward the relay.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connected to the stream (subscriptions already flushed).
    Connected,
    /// Connection lost; a reconnect will follow.
    Disconnected,
    /// Reconnecting to the stream.
    Reconnecting {
        /// Reconnection attempt number, starting at 1.
        attempt: u32,
    },
    /// One parsed trade entry.
    Trade(TradeEntry),
}

// =============================================================================
// Feed Status
// =============================================================================

/// Shared connection status for health reporting.
///
/// Written by the relay's event loop, read by the health endpoint.
#[derive(Debug, Default)]
pub struct FeedStatus {
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
}

impl FeedStatus {
    /// Create a status handle in the disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the feed connected or disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Whether the feed is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Record the current reconnect attempt number (0 resets).
    pub fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    /// Reconnect attempts since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Count one inbound data message.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Total inbound data messages since startup.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Complete WebSocket URL, credentials included.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl FeedConfig {
    /// Create a configuration from an explicit URL.
    #[must_use]
    pub const fn new(url: String, reconnect: ReconnectConfig) -> Self {
        Self { url, reconnect }
    }

    /// Create a configuration for the production endpoint, authenticating
    /// with `token` in the connection URL.
    #[must_use]
    pub fn with_token(token: &str, reconnect: ReconnectConfig) -> Self {
        Self::new(format!("{DEFAULT_STREAM_URL}?token={token}"), reconnect)
    }
}

// =============================================================================
// Subscription Bookkeeping
// =============================================================================

/// Commands queued from the handle to the I/O task.
#[derive(Debug)]
enum FeedCommand {
    Subscribe(String),
    Unsubscribe(String),
}

/// Symbols we want subscribed upstream.
///
/// `active` symbols have had a subscribe frame sent on the current
/// connection; `pending` symbols are waiting for one. Both survive
/// reconnects, so resubscription on the next connect is automatic.
#[derive(Debug, Default)]
struct SubscriptionBook {
    active: HashSet<String>,
    pending: HashSet<String>,
}

/// Cloneable control surface of the feed connection.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    book: Arc<Mutex<SubscriptionBook>>,
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
}

impl FeedHandle {
    /// Symbols with a subscribe frame sent on the current connection.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<String> {
        self.book.lock().active.iter().cloned().collect()
    }

    /// Symbols waiting for the next successful connect.
    #[must_use]
    pub fn pending_symbols(&self) -> Vec<String> {
        self.book.lock().pending.iter().cloned().collect()
    }
}

impl FeedCommands for FeedHandle {
    fn subscribe(&self, symbol: &str) {
        {
            let mut book = self.book.lock();
            if book.active.contains(symbol) || book.pending.contains(symbol) {
                return;
            }
            book.pending.insert(symbol.to_owned());
        }
        let _ = self.cmd_tx.send(FeedCommand::Subscribe(symbol.to_owned()));
    }

    fn unsubscribe(&self, symbol: &str) {
        let was_tracked = {
            let mut book = self.book.lock();
            let active = book.active.remove(symbol);
            let pending = book.pending.remove(symbol);
            active || pending
        };
        if was_tracked {
            let _ = self.cmd_tx.send(FeedCommand::Unsubscribe(symbol.to_owned()));
        }
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// The single upstream WebSocket connection.
///
/// Manages the connection lifecycle: connect, flush subscriptions, process
/// inbound frames, and reconnect with exponential backoff on any failure.
pub struct FinnhubClient {
    config: FeedConfig,
    book: Arc<Mutex<SubscriptionBook>>,
    cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl FinnhubClient {
    /// Create a client and its control handle.
    #[must_use]
    pub fn new(
        config: FeedConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> (Self, FeedHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let book = Arc::new(Mutex::new(SubscriptionBook::default()));

        let handle = FeedHandle {
            book: Arc::clone(&book),
            cmd_tx,
        };
        let client = Self {
            config,
            book,
            cmd_rx,
            event_tx,
            cancel,
        };

        (client, handle)
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only when a configured reconnect-attempt ceiling is
    /// exhausted; every other failure is retried.
    pub async fn run(mut self) -> Result<(), FeedError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    tracing::info!("Feed connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    let Some(delay) = policy.next_delay() else {
                        return Err(FeedError::MaxReconnectAttemptsExceeded);
                    };

                    let attempt = policy.attempt_count();
                    tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting to feed");
                    metrics::record_feed_reconnect();
                    let _ = self.event_tx.send(FeedEvent::Reconnecting { attempt }).await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, flush subscriptions, and process frames until an error or
    /// cancellation.
    async fn connect_and_run(&mut self, policy: &mut ReconnectPolicy) -> Result<(), FeedError> {
        tracing::info!("Connecting to upstream feed");

        let (ws_stream, _response) =
            tokio_tungstenite::connect_async(self.config.url.as_str()).await?;

        // Connected: the backoff sequence starts over on the next drop.
        policy.reset();
        let _ = self.event_tx.send(FeedEvent::Connected).await;

        let (mut write, mut read) = ws_stream.split();

        self.flush_subscriptions(&mut write).await?;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(());
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.apply_command(&mut write, cmd).await?,
                        // All handles dropped; nothing left to control the feed.
                        None => return Ok(()),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(FeedError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore other frame types
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Send subscribe frames for every pending and previously-active symbol.
    ///
    /// The snapshot is taken under the book lock but frames are sent outside
    /// it; symbols are promoted to active afterwards only if still pending,
    /// so an unsubscribe racing the flush is not resurrected.
    async fn flush_subscriptions<W>(&self, write: &mut W) -> Result<(), FeedError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let snapshot: Vec<String> = {
            let book = self.book.lock();
            book.pending.union(&book.active).cloned().collect()
        };

        if snapshot.is_empty() {
            return Ok(());
        }

        tracing::info!(count = snapshot.len(), "Restoring upstream subscriptions");
        for symbol in &snapshot {
            self.send_control(write, &ControlRequest::subscribe(symbol)).await?;
        }

        let mut book = self.book.lock();
        for symbol in snapshot {
            if book.pending.remove(&symbol) {
                book.active.insert(symbol);
            }
        }

        Ok(())
    }

    /// Apply one queued control command to the live connection.
    async fn apply_command<W>(&self, write: &mut W, cmd: FeedCommand) -> Result<(), FeedError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        match cmd {
            FeedCommand::Subscribe(symbol) => {
                // Skip if the symbol was unsubscribed before we got here, or
                // already covered by a connect-time flush.
                let pending = self.book.lock().pending.contains(&symbol);
                if !pending {
                    return Ok(());
                }

                self.send_control(write, &ControlRequest::subscribe(&symbol)).await?;

                let mut book = self.book.lock();
                if book.pending.remove(&symbol) {
                    book.active.insert(symbol);
                }
            }
            FeedCommand::Unsubscribe(symbol) => {
                // Bookkeeping was already cleaned by the handle.
                self.send_control(write, &ControlRequest::unsubscribe(&symbol)).await?;
            }
        }
        Ok(())
    }

    /// Serialize and send one control frame.
    async fn send_control<W>(&self, write: &mut W, request: &ControlRequest) -> Result<(), FeedError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        match request.to_json() {
            Ok(json) => {
                tracing::debug!(symbol = %request.symbol, action = ?request.action, "Sending control frame");
                write
                    .send(Message::Text(json.into()))
                    .await
                    .map_err(|e| FeedError::Send(e.to_string()))?;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize control frame");
            }
        }
        Ok(())
    }

    /// Decode one inbound text frame and forward its trade entries.
    ///
    /// Parse failures are logged and the frame is dropped; they never tear
    /// the connection down.
    async fn handle_frame(&self, text: &str) {
        match messages::decode(text) {
            Ok(FeedMessage::Trades(entries)) => {
                if entries.is_empty() {
                    return;
                }
                for entry in entries {
                    if entry.symbol.is_empty() {
                        tracing::debug!("Skipping trade entry with empty symbol");
                        continue;
                    }
                    metrics::record_tick_received();
                    let _ = self.event_tx.send(FeedEvent::Trade(entry)).await;
                }
            }
            Ok(FeedMessage::Ping) => {
                tracing::trace!("Feed keepalive");
            }
            Ok(FeedMessage::Other(kind)) => {
                tracing::trace!(kind, "Ignoring unhandled message type");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed feed frame");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (FeedHandle, mpsc::UnboundedReceiver<FeedCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = FeedHandle {
            book: Arc::new(Mutex::new(SubscriptionBook::default())),
            cmd_tx,
        };
        (handle, cmd_rx)
    }

    #[test]
    fn subscribe_is_idempotent_per_symbol() {
        let (handle, mut cmd_rx) = handle();

        handle.subscribe("AAPL");
        handle.subscribe("AAPL");

        assert_eq!(handle.pending_symbols(), vec!["AAPL".to_string()]);
        assert!(matches!(cmd_rx.try_recv(), Ok(FeedCommand::Subscribe(s)) if s == "AAPL"));
        assert!(cmd_rx.try_recv().is_err(), "duplicate subscribe queued no command");
    }

    #[test]
    fn unsubscribe_clears_pending_and_active() {
        let (handle, mut cmd_rx) = handle();

        handle.subscribe("AAPL");
        handle.book.lock().active.insert("MSFT".to_string());

        handle.unsubscribe("AAPL");
        handle.unsubscribe("MSFT");

        assert!(handle.pending_symbols().is_empty());
        assert!(handle.active_symbols().is_empty());

        let _ = cmd_rx.try_recv(); // the subscribe
        assert!(matches!(cmd_rx.try_recv(), Ok(FeedCommand::Unsubscribe(s)) if s == "AAPL"));
        assert!(matches!(cmd_rx.try_recv(), Ok(FeedCommand::Unsubscribe(s)) if s == "MSFT"));
    }

    #[test]
    fn unsubscribe_of_untracked_symbol_queues_nothing() {
        let (handle, mut cmd_rx) = handle();

        handle.unsubscribe("AAPL");

        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn bookkeeping_accumulates_while_disconnected() {
        // Without a running I/O task the handle is a no-op that still
        // remembers what to subscribe on a future connect.
        let (handle, _cmd_rx) = handle();

        handle.subscribe("AAPL");
        handle.subscribe("MSFT");

        let mut pending = handle.pending_symbols();
        pending.sort();
        assert_eq!(pending, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn with_token_builds_authenticated_url() {
        let config = FeedConfig::with_token("secret-token", ReconnectConfig::default());
        assert_eq!(config.url, "wss://ws.finnhub.io?token=secret-token");
    }
}
