//! WebSocket quote source for the CLOB market data feed.
//!
//! Maintains an L2 book per subscribed token from snapshot and delta events
//! and writes the resulting top-of-book into the shared [`QuoteFeed`] on
//! every change. Disconnects reconnect with capped, jittered exponential
//! backoff; only one reconnect attempt is ever in flight.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::catalog::MarketCatalog;
use crate::error::WsError;
use crate::metrics;

use super::feed::QuoteFeed;
use super::source::{PollSource, QuoteSource};
use super::types::TopOfBook;

/// Token ids per subscription message.
const SUBSCRIBE_CHUNK: usize = 20;

/// How often the read loop checks for shutdown or a changed token set.
const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// L2 book state maintained from WebSocket updates.
#[derive(Debug, Clone, Default)]
pub struct L2BookState {
    /// Bid levels: price -> size.
    pub bids: HashMap<Decimal, Decimal>,
    /// Ask levels: price -> size.
    pub asks: HashMap<Decimal, Decimal>,
}

impl L2BookState {
    /// Apply a full book snapshot.
    pub fn apply_snapshot(&mut self, bids: Vec<WsLevel>, asks: Vec<WsLevel>) {
        self.bids.clear();
        self.asks.clear();

        for level in bids {
            if let (Some(price), Some(size)) = (level.price_decimal(), level.size_decimal()) {
                if size > Decimal::ZERO {
                    self.bids.insert(price, size);
                }
            }
        }

        for level in asks {
            if let (Some(price), Some(size)) = (level.price_decimal(), level.size_decimal()) {
                if size > Decimal::ZERO {
                    self.asks.insert(price, size);
                }
            }
        }
    }

    /// Apply a price change delta.
    pub fn apply_delta(&mut self, change: &WsPriceChange) {
        let price = match change.price.parse::<Decimal>() {
            Ok(p) => p,
            Err(_) => return,
        };
        let size = match change.size.parse::<Decimal>() {
            Ok(s) => s,
            Err(_) => return,
        };

        let book = match change.side.to_uppercase().as_str() {
            "BUY" => &mut self.bids,
            "SELL" => &mut self.asks,
            _ => return,
        };

        if size <= Decimal::ZERO {
            book.remove(&price);
        } else {
            book.insert(price, size);
        }
    }

    /// Reduce the book to a top-of-book observation taken now.
    pub fn to_top_of_book(&self) -> TopOfBook {
        let best_ask = self
            .asks
            .iter()
            .filter(|(_, &size)| size > Decimal::ZERO)
            .min_by_key(|(&price, _)| price)
            .map(|(&price, &size)| (price, size));
        let best_bid = self
            .bids
            .iter()
            .filter(|(_, &size)| size > Decimal::ZERO)
            .max_by_key(|(&price, _)| price)
            .map(|(&price, &size)| (price, size));

        TopOfBook {
            best_ask: best_ask.map(|(p, _)| p),
            ask_size: best_ask.map(|(_, s)| s).unwrap_or(Decimal::ZERO),
            best_bid: best_bid.map(|(p, _)| p),
            bid_size: best_bid.map(|(_, s)| s).unwrap_or(Decimal::ZERO),
            observed_at: Instant::now(),
        }
    }
}

/// Price level from WebSocket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsLevel {
    /// Price as string.
    pub price: String,
    /// Size as string.
    pub size: String,
}

impl WsLevel {
    /// Parse price to Decimal.
    pub fn price_decimal(&self) -> Option<Decimal> {
        self.price.parse().ok()
    }

    /// Parse size to Decimal.
    pub fn size_decimal(&self) -> Option<Decimal> {
        self.size.parse().ok()
    }
}

/// Price change from WebSocket.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChange {
    /// Asset ID.
    pub asset_id: Option<String>,
    /// Price as string.
    pub price: String,
    /// Size as string.
    pub size: String,
    /// Side: "BUY" or "SELL".
    pub side: String,
}

/// WebSocket event from the market feed.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
    /// Event type: "book" or "price_change".
    pub event_type: Option<String>,
    /// Asset ID (for book events).
    pub asset_id: Option<String>,
    /// Bid levels (for book events).
    pub bids: Option<Vec<WsLevel>>,
    /// Ask levels (for book events).
    pub asks: Option<Vec<WsLevel>>,
    /// Price changes (for price_change events).
    pub price_changes: Option<Vec<WsPriceChange>>,
}

/// WebSocket subscription message.
#[derive(Debug, Serialize)]
struct SubscribeMessage {
    /// Message type.
    #[serde(rename = "type")]
    msg_type: String,
    /// Asset IDs to subscribe to.
    assets_ids: Vec<String>,
}

/// Reconnection configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Next delay: capped exponential backoff plus up to 25% jitter.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = (self.max_delay_s * 1000) as f64;
        let base_ms = delay_ms.min(max_delay_ms);
        let jitter_ms = rand::thread_rng().gen_range(0.0..=base_ms * 0.25);
        Duration::from_millis((base_ms + jitter_ms) as u64)
    }
}

/// WebSocket quote source.
pub struct StreamSource {
    books: DashMap<String, L2BookState>,
    feed: Arc<QuoteFeed>,
    ws_url: String,
    reconnect: ReconnectConfig,
    fallback: Option<Arc<PollSource>>,
    connected: AtomicBool,
    reconnect_count: AtomicU64,
}

impl StreamSource {
    /// Create a streaming source.
    pub fn new(ws_url: String, feed: Arc<QuoteFeed>, reconnect: ReconnectConfig) -> Self {
        Self {
            books: DashMap::new(),
            feed,
            ws_url,
            reconnect,
            fallback: None,
            connected: AtomicBool::new(false),
            reconnect_count: AtomicU64::new(0),
        }
    }

    /// Attach a REST source that covers the feed while the socket is down.
    pub fn with_fallback(mut self, poll: Arc<PollSource>) -> Self {
        self.fallback = Some(poll);
        self
    }

    /// Whether a connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Lifetime reconnect count.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::SeqCst)
    }

    /// Apply one raw message, updating books and the feed.
    fn process_message(&self, text: &str) {
        // Messages can be single objects or arrays.
        let events: Vec<WsEvent> = if text.trim_start().starts_with('[') {
            match serde_json::from_str(text) {
                Ok(events) => events,
                Err(_) => return,
            }
        } else {
            match serde_json::from_str(text) {
                Ok(event) => vec![event],
                Err(_) => return,
            }
        };

        for event in events {
            let Some(event_type) = event.event_type.as_deref() else {
                continue;
            };

            match event_type {
                "book" => {
                    let Some(asset_id) = event.asset_id.as_ref() else {
                        continue;
                    };
                    let mut book = self.books.entry(asset_id.clone()).or_default();
                    book.apply_snapshot(
                        event.bids.unwrap_or_default(),
                        event.asks.unwrap_or_default(),
                    );
                    self.feed.record(asset_id, book.to_top_of_book());
                }
                "price_change" => {
                    for change in event.price_changes.iter().flatten() {
                        let Some(asset_id) = change.asset_id.as_ref() else {
                            continue;
                        };
                        if let Some(mut book) = self.books.get_mut(asset_id) {
                            book.apply_delta(change);
                            self.feed.record(asset_id, book.to_top_of_book());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Drop book state for tokens the catalog no longer carries.
    fn retain_books(&self, tokens: &[String]) {
        let live: HashSet<&String> = tokens.iter().collect();
        self.books.retain(|token_id, _| live.contains(token_id));
    }

    /// Wait out a reconnect delay. With a fallback attached, the wait polls
    /// books over REST so quotes keep flowing while the socket is down.
    async fn back_off(
        &self,
        delay: Duration,
        catalog: &MarketCatalog,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let Some(fallback) = &self.fallback else {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
            return;
        };

        let deadline = tokio::time::Instant::now() + delay;
        let mut ticker = tokio::time::interval(fallback.poll_interval());
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = ticker.tick() => {
                    let tokens = catalog.token_ids().await;
                    for token_id in &tokens {
                        if *shutdown.borrow() {
                            return;
                        }
                        fallback.poll_token(token_id).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Run one connection until it drops, shutdown fires, or the token set
    /// changes. Returns Ok(true) when the caller should resubscribe with a
    /// fresh token set rather than back off.
    async fn run_once(
        &self,
        tokens: &[String],
        catalog: &MarketCatalog,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, WsError> {
        let url = format!("{}/ws/market", self.ws_url.trim_end_matches('/'));
        info!(url = %url, tokens = tokens.len(), "connecting to market feed");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        self.connected.store(true, Ordering::SeqCst);
        let (mut write, mut read) = ws_stream.split();

        for chunk in tokens.chunks(SUBSCRIBE_CHUNK) {
            let subscribe = SubscribeMessage {
                msg_type: "MARKET".to_string(),
                assets_ids: chunk.to_vec(),
            };
            let msg_json =
                serde_json::to_string(&subscribe).map_err(|e| WsError::SendFailed(e.to_string()))?;
            write
                .send(Message::Text(msg_json))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }
        info!(tokens = tokens.len(), "subscribed to market feed");

        let subscribed: HashSet<&String> = tokens.iter().collect();
        let mut watch_tick = tokio::time::interval(WATCH_INTERVAL);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            metrics::inc_ws_messages_received();
                            self.process_message(&text);
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            debug!("heartbeat");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!(frame = ?frame, "market feed closed");
                            self.connected.store(false, Ordering::SeqCst);
                            return Ok(false);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "market feed error");
                            self.connected.store(false, Ordering::SeqCst);
                            return Ok(false);
                        }
                        None => {
                            warn!("market feed stream ended");
                            self.connected.store(false, Ordering::SeqCst);
                            return Ok(false);
                        }
                    }
                }
                _ = watch_tick.tick() => {
                    let current = catalog.token_ids().await;
                    let changed = current.len() != subscribed.len()
                        || current.iter().any(|t| !subscribed.contains(t));
                    if changed {
                        info!("catalog token set changed, resubscribing");
                        self.connected.store(false, Ordering::SeqCst);
                        return Ok(true);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.connected.store(false, Ordering::SeqCst);
                        return Ok(false);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl QuoteSource for StreamSource {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn run(&self, catalog: Arc<MarketCatalog>, mut shutdown: watch::Receiver<bool>) {
        let mut attempt = 0u32;

        loop {
            if *shutdown.borrow() {
                info!("stream source stopping");
                return;
            }

            let tokens = catalog.token_ids().await;
            if tokens.is_empty() {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            self.retain_books(&tokens);

            match self.run_once(&tokens, &catalog, &mut shutdown).await {
                Ok(true) => {
                    // Token set changed, reconnect immediately.
                    attempt = 0;
                    continue;
                }
                Ok(false) => {
                    if *shutdown.borrow() {
                        info!("stream source stopping");
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, attempt, "market feed connection failed");
                }
            }

            let delay = self.reconnect.next_delay(attempt);
            self.reconnect_count.fetch_add(1, Ordering::SeqCst);
            metrics::inc_ws_reconnects();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
            self.back_off(delay, &catalog, &mut shutdown).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
