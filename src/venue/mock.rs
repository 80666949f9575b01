//! Scripted in-memory venue for tests and dry runs.
//!
//! Orders fill at their requested size unless a scripted response is queued
//! for the token. Every submission and merge is recorded so tests can assert
//! on exactly what reached the venue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::VenueError;
use crate::quotes::TopOfBook;

use super::{MarketDataSource, OrderIntent, OrderResult, OrderVenue, Settler};

/// One queued response for a token's next order.
#[derive(Debug, Clone)]
enum Scripted {
    /// Fill, optionally at a size or price different from the requested ones.
    Fill {
        size: Option<Decimal>,
        price: Option<Decimal>,
    },
    /// FOK miss or venue rejection reported in-band.
    Unfilled { reason: String },
    /// HTTP 429 from the venue.
    RateLimited { retry_after_seconds: u64 },
    /// Credentials rejected.
    AuthFailure { message: String },
}

/// In-memory venue with scripted books, order outcomes, and merges.
pub struct MockVenue {
    books: Mutex<HashMap<String, TopOfBook>>,
    scripted: Mutex<HashMap<String, VecDeque<Scripted>>>,
    submitted: Mutex<Vec<OrderIntent>>,
    batch_failure: Mutex<Option<String>>,
    merge_failure: Mutex<Option<String>>,
    merges: Mutex<Vec<(String, Decimal)>>,
    batch_capable: AtomicBool,
}

impl MockVenue {
    /// A venue with batch support, no books, and fill-everything behavior.
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            batch_failure: Mutex::new(None),
            merge_failure: Mutex::new(None),
            merges: Mutex::new(Vec::new()),
            batch_capable: AtomicBool::new(true),
        }
    }

    /// Install a top-of-book observation for a token.
    pub fn set_book(
        &self,
        token_id: &str,
        best_ask: Decimal,
        ask_size: Decimal,
        best_bid: Decimal,
        bid_size: Decimal,
    ) {
        let top = TopOfBook {
            best_ask: Some(best_ask),
            ask_size,
            best_bid: Some(best_bid),
            bid_size,
            observed_at: Instant::now(),
        };
        self.lock(&self.books).insert(token_id.to_string(), top);
    }

    /// Remove a token's book so lookups fail.
    pub fn clear_book(&self, token_id: &str) {
        self.lock(&self.books).remove(token_id);
    }

    /// Toggle whether batch submission is advertised.
    pub fn set_batch_capable(&self, capable: bool) {
        self.batch_capable.store(capable, Ordering::SeqCst);
    }

    /// Queue a fill at a specific size for the token's next order.
    pub fn script_fill(&self, token_id: &str, size: Decimal) {
        self.push_scripted(
            token_id,
            Scripted::Fill {
                size: Some(size),
                price: None,
            },
        );
    }

    /// Queue a fill at a specific price and size for the token's next order.
    pub fn script_fill_at(&self, token_id: &str, price: Decimal, size: Decimal) {
        self.push_scripted(
            token_id,
            Scripted::Fill {
                size: Some(size),
                price: Some(price),
            },
        );
    }

    /// Queue an unfilled result for the token's next order.
    pub fn script_unfilled(&self, token_id: &str, reason: &str) {
        self.push_scripted(
            token_id,
            Scripted::Unfilled {
                reason: reason.to_string(),
            },
        );
    }

    /// Queue a 429 for the token's next order.
    pub fn script_rate_limited(&self, token_id: &str, retry_after_seconds: u64) {
        self.push_scripted(token_id, Scripted::RateLimited { retry_after_seconds });
    }

    /// Queue an authentication failure for the token's next order.
    pub fn script_auth_failure(&self, token_id: &str, message: &str) {
        self.push_scripted(
            token_id,
            Scripted::AuthFailure {
                message: message.to_string(),
            },
        );
    }

    /// Make the next batch call fail before any order is placed.
    pub fn fail_next_batch(&self, reason: &str) {
        *self.lock(&self.batch_failure) = Some(reason.to_string());
    }

    /// Make every merge call fail with the given reason.
    pub fn fail_merges(&self, reason: &str) {
        *self.lock(&self.merge_failure) = Some(reason.to_string());
    }

    /// Every order that reached the venue, in submission order.
    pub fn submitted_orders(&self) -> Vec<OrderIntent> {
        self.lock(&self.submitted).clone()
    }

    /// Orders submitted for one token, in submission order.
    pub fn orders_for(&self, token_id: &str) -> Vec<OrderIntent> {
        self.lock(&self.submitted)
            .iter()
            .filter(|o| o.token_id == token_id)
            .cloned()
            .collect()
    }

    /// Every merge that reached the settler, as (market_id, size).
    pub fn merge_calls(&self) -> Vec<(String, Decimal)> {
        self.lock(&self.merges).clone()
    }

    fn push_scripted(&self, token_id: &str, response: Scripted) {
        self.lock(&self.scripted)
            .entry(token_id.to_string())
            .or_default()
            .push_back(response);
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, intent: &OrderIntent) -> Result<OrderResult, VenueError> {
        self.lock(&self.submitted).push(intent.clone());

        let scripted = self
            .lock(&self.scripted)
            .get_mut(&intent.token_id)
            .and_then(VecDeque::pop_front);

        match scripted {
            None => Ok(OrderResult {
                filled: true,
                fill_price: Some(intent.price),
                fill_size: intent.size,
                order_id: Some(format!("mock-{}", self.lock(&self.submitted).len())),
                reason: None,
            }),
            Some(Scripted::Fill { size, price }) => Ok(OrderResult {
                filled: true,
                fill_price: Some(price.unwrap_or(intent.price)),
                fill_size: size.unwrap_or(intent.size),
                order_id: Some(format!("mock-{}", self.lock(&self.submitted).len())),
                reason: None,
            }),
            Some(Scripted::Unfilled { reason }) => Ok(OrderResult::unfilled(reason)),
            Some(Scripted::RateLimited {
                retry_after_seconds,
            }) => Err(VenueError::RateLimited {
                retry_after_seconds,
            }),
            Some(Scripted::AuthFailure { message }) => Err(VenueError::Auth(message)),
        }
    }
}

impl Default for MockVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for MockVenue {
    async fn top_of_book(&self, token_id: &str) -> Result<TopOfBook, VenueError> {
        self.lock(&self.books)
            .get(token_id)
            .copied()
            .ok_or_else(|| VenueError::BadResponse(format!("no book for token {token_id}")))
    }
}

#[async_trait]
impl OrderVenue for MockVenue {
    fn supports_batch(&self) -> bool {
        self.batch_capable.load(Ordering::SeqCst)
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult, VenueError> {
        self.resolve(intent)
    }

    async fn submit_batch(&self, intents: &[OrderIntent]) -> Result<Vec<OrderResult>, VenueError> {
        if let Some(reason) = self.lock(&self.batch_failure).take() {
            return Err(VenueError::BadResponse(reason));
        }
        intents.iter().map(|intent| self.resolve(intent)).collect()
    }
}

#[async_trait]
impl Settler for MockVenue {
    async fn merge_tokens(&self, market_id: &str, size: Decimal) -> Result<String, VenueError> {
        self.lock(&self.merges).push((market_id.to_string(), size));
        if let Some(reason) = self.lock(&self.merge_failure).clone() {
            return Err(VenueError::BadResponse(reason));
        }
        Ok(format!("0xmock{:03}", self.lock(&self.merges).len()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::venue::{OrderSide, TimeInForce};

    fn buy(token: &str, size: Decimal) -> OrderIntent {
        OrderIntent {
            token_id: token.to_string(),
            side: OrderSide::Buy,
            price: dec!(0.50),
            size,
            tif: TimeInForce::Fok,
        }
    }

    #[tokio::test]
    async fn unscripted_order_fills_at_requested_size() {
        let venue = MockVenue::new();
        let result = venue.submit_order(&buy("tok", dec!(10))).await.unwrap();
        assert!(result.filled);
        assert_eq!(result.fill_size, dec!(10));
        assert_eq!(venue.submitted_orders().len(), 1);
    }

    #[tokio::test]
    async fn scripted_responses_apply_in_order() {
        let venue = MockVenue::new();
        venue.script_unfilled("tok", "fok miss");
        venue.script_fill("tok", dec!(7));

        let first = venue.submit_order(&buy("tok", dec!(10))).await.unwrap();
        assert!(!first.filled);
        assert_eq!(first.reason.as_deref(), Some("fok miss"));

        let second = venue.submit_order(&buy("tok", dec!(10))).await.unwrap();
        assert!(second.filled);
        assert_eq!(second.fill_size, dec!(7));
    }

    #[tokio::test]
    async fn batch_failure_consumes_no_orders() {
        let venue = MockVenue::new();
        venue.fail_next_batch("gateway timeout");

        let intents = vec![buy("a", dec!(5)), buy("b", dec!(5))];
        let err = venue.submit_batch(&intents).await.unwrap_err();
        assert!(matches!(err, VenueError::BadResponse(_)));
        assert!(venue.submitted_orders().is_empty());

        // The failure is one-shot.
        let results = venue.submit_batch(&intents).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.filled));
    }

    #[tokio::test]
    async fn merges_are_recorded() {
        let venue = MockVenue::new();
        let tx = venue.merge_tokens("mkt-1", dec!(10)).await.unwrap();
        assert!(tx.starts_with("0xmock"));
        assert_eq!(venue.merge_calls(), vec![("mkt-1".to_string(), dec!(10))]);
    }

    #[tokio::test]
    async fn missing_book_is_an_error() {
        let venue = MockVenue::new();
        assert!(venue.top_of_book("nope").await.is_err());

        venue.set_book("tok", dec!(0.48), dec!(100), dec!(0.46), dec!(50));
        let top = venue.top_of_book("tok").await.unwrap();
        assert_eq!(top.best_ask, Some(dec!(0.48)));
        assert_eq!(top.bid_size, dec!(50));
    }
}
