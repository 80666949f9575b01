//! Quote acquisition behind one capability interface.
//!
//! The engine does not care whether quotes arrive by REST polling or by
//! websocket push; either source runs in the background and writes
//! observations into the shared [`QuoteFeed`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::catalog::MarketCatalog;
use crate::limiter::RateBudget;
use crate::venue::MarketDataSource;

use super::feed::QuoteFeed;

/// A background source of top-of-book observations.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short name for logs and status output.
    fn name(&self) -> &'static str;

    /// Run until `shutdown` flips to true, writing observations into the feed.
    async fn run(&self, catalog: Arc<MarketCatalog>, shutdown: watch::Receiver<bool>);
}

/// REST polling source.
///
/// Every tick it walks the catalog's token set and fetches each book, but
/// only when the quote-category rate budget covers the call; an empty bucket
/// skips that token until the next tick rather than queueing.
pub struct PollSource {
    venue: Arc<dyn MarketDataSource>,
    feed: Arc<QuoteFeed>,
    budget: Arc<RateBudget>,
    poll_interval: Duration,
}

impl PollSource {
    /// Create a polling source.
    pub fn new(
        venue: Arc<dyn MarketDataSource>,
        feed: Arc<QuoteFeed>,
        budget: Arc<RateBudget>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            venue,
            feed,
            budget,
            poll_interval,
        }
    }

    /// Cadence between full catalog sweeps.
    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll one token's book into the feed. Returns false when skipped.
    #[instrument(skip(self), fields(token_id))]
    pub(crate) async fn poll_token(&self, token_id: &str) -> bool {
        if !self.budget.quotes.try_acquire(1.0).await {
            debug!(token_id, "quote budget empty, skipping poll");
            return false;
        }

        match self.venue.top_of_book(token_id).await {
            Ok(top) => {
                self.feed.record(token_id, top);
                true
            }
            Err(e) => {
                warn!(token_id, error = %e, "book poll failed");
                false
            }
        }
    }
}

#[async_trait]
impl QuoteSource for PollSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn run(&self, catalog: Arc<MarketCatalog>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "poll source starting");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tokens = catalog.token_ids().await;
                    for token_id in &tokens {
                        if *shutdown.borrow() {
                            return;
                        }
                        self.poll_token(token_id).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("poll source stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::types::TopOfBook;
    use crate::venue::mock::MockVenue;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn poll_skips_when_budget_empty() {
        let venue = Arc::new(MockVenue::new());
        venue.set_book("tok-a", dec!(0.48), dec!(100), dec!(0.46), dec!(100));

        let feed = Arc::new(QuoteFeed::new(Duration::from_secs(2)));
        // Zero-ish budget: capacity 1, drained immediately.
        let budget = Arc::new(RateBudget {
            quotes: crate::limiter::TokenBucket::new("quotes", 0.001, 1.0),
            orders: crate::limiter::TokenBucket::new("orders", 1.0, 1.0),
        });

        let source = PollSource::new(venue, feed.clone(), budget, Duration::from_millis(10));

        assert!(source.poll_token("tok-a").await);
        assert!(!source.poll_token("tok-a").await);
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn poll_records_observation() {
        let venue = Arc::new(MockVenue::new());
        venue.set_book("tok-a", dec!(0.48), dec!(100), dec!(0.46), dec!(100));

        let feed = Arc::new(QuoteFeed::new(Duration::from_secs(2)));
        let budget = Arc::new(RateBudget {
            quotes: crate::limiter::TokenBucket::new("quotes", 8.0, 8.0),
            orders: crate::limiter::TokenBucket::new("orders", 2.0, 4.0),
        });

        let source = PollSource::new(venue, feed.clone(), budget, Duration::from_millis(10));
        assert!(source.poll_token("tok-a").await);

        let top: TopOfBook = feed.top("tok-a").unwrap();
        assert_eq!(top.best_ask, Some(dec!(0.48)));
    }
}
