//! Shared quote board with staleness gating.
//!
//! Sources write top-of-book observations in; the evaluator reads pairs out.
//! Reads never wait on a source: they see the last completed observation or
//! nothing. An observation older than the staleness ceiling reads as absent.

use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::catalog::Market;
use crate::metrics;

use super::types::{PairQuote, Quote, TopOfBook};

/// Latest top-of-book per token, gated by age on the way out.
pub struct QuoteFeed {
    board: DashMap<String, TopOfBook>,
    max_staleness: Duration,
}

impl QuoteFeed {
    /// Create an empty feed with the given staleness ceiling.
    pub fn new(max_staleness: Duration) -> Self {
        Self {
            board: DashMap::new(),
            max_staleness,
        }
    }

    /// Record a fresh observation for a token.
    pub fn record(&self, token_id: &str, top: TopOfBook) {
        self.board.insert(token_id.to_string(), top);
    }

    /// Latest observation regardless of age. For diagnostics and unwind
    /// pricing, never for trade evaluation.
    pub fn top(&self, token_id: &str) -> Option<TopOfBook> {
        self.board.get(token_id).map(|t| *t)
    }

    /// Best bid and its size for a token, ungated.
    pub fn best_bid(&self, token_id: &str) -> Option<(Decimal, Decimal)> {
        let top = self.top(token_id)?;
        top.best_bid.map(|price| (price, top.bid_size))
    }

    /// Buy-side quote for a token, absent if missing, stale, or out of domain.
    pub fn fresh_quote(&self, token_id: &str) -> Option<Quote> {
        let top = self.top(token_id)?;
        if top.age() > self.max_staleness {
            metrics::inc_stale_quote_skipped();
            return None;
        }
        Quote::from_top(&top)
    }

    /// Both sides of a market; absent unless BOTH sides are fresh.
    pub fn pair_quote(&self, market: &Market) -> Option<PairQuote> {
        let yes = self.fresh_quote(&market.yes_token_id)?;
        let no = self.fresh_quote(&market.no_token_id)?;
        Some(PairQuote { yes, no })
    }

    /// Drop observations for tokens no longer in `keep`. Called when the
    /// catalog rotates markets out, so the board tracks the live set.
    pub fn retain_tokens(&self, keep: &std::collections::HashSet<String>) {
        self.board.retain(|token_id, _| keep.contains(token_id));
    }

    /// Number of tokens with any observation.
    pub fn len(&self) -> usize {
        self.board.len()
    }

    /// Whether no observations have been recorded.
    pub fn is_empty(&self) -> bool {
        self.board.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Coin, Timeframe};
    use rust_decimal_macros::dec;
    use std::time::Instant;
    use time::macros::datetime;

    fn market() -> Market {
        Market {
            id: "cond-1".to_string(),
            slug: "btc-updown-15m".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            timeframe: Timeframe::M15,
            coin: Coin::Btc,
            yes_token_id: "tok-yes".to_string(),
            no_token_id: "tok-no".to_string(),
            deadline: datetime!(2030-01-01 00:00 UTC),
        }
    }

    fn top(ask: Decimal, size: Decimal, age: Duration) -> TopOfBook {
        TopOfBook {
            best_ask: Some(ask),
            ask_size: size,
            best_bid: Some(ask - dec!(0.02)),
            bid_size: size,
            observed_at: Instant::now().checked_sub(age).unwrap(),
        }
    }

    #[test]
    fn pair_quote_requires_both_sides_fresh() {
        let feed = QuoteFeed::new(Duration::from_secs(2));
        let market = market();

        feed.record("tok-yes", top(dec!(0.48), dec!(100), Duration::ZERO));
        assert!(feed.pair_quote(&market).is_none());

        feed.record("tok-no", top(dec!(0.49), dec!(100), Duration::ZERO));
        let pair = feed.pair_quote(&market).unwrap();
        assert_eq!(pair.combined(), dec!(0.97));
    }

    #[test]
    fn stale_side_reads_as_absent() {
        let feed = QuoteFeed::new(Duration::from_secs(2));
        let market = market();

        feed.record("tok-yes", top(dec!(0.48), dec!(100), Duration::ZERO));
        feed.record("tok-no", top(dec!(0.49), dec!(100), Duration::from_secs(5)));

        assert!(feed.fresh_quote("tok-yes").is_some());
        assert!(feed.fresh_quote("tok-no").is_none());
        assert!(feed.pair_quote(&market).is_none());
    }

    #[test]
    fn best_bid_is_not_staleness_gated() {
        let feed = QuoteFeed::new(Duration::from_secs(2));
        feed.record("tok-yes", top(dec!(0.48), dec!(100), Duration::from_secs(60)));

        assert!(feed.fresh_quote("tok-yes").is_none());
        let (bid, size) = feed.best_bid("tok-yes").unwrap();
        assert_eq!(bid, dec!(0.46));
        assert_eq!(size, dec!(100));
    }

    #[test]
    fn retain_drops_tokens_outside_the_live_set() {
        let feed = QuoteFeed::new(Duration::from_secs(2));
        feed.record("tok-yes", top(dec!(0.48), dec!(100), Duration::ZERO));
        feed.record("tok-old", top(dec!(0.30), dec!(100), Duration::ZERO));

        let keep = std::collections::HashSet::from(["tok-yes".to_string()]);
        feed.retain_tokens(&keep);

        assert_eq!(feed.len(), 1);
        assert!(feed.top("tok-yes").is_some());
        assert!(feed.top("tok-old").is_none());
    }

    #[test]
    fn unknown_token_reads_as_absent() {
        let feed = QuoteFeed::new(Duration::from_secs(2));
        assert!(feed.fresh_quote("nope").is_none());
        assert!(feed.top("nope").is_none());
    }
}
