//! Quote types shared by the polling and streaming sources.

use std::time::Instant;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Top-of-book for one token at one moment.
#[derive(Debug, Clone, Copy)]
pub struct TopOfBook {
    /// Lowest ask price, if any ask liquidity exists.
    pub best_ask: Option<Decimal>,
    /// Size available at the best ask.
    pub ask_size: Decimal,
    /// Highest bid price, if any bid liquidity exists.
    pub best_bid: Option<Decimal>,
    /// Size available at the best bid.
    pub bid_size: Decimal,
    /// When this observation was taken.
    pub observed_at: Instant,
}

impl TopOfBook {
    /// An empty book observed now.
    pub fn empty() -> Self {
        Self {
            best_ask: None,
            ask_size: Decimal::ZERO,
            best_bid: None,
            bid_size: Decimal::ZERO,
            observed_at: Instant::now(),
        }
    }

    /// Age of the observation.
    pub fn age(&self) -> std::time::Duration {
        self.observed_at.elapsed()
    }
}

/// Fresh buy-side quote for one token.
///
/// Only constructed from observations that passed the staleness gate and the
/// price-domain check, so downstream code can rely on `0 < ask < 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Best ask price, exclusive bounds (0, 1).
    pub ask: Decimal,
    /// Size available at the ask.
    pub ask_size: Decimal,
    /// Best bid, if present. Used for unwind pricing, not evaluation.
    pub bid: Option<Decimal>,
}

impl Quote {
    /// Build from a top-of-book observation; None if the ask is missing or
    /// outside the (0, 1) domain.
    pub fn from_top(top: &TopOfBook) -> Option<Self> {
        let ask = top.best_ask?;
        if ask <= Decimal::ZERO || ask >= Decimal::ONE || top.ask_size < Decimal::ZERO {
            return None;
        }
        Some(Self {
            ask,
            ask_size: top.ask_size,
            bid: top.best_bid,
        })
    }
}

/// Both sides of a market, each individually fresh.
#[derive(Debug, Clone, Copy)]
pub struct PairQuote {
    /// YES token quote.
    pub yes: Quote,
    /// NO token quote.
    pub no: Quote,
}

impl PairQuote {
    /// Combined cost of one YES share plus one NO share.
    pub fn combined(&self) -> Decimal {
        self.yes.ask + self.no.ask
    }
}

/// One price level as the REST book endpoint returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RestLevel {
    /// Price as a string.
    pub price: String,
    /// Size as a string.
    pub size: String,
}

/// Book payload from the REST `/book` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RestBook {
    /// Bid levels, unordered.
    #[serde(default)]
    pub bids: Vec<RestLevel>,
    /// Ask levels, unordered.
    #[serde(default)]
    pub asks: Vec<RestLevel>,
}

impl RestBook {
    /// Reduce the payload to a top-of-book observation.
    pub fn to_top_of_book(&self) -> TopOfBook {
        let mut best_ask: Option<(Decimal, Decimal)> = None;
        for level in &self.asks {
            if let (Ok(price), Ok(size)) =
                (level.price.parse::<Decimal>(), level.size.parse::<Decimal>())
            {
                if size > Decimal::ZERO && best_ask.map_or(true, |(p, _)| price < p) {
                    best_ask = Some((price, size));
                }
            }
        }

        let mut best_bid: Option<(Decimal, Decimal)> = None;
        for level in &self.bids {
            if let (Ok(price), Ok(size)) =
                (level.price.parse::<Decimal>(), level.size.parse::<Decimal>())
            {
                if size > Decimal::ZERO && best_bid.map_or(true, |(p, _)| price > p) {
                    best_bid = Some((price, size));
                }
            }
        }

        TopOfBook {
            best_ask: best_ask.map(|(p, _)| p),
            ask_size: best_ask.map(|(_, s)| s).unwrap_or(Decimal::ZERO),
            best_bid: best_bid.map(|(p, _)| p),
            bid_size: best_bid.map(|(_, s)| s).unwrap_or(Decimal::ZERO),
            observed_at: Instant::now(),
        }
    }
}
