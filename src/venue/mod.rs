//! Venue interfaces and implementations.
//!
//! The engine only ever talks to these traits; the CLOB-backed
//! implementation lives in [`polymarket`], the scripted one for tests in
//! [`mock`]. On-chain merge submission is an external collaborator reached
//! through [`Settler`].

pub mod auth;
pub mod mock;
pub mod polymarket;

pub use auth::L2Credentials;
pub use mock::MockVenue;
pub use polymarket::PolymarketVenue;

use async_trait::async_trait;
use rust_decimal::Decimal;
use strum::Display;

use crate::error::VenueError;
use crate::quotes::TopOfBook;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OrderSide {
    /// Buy shares.
    #[strum(serialize = "BUY")]
    Buy,
    /// Sell shares.
    #[strum(serialize = "SELL")]
    Sell,
}

/// Order validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TimeInForce {
    /// Fill completely right now or die.
    #[strum(serialize = "FOK")]
    Fok,
    /// Rest on the book until filled or cancelled.
    #[strum(serialize = "GTC")]
    Gtc,
}

/// One order as the engine wants it placed.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    /// Token to trade.
    pub token_id: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit price.
    pub price: Decimal,
    /// Size in shares.
    pub size: Decimal,
    /// Validity window.
    pub tif: TimeInForce,
}

/// What the venue reported back for one order.
#[derive(Debug, Clone)]
pub struct OrderResult {
    /// Whether the order filled (matched or settled on-chain).
    pub filled: bool,
    /// Average price actually paid; absent when the venue omits the amounts.
    pub fill_price: Option<Decimal>,
    /// Actual filled size; the requested size when the venue omits it.
    pub fill_size: Decimal,
    /// Order id, when the venue assigned one.
    pub order_id: Option<String>,
    /// Venue-reported failure reason, if any.
    pub reason: Option<String>,
}

impl OrderResult {
    /// An unfilled result with a reason.
    pub fn unfilled(reason: impl Into<String>) -> Self {
        Self {
            filled: false,
            fill_price: None,
            fill_size: Decimal::ZERO,
            order_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Read-side market data.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current top-of-book for a token.
    async fn top_of_book(&self, token_id: &str) -> Result<TopOfBook, VenueError>;
}

/// Order placement.
#[async_trait]
pub trait OrderVenue: Send + Sync {
    /// Whether [`submit_batch`](Self::submit_batch) is available.
    fn supports_batch(&self) -> bool;

    /// Place one order and report its outcome.
    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult, VenueError>;

    /// Place several orders in one request; results are positional.
    async fn submit_batch(&self, intents: &[OrderIntent]) -> Result<Vec<OrderResult>, VenueError>;
}

/// On-chain merge of a held YES+NO pair back to collateral.
///
/// The transaction mechanics live outside this crate; implementations
/// forward to whatever submits the merge.
#[async_trait]
pub trait Settler: Send + Sync {
    /// Merge `size` pairs for a market. Returns a transaction reference.
    async fn merge_tokens(&self, market_id: &str, size: Decimal) -> Result<String, VenueError>;
}

/// Settler that records the merge intent and defers the transaction.
///
/// Used when no external merge submitter is wired in. Unmerged pairs are
/// safe to hold: the winning side pays out $1.00 per share at resolution.
#[derive(Debug, Default)]
pub struct DeferredSettler;

#[async_trait]
impl Settler for DeferredSettler {
    async fn merge_tokens(&self, market_id: &str, size: Decimal) -> Result<String, VenueError> {
        tracing::info!(%market_id, %size, "merge deferred; pair held to resolution");
        Ok(format!("deferred:{market_id}"))
    }
}
