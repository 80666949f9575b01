//! Admission control: ordered checks between a candidate and the executor.
//!
//! Checks run cheapest-first and short-circuit. A rejection is a normal
//! outcome, counted per reason and logged at debug. The dedup reservation is
//! the only stateful step; when a later check fails, the reservation is
//! released before returning.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::evaluator::TradeCandidate;
use crate::error::RiskError;
use crate::limiter::RateBudget;
use crate::metrics;

use super::dedup::DedupSet;
use super::halt::TradingHalt;

/// Venue calls an admitted trade consumes from the order budget: two leg
/// submissions (or one batch plus a status check).
const ORDER_CALL_COST: f64 = 2.0;

/// Proof that a candidate passed admission with the dedup slot held.
///
/// The executor owns the slot from here: it must either release it (terminal
/// with no position) or leave it held (position taken or escalated).
#[derive(Debug)]
pub struct Admission {
    /// Market id whose dedup slot is held.
    pub market_id: String,
}

/// Ordered admission checks.
pub struct RiskGate {
    dedup: Arc<DedupSet>,
    halt: Arc<TradingHalt>,
    budget: Arc<RateBudget>,
    min_shares: Decimal,
}

impl RiskGate {
    /// Create the gate over the shared risk state.
    pub fn new(
        dedup: Arc<DedupSet>,
        halt: Arc<TradingHalt>,
        budget: Arc<RateBudget>,
        min_shares: u64,
    ) -> Self {
        Self {
            dedup,
            halt,
            budget,
            min_shares: Decimal::from(min_shares),
        }
    }

    /// Run the admission checks for a candidate.
    ///
    /// Order: halt, dedup reserve, size floor, order rate budget, top-of-book
    /// liquidity. On success the dedup slot is held by the returned
    /// [`Admission`].
    pub async fn admit(&self, candidate: &TradeCandidate) -> Result<Admission, RiskError> {
        if self.halt.is_halted() {
            return Err(self.reject(candidate, RiskError::Halted));
        }

        if !self.dedup.try_reserve(&candidate.market) {
            return Err(self.reject(candidate, RiskError::DuplicateMarket));
        }

        // Slot is held from here on: release on any further rejection.
        if candidate.shares < self.min_shares {
            self.dedup.release(&candidate.market.id);
            return Err(self.reject(candidate, RiskError::BelowMinimumSize));
        }

        if !self.budget.orders.has_budget(ORDER_CALL_COST).await {
            self.dedup.release(&candidate.market.id);
            return Err(self.reject(candidate, RiskError::RateBudgetExhausted));
        }

        if candidate.quote.yes.ask_size < candidate.shares
            || candidate.quote.no.ask_size < candidate.shares
        {
            self.dedup.release(&candidate.market.id);
            return Err(self.reject(candidate, RiskError::InsufficientLiquidity));
        }

        Ok(Admission {
            market_id: candidate.market.id.clone(),
        })
    }

    fn reject(&self, candidate: &TradeCandidate, reason: RiskError) -> RiskError {
        debug!(
            market_id = %candidate.market.id,
            %reason,
            combined = %candidate.combined,
            shares = %candidate.shares,
            "candidate rejected"
        );
        metrics::inc_risk_rejection(rejection_label(&reason));
        reason
    }
}

fn rejection_label(reason: &RiskError) -> &'static str {
    match reason {
        RiskError::Halted => "halted",
        RiskError::DuplicateMarket => "duplicate",
        RiskError::BelowMinimumSize => "below_min_size",
        RiskError::RateBudgetExhausted => "rate_budget",
        RiskError::InsufficientLiquidity => "liquidity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Coin, Market, Timeframe};
    use crate::engine::evaluator::{evaluate, EvalSettings};
    use crate::limiter::TokenBucket;
    use crate::quotes::{PairQuote, Quote};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn market() -> Arc<Market> {
        Arc::new(Market {
            id: "cond-1".to_string(),
            slug: "btc-updown-15m".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            timeframe: Timeframe::M15,
            coin: Coin::Btc,
            yes_token_id: "tok-yes".to_string(),
            no_token_id: "tok-no".to_string(),
            deadline: datetime!(2030-01-01 00:00 UTC),
        })
    }

    fn candidate() -> TradeCandidate {
        let pair = PairQuote {
            yes: Quote {
                ask: dec!(0.48),
                ask_size: dec!(100),
                bid: Some(dec!(0.46)),
            },
            no: Quote {
                ask: dec!(0.49),
                ask_size: dec!(100),
                bid: Some(dec!(0.47)),
            },
        };
        let settings = EvalSettings {
            min_spread_target: dec!(0.99),
            profit_threshold: dec!(0.001),
            bet_size: dec!(10),
            min_shares: dec!(5),
            slippage_tolerance: dec!(0),
        };
        evaluate(&market(), &pair, &settings).unwrap()
    }

    fn gate(
        halt_threshold: u32,
        order_rate: f64,
    ) -> (RiskGate, Arc<DedupSet>, Arc<TradingHalt>, Arc<RateBudget>) {
        let dedup = Arc::new(DedupSet::new());
        let halt = Arc::new(TradingHalt::new(halt_threshold));
        let budget = Arc::new(RateBudget {
            quotes: TokenBucket::new("quotes", 8.0, 8.0),
            orders: TokenBucket::new("orders", order_rate, order_rate.max(4.0)),
        });
        (
            RiskGate::new(
                Arc::clone(&dedup),
                Arc::clone(&halt),
                Arc::clone(&budget),
                5,
            ),
            dedup,
            halt,
            budget,
        )
    }

    #[tokio::test]
    async fn admission_reserves_the_slot() {
        let (gate, dedup, _, _) = gate(2, 2.0);
        let candidate = candidate();

        let admission = gate.admit(&candidate).await.unwrap();
        assert_eq!(admission.market_id, "cond-1");
        assert!(dedup.contains("cond-1"));

        // Second admission for the same market is refused.
        assert_eq!(
            gate.admit(&candidate).await.unwrap_err(),
            RiskError::DuplicateMarket
        );
    }

    #[tokio::test]
    async fn halt_blocks_before_anything_else() {
        let (gate, dedup, halt, _) = gate(2, 2.0);
        halt.trip(super::super::halt::HaltReason::Manual("test".to_string()));

        assert_eq!(
            gate.admit(&candidate()).await.unwrap_err(),
            RiskError::Halted
        );
        assert!(dedup.is_empty());
    }

    #[tokio::test]
    async fn rejection_after_reserve_releases_the_slot() {
        let (gate, dedup, _, _) = gate(2, 2.0);
        let mut candidate = candidate();
        candidate.shares = dec!(2);

        assert_eq!(
            gate.admit(&candidate).await.unwrap_err(),
            RiskError::BelowMinimumSize
        );
        assert!(dedup.is_empty());
    }

    #[tokio::test]
    async fn drained_order_budget_rejects() {
        let (gate, dedup, _, budget) = gate(2, 0.001);
        let candidate = candidate();

        // Drain the order bucket below the two-call cost.
        let budget_probe = budget.orders.try_acquire(3.0).await;
        assert!(budget_probe);

        assert_eq!(
            gate.admit(&candidate).await.unwrap_err(),
            RiskError::RateBudgetExhausted
        );
        assert!(dedup.is_empty());
    }

    #[tokio::test]
    async fn shrunken_book_rejects_on_liquidity() {
        let (gate, dedup, _, _) = gate(2, 2.0);
        let mut candidate = candidate();
        // Book thinned out between evaluation and admission.
        candidate.quote.no.ask_size = dec!(4);

        assert_eq!(
            gate.admit(&candidate).await.unwrap_err(),
            RiskError::InsufficientLiquidity
        );
        assert!(dedup.is_empty());
    }
}
