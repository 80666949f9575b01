//! Two-leg execution: submit, verify fills, unwind on partials.
//!
//! Batch submission is preferred when the venue supports it; both FOK legs
//! travel in one request and the results come back positional. A failure of
//! the whole batch request means no order reached the venue, which is the
//! safe no-position outcome. Only a partial fill forces the emergency
//! unwind path.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::catalog::Side;
use crate::config::Config;
use crate::error::VenueError;
use crate::limiter::RateBudget;
use crate::metrics;
use crate::risk::{Admission, DedupSet, HaltReason, TradingHalt};
use crate::settlement::CompletedPair;
use crate::venue::{OrderIntent, OrderResult, OrderSide, OrderVenue, TimeInForce};

use super::evaluator::TradeCandidate;
use super::state::{ExecState, ExecutionRecord, Leg, LegOutcome, LegResult};

/// Order budget cost of one admitted trade.
const ORDER_CALL_COST: f64 = 2.0;
/// Order budget cost of one emergency sell attempt.
const UNWIND_CALL_COST: f64 = 1.0;
/// Emergency sell price; accept any buyer to close the position.
const UNWIND_FLOOR_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Execution knobs, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct ExecSettings {
    /// How long to wait for order budget before abandoning a trade.
    pub order_acquire_timeout: Duration,
    /// Emergency sell attempts before declaring the unwind failed.
    pub unwind_max_attempts: u32,
    /// Gap between emergency sell attempts.
    pub unwind_retry_gap: Duration,
    /// Simulate fills instead of submitting orders.
    pub dry_run: bool,
}

impl ExecSettings {
    /// Build settings from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            order_acquire_timeout: Duration::from_millis(config.order_acquire_timeout_ms),
            unwind_max_attempts: config.unwind_max_attempts,
            unwind_retry_gap: Duration::from_millis(config.unwind_retry_gap_ms),
            dry_run: config.dry_run,
        }
    }
}

/// Executes admitted trades and keeps the execution ledger.
pub struct OrderExecutor {
    venue: Arc<dyn OrderVenue>,
    dedup: Arc<DedupSet>,
    halt: Arc<TradingHalt>,
    budget: Arc<RateBudget>,
    settlement: mpsc::Sender<CompletedPair>,
    settings: ExecSettings,
    ledger: RwLock<Vec<ExecutionRecord>>,
    sim_balance: Mutex<Decimal>,
}

impl OrderExecutor {
    /// Wire the executor over the shared risk state and settlement queue.
    pub fn new(
        venue: Arc<dyn OrderVenue>,
        dedup: Arc<DedupSet>,
        halt: Arc<TradingHalt>,
        budget: Arc<RateBudget>,
        settlement: mpsc::Sender<CompletedPair>,
        settings: ExecSettings,
        sim_balance: Decimal,
    ) -> Self {
        Self {
            venue,
            dedup,
            halt,
            budget,
            settlement,
            settings,
            ledger: RwLock::new(Vec::new()),
            sim_balance: Mutex::new(sim_balance),
        }
    }

    /// Run one admitted trade to a terminal state and record it.
    ///
    /// The admission proves the dedup slot is held. It is released here only
    /// on terminals that leave no position behind; filled or escalated
    /// outcomes keep the market locked out.
    #[instrument(skip(self, candidate, admission), fields(market_id = %admission.market_id))]
    pub async fn execute(
        &self,
        candidate: TradeCandidate,
        admission: Admission,
    ) -> ExecutionRecord {
        let mut record = new_record(&candidate);
        record.transition(ExecState::Admitted);

        if self.settings.dry_run {
            self.execute_simulated(&candidate, &mut record).await;
        } else {
            self.execute_live(&candidate, &mut record).await;
        }

        match record.state {
            ExecState::BothFilled => {
                let pairs = record.yes_leg.filled_size().min(record.no_leg.filled_size());
                // PnL at what was actually paid, not the decision-time asks.
                let combined_paid = match (record.yes_leg.fill_price(), record.no_leg.fill_price())
                {
                    (Some(yes_paid), Some(no_paid)) => yes_paid + no_paid,
                    _ => record.combined_price,
                };
                record.realized_pnl = Some(pairs * (Decimal::ONE - combined_paid));
                metrics::inc_trade_completed();
                if let Err(e) = self
                    .settlement
                    .send(CompletedPair::new(&record.market_id, pairs))
                    .await
                {
                    warn!(error = %e, "settlement queue unavailable; pair pays out at resolution");
                }
            }
            // No position acquired; the market may be retried.
            ExecState::Leg1Failed => self.dedup.release(&admission.market_id),
            _ => {}
        }

        self.ledger.write().await.push(record.clone());
        record
    }

    /// Snapshot of the execution ledger, newest last.
    pub async fn ledger(&self) -> Vec<ExecutionRecord> {
        self.ledger.read().await.clone()
    }

    /// Completed trade count.
    pub async fn trades_completed(&self) -> usize {
        self.ledger
            .read()
            .await
            .iter()
            .filter(|r| r.state == ExecState::BothFilled)
            .count()
    }

    /// Remaining simulated balance. Meaningful in dry-run operation only.
    pub async fn sim_balance(&self) -> Decimal {
        *self.sim_balance.lock().await
    }

    async fn execute_live(&self, candidate: &TradeCandidate, record: &mut ExecutionRecord) {
        record.transition(ExecState::Leg1Submitted);

        if !self
            .budget
            .orders
            .acquire(ORDER_CALL_COST, self.settings.order_acquire_timeout)
            .await
        {
            let reason = "order rate budget exhausted before submission".to_string();
            record.yes_leg.result = Some(LegResult::Unfilled(reason.clone()));
            record.no_leg.result = Some(LegResult::Unfilled(reason));
            record.transition(ExecState::Leg1Failed);
            return;
        }

        if self.venue.supports_batch() {
            self.execute_batch(candidate, record).await;
        } else {
            self.execute_sequential(candidate, record).await;
        }
    }

    /// Both legs in one request; results are positional (YES first).
    async fn execute_batch(&self, candidate: &TradeCandidate, record: &mut ExecutionRecord) {
        let intents = vec![
            buy_intent(&record.yes_leg),
            buy_intent(&record.no_leg),
        ];

        let results = match self.venue.submit_batch(&intents).await {
            Ok(results) => results,
            Err(e) => {
                // The whole request failed, so no order reached the venue.
                self.note_venue_error(&e).await;
                let reason = format!("batch submission failed: {e}");
                record.yes_leg.result = Some(LegResult::Unfilled(reason.clone()));
                record.no_leg.result = Some(LegResult::Unfilled(reason));
                record.transition(ExecState::Leg1Failed);
                return;
            }
        };

        record.yes_leg.result = Some(leg_result(&results[0], &record.yes_leg));
        record.no_leg.result = Some(leg_result(&results[1], &record.no_leg));

        match (record.yes_leg.is_filled(), record.no_leg.is_filled()) {
            (true, true) => {
                record.transition(ExecState::Leg2Submitted);
                record.transition(ExecState::BothFilled);
                info!(
                    market_id = %record.market_id,
                    shares = %record.shares,
                    expected_profit = %record.expected_profit,
                    "both legs filled"
                );
            }
            (false, false) => {
                record.transition(ExecState::Leg1Failed);
            }
            (yes_filled, _) => {
                // Exactly one leg filled: a naked position that must go.
                record.transition(ExecState::Leg2Submitted);
                record.transition(ExecState::Leg2Failed);
                let filled_leg = if yes_filled { Leg::First } else { Leg::Second };
                self.unwind(candidate, record, filled_leg).await;
            }
        }
    }

    /// Fallback when the venue has no batch endpoint: legs go one at a time
    /// and only a confirmed first fill lets the second leg out.
    async fn execute_sequential(&self, candidate: &TradeCandidate, record: &mut ExecutionRecord) {
        match self.venue.submit_order(&buy_intent(&record.yes_leg)).await {
            Ok(result) => {
                record.yes_leg.result = Some(leg_result(&result, &record.yes_leg));
            }
            Err(e) => {
                self.note_venue_error(&e).await;
                record.yes_leg.result = Some(LegResult::Unfilled(format!("submission failed: {e}")));
            }
        }

        if !record.yes_leg.is_filled() {
            record.no_leg.result = Some(LegResult::Unfilled(
                "not submitted: first leg did not fill".to_string(),
            ));
            record.transition(ExecState::Leg1Failed);
            return;
        }

        record.transition(ExecState::Leg2Submitted);
        match self.venue.submit_order(&buy_intent(&record.no_leg)).await {
            Ok(result) => {
                record.no_leg.result = Some(leg_result(&result, &record.no_leg));
            }
            Err(e) => {
                self.note_venue_error(&e).await;
                record.no_leg.result = Some(LegResult::Unfilled(format!("submission failed: {e}")));
            }
        }

        if record.no_leg.is_filled() {
            record.transition(ExecState::BothFilled);
        } else {
            record.transition(ExecState::Leg2Failed);
            self.unwind(candidate, record, Leg::First).await;
        }
    }

    /// Emergency sell of the one filled leg at the floor price.
    ///
    /// GTC at the floor: a resting order that will cross any bid also counts
    /// as closed risk. Shares are floored to whole units so the notional
    /// stays representable in cents.
    async fn unwind(&self, candidate: &TradeCandidate, record: &mut ExecutionRecord, filled: Leg) {
        record.transition(ExecState::Unwinding);

        let (leg, side) = match filled {
            Leg::First => (&record.yes_leg, Side::Yes),
            Leg::Second => (&record.no_leg, Side::No),
        };
        let size = leg.filled_size().floor();
        let intent = OrderIntent {
            token_id: candidate.market.token_id(side).to_string(),
            side: OrderSide::Sell,
            price: UNWIND_FLOOR_PRICE,
            size,
            tif: TimeInForce::Gtc,
        };

        error!(
            market_id = %record.market_id,
            %side,
            %size,
            "naked position: emergency sell"
        );

        for attempt in 1..=self.settings.unwind_max_attempts {
            record.unwind_attempts = attempt;
            metrics::inc_unwind_attempt();

            // An exhausted budget delays the sell by at most the acquire
            // timeout; it never cancels the attempt.
            if !self
                .budget
                .orders
                .acquire(UNWIND_CALL_COST, self.settings.order_acquire_timeout)
                .await
            {
                warn!(attempt, "order budget empty, emergency sell proceeding");
            }

            let closed = match self.venue.submit_order(&intent).await {
                // A resting order id is enough; it will fill at market.
                Ok(result) => result.filled || result.order_id.is_some(),
                Err(e) => {
                    self.note_venue_error(&e).await;
                    warn!(attempt, error = %e, "emergency sell attempt failed");
                    false
                }
            };

            if closed {
                info!(attempt, %size, "emergency sell placed, risk closed");
                record.transition(ExecState::Unwound);
                self.halt.record_unwind_success();
                return;
            }

            if attempt < self.settings.unwind_max_attempts {
                tokio::time::sleep(self.settings.unwind_retry_gap).await;
            }
        }

        error!(
            market_id = %record.market_id,
            attempts = self.settings.unwind_max_attempts,
            "all emergency sell attempts failed; manual action required"
        );
        record.transition(ExecState::UnwindFailed);
        metrics::inc_unwind_failure();
        self.halt.record_unwind_failure();
    }

    /// Dry-run path: fills are assumed at the quoted asks and the outlay is
    /// charged against the simulated balance.
    async fn execute_simulated(&self, candidate: &TradeCandidate, record: &mut ExecutionRecord) {
        record.transition(ExecState::Leg1Submitted);

        let mut balance = self.sim_balance.lock().await;
        if *balance < candidate.outlay {
            let reason = format!("simulated balance {balance} below outlay {}", candidate.outlay);
            record.yes_leg.result = Some(LegResult::Unfilled(reason.clone()));
            record.no_leg.result = Some(LegResult::Unfilled(reason));
            record.transition(ExecState::Leg1Failed);
            return;
        }
        *balance -= candidate.outlay;
        drop(balance);

        record.yes_leg.result = Some(LegResult::Filled {
            price: candidate.quote.yes.ask,
            size: record.shares,
        });
        record.no_leg.result = Some(LegResult::Filled {
            price: candidate.quote.no.ask,
            size: record.shares,
        });
        record.transition(ExecState::Leg2Submitted);
        record.transition(ExecState::BothFilled);
        info!(
            market_id = %record.market_id,
            shares = %record.shares,
            expected_profit = %record.expected_profit,
            "simulated trade filled"
        );
    }

    async fn note_venue_error(&self, e: &VenueError) {
        match e {
            VenueError::RateLimited { .. } => self.budget.orders.on_venue_rejection().await,
            VenueError::Auth(msg) => {
                self.halt.trip(HaltReason::VenueAuthFailure(msg.clone()));
            }
            _ => {}
        }
    }
}

fn new_record(candidate: &TradeCandidate) -> ExecutionRecord {
    ExecutionRecord::new(
        Arc::clone(&candidate.market),
        candidate.shares,
        candidate.combined,
        candidate.expected_profit,
        LegOutcome::pending(
            Leg::First,
            Side::Yes,
            candidate.market.yes_token_id.clone(),
            candidate.yes_limit,
            candidate.shares,
        ),
        LegOutcome::pending(
            Leg::Second,
            Side::No,
            candidate.market.no_token_id.clone(),
            candidate.no_limit,
            candidate.shares,
        ),
    )
}

fn buy_intent(leg: &LegOutcome) -> OrderIntent {
    OrderIntent {
        token_id: leg.token_id.clone(),
        side: OrderSide::Buy,
        price: leg.limit_price,
        size: leg.requested_size,
        tif: TimeInForce::Fok,
    }
}

fn leg_result(result: &OrderResult, leg: &LegOutcome) -> LegResult {
    if result.filled {
        LegResult::Filled {
            // The limit price is the worst case when the venue omits amounts.
            price: result.fill_price.unwrap_or(leg.limit_price),
            size: result.fill_size,
        }
    } else {
        LegResult::Unfilled(
            result
                .reason
                .clone()
                .unwrap_or_else(|| "not matched".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Coin, Market, Timeframe};
    use crate::engine::evaluator::{evaluate, EvalSettings};
    use crate::limiter::TokenBucket;
    use crate::quotes::{PairQuote, Quote};
    use crate::venue::MockVenue;
    use rust_decimal_macros::dec;
    use time::macros::datetime;
    use tokio::sync::mpsc;

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

    struct Fixture {
        venue: Arc<MockVenue>,
        dedup: Arc<DedupSet>,
        halt: Arc<TradingHalt>,
        executor: OrderExecutor,
        settlement_rx: mpsc::Receiver<CompletedPair>,
    }

    fn fixture(dry_run: bool) -> Fixture {
        let venue = Arc::new(MockVenue::new());
        let dedup = Arc::new(DedupSet::new());
        let halt = Arc::new(TradingHalt::new(2));
        let budget = Arc::new(RateBudget {
            quotes: TokenBucket::new("quotes", 8.0, 8.0),
            orders: TokenBucket::new("orders", 10.0, 10.0),
        });
        let (tx, settlement_rx) = mpsc::channel(16);
        let settings = ExecSettings {
            order_acquire_timeout: Duration::from_millis(10),
            unwind_max_attempts: 3,
            unwind_retry_gap: Duration::from_millis(100),
            dry_run,
        };
        let executor = OrderExecutor::new(
            venue.clone() as Arc<dyn OrderVenue>,
            Arc::clone(&dedup),
            Arc::clone(&halt),
            budget,
            tx,
            settings,
            dec!(100),
        );
        Fixture {
            venue,
            dedup,
            halt,
            executor,
            settlement_rx,
        }
    }

    fn admit(dedup: &DedupSet, candidate: &TradeCandidate) -> Admission {
        assert!(dedup.try_reserve(&candidate.market));
        Admission {
            market_id: candidate.market.id.clone(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_fill_completes_and_queues_settlement() {
        let mut fx = fixture(false);
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::BothFilled);
        assert_eq!(record.shares, dec!(20));
        // 20 shares at 0.03 per share.
        assert_eq!(record.realized_pnl, Some(dec!(0.60)));

        let pair = fx.settlement_rx.recv().await.unwrap();
        assert_eq!(pair.market_id, "cond-1");
        assert_eq!(pair.size, dec!(20));

        // Filled market stays locked out.
        assert!(fx.dedup.contains("cond-1"));
        assert_eq!(fx.venue.submitted_orders().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_batch_fill_queues_the_smaller_size() {
        let mut fx = fixture(false);
        fx.venue.script_fill("tok-yes", dec!(10));
        fx.venue.script_fill("tok-no", dec!(20));
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::BothFilled);
        let pair = fx.settlement_rx.recv().await.unwrap();
        assert_eq!(pair.size, dec!(10));
    }

    #[tokio::test(start_paused = true)]
    async fn first_leg_miss_never_submits_the_second() {
        let fx = fixture(false);
        fx.venue.set_batch_capable(false);
        fx.venue.script_unfilled("tok-yes", "fok miss");
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::Leg1Failed);
        assert!(fx.venue.orders_for("tok-no").is_empty());
        // No position: the slot is free again.
        assert!(!fx.dedup.contains("cond-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_leg_miss_unwinds_the_first_exactly_once() {
        let fx = fixture(false);
        fx.venue.set_batch_capable(false);
        fx.venue.script_unfilled("tok-no", "fok miss");
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::Unwound);
        assert_eq!(record.unwind_attempts, 1);

        let yes_orders = fx.venue.orders_for("tok-yes");
        assert_eq!(yes_orders.len(), 2);
        assert_eq!(yes_orders[0].side, OrderSide::Buy);
        assert_eq!(yes_orders[1].side, OrderSide::Sell);
        assert_eq!(yes_orders[1].price, dec!(0.01));
        assert_eq!(yes_orders[1].tif, TimeInForce::Gtc);
        assert_eq!(yes_orders[1].size, dec!(20));

        // Escalated market stays locked out.
        assert!(fx.dedup.contains("cond-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_transport_failure_means_no_position() {
        let fx = fixture(false);
        fx.venue.fail_next_batch("gateway timeout");
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::Leg1Failed);
        assert!(fx.venue.submitted_orders().is_empty());
        assert!(!fx.dedup.contains("cond-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_unwind_counts_toward_the_halt() {
        let fx = fixture(false);
        fx.venue.set_batch_capable(false);

        for market_n in 0..2 {
            // YES buy fills, NO buy misses, all three emergency sells miss.
            fx.venue.script_fill("tok-yes", dec!(20));
            fx.venue.script_unfilled("tok-no", "fok miss");
            for _ in 0..3 {
                fx.venue.script_unfilled("tok-yes", "no bids");
            }

            let mut candidate = candidate();
            candidate.market = Arc::new(Market {
                id: format!("cond-{market_n}"),
                ..(*candidate.market).clone()
            });
            let admission = admit(&fx.dedup, &candidate);
            let record = fx.executor.execute(candidate, admission).await;

            assert_eq!(record.state, ExecState::UnwindFailed);
            assert_eq!(record.unwind_attempts, 3);
        }

        // Two consecutive failed unwind sequences trip the halt.
        assert!(fx.halt.is_halted());
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_trips_the_halt() {
        let fx = fixture(false);
        fx.venue.set_batch_capable(false);
        fx.venue.script_auth_failure("tok-yes", "bad signature");
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::Leg1Failed);
        assert!(fx.halt.is_halted());
    }

    #[tokio::test(start_paused = true)]
    async fn realized_pnl_reflects_the_prices_actually_paid() {
        let fx = fixture(false);
        // Both legs fill a cent above the quoted asks.
        fx.venue.script_fill_at("tok-yes", dec!(0.49), dec!(20));
        fx.venue.script_fill_at("tok-no", dec!(0.50), dec!(20));
        let candidate = candidate();
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::BothFilled);
        assert_eq!(record.yes_leg.fill_price(), Some(dec!(0.49)));
        assert_eq!(record.no_leg.fill_price(), Some(dec!(0.50)));
        // 20 shares at a combined 0.99 actually paid: 0.20, not the 0.60
        // the decision-time asks promised.
        assert_eq!(record.realized_pnl, Some(dec!(0.20)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_order_budget_does_not_block_the_unwind() {
        // Order capacity covers the two buy legs and nothing else.
        let venue = Arc::new(MockVenue::new());
        let dedup = Arc::new(DedupSet::new());
        let halt = Arc::new(TradingHalt::new(2));
        let budget = Arc::new(RateBudget {
            quotes: TokenBucket::new("quotes", 8.0, 8.0),
            orders: TokenBucket::new("orders", 0.0, 2.0),
        });
        let (tx, _settlement_rx) = mpsc::channel(16);
        let executor = OrderExecutor::new(
            venue.clone() as Arc<dyn OrderVenue>,
            Arc::clone(&dedup),
            halt,
            budget,
            tx,
            ExecSettings {
                order_acquire_timeout: Duration::from_millis(10),
                unwind_max_attempts: 3,
                unwind_retry_gap: Duration::from_millis(100),
                dry_run: false,
            },
            dec!(100),
        );

        venue.set_batch_capable(false);
        venue.script_unfilled("tok-no", "fok miss");
        let candidate = candidate();
        let admission = admit(&dedup, &candidate);

        let record = executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::Unwound);
        assert_eq!(record.unwind_attempts, 1);
        let yes_orders = venue.orders_for("tok-yes");
        assert_eq!(yes_orders.len(), 2);
        assert_eq!(yes_orders[1].side, OrderSide::Sell);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_charges_the_simulated_balance() {
        let mut fx = fixture(true);
        let candidate = candidate();
        let outlay = candidate.outlay;
        let admission = admit(&fx.dedup, &candidate);

        let record = fx.executor.execute(candidate, admission).await;

        assert_eq!(record.state, ExecState::BothFilled);
        assert!(fx.venue.submitted_orders().is_empty());
        assert_eq!(fx.executor.sim_balance().await, dec!(100) - outlay);

        let pair = fx.settlement_rx.recv().await.unwrap();
        assert_eq!(pair.size, dec!(20));
    }
}
