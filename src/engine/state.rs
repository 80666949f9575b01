//! Execution lifecycle state machine and per-trade records.
//!
//! Every execution walks a fixed transition graph from candidate to exactly
//! one terminal state. Transitions happen in one place
//! ([`ExecutionRecord::transition`]) so that logging and metrics cannot drift
//! from the actual state.

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::catalog::{Market, Side};
use crate::metrics;
use std::sync::Arc;

/// Which leg of the pair an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Leg {
    /// YES leg, submitted first.
    #[strum(serialize = "leg1")]
    First,
    /// NO leg, submitted second.
    #[strum(serialize = "leg2")]
    Second,
}

/// Lifecycle states of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum ExecState {
    /// Evaluator produced a candidate; nothing reserved yet.
    Candidate,
    /// RiskGate admitted it and the dedup slot is held.
    Admitted,
    /// First leg sent to the venue.
    Leg1Submitted,
    /// First leg filled, second leg sent.
    Leg2Submitted,
    /// Both legs filled. Terminal success.
    BothFilled,
    /// First leg rejected or unfilled. Terminal, no position taken.
    Leg1Failed,
    /// Second leg rejected or unfilled while leg one filled.
    Leg2Failed,
    /// Emergency sell of the naked first leg in progress.
    Unwinding,
    /// Naked leg sold off. Terminal with quantified loss.
    Unwound,
    /// Emergency sell exhausted its retries. Terminal, escalated.
    UnwindFailed,
}

impl ExecState {
    /// Whether this state ends the execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecState::BothFilled
                | ExecState::Leg1Failed
                | ExecState::Unwound
                | ExecState::UnwindFailed
        )
    }

    /// Legal next states.
    pub fn can_transition_to(&self, next: ExecState) -> bool {
        use ExecState::*;
        matches!(
            (self, next),
            (Candidate, Admitted)
                | (Admitted, Leg1Submitted)
                | (Leg1Submitted, Leg2Submitted)
                | (Leg1Submitted, Leg1Failed)
                | (Leg2Submitted, BothFilled)
                | (Leg2Submitted, Leg2Failed)
                | (Leg2Failed, Unwinding)
                | (Unwinding, Unwound)
                | (Unwinding, UnwindFailed)
        )
    }
}

/// What happened to a single leg order.
#[derive(Debug, Clone, Serialize)]
pub enum LegResult {
    /// Filled at `price` for `size` shares.
    Filled {
        /// Actual fill price.
        price: Decimal,
        /// Actual filled size.
        size: Decimal,
    },
    /// Not filled; carries the venue or local reason.
    Unfilled(String),
}

/// Intended and actual outcome of one leg.
#[derive(Debug, Clone, Serialize)]
pub struct LegOutcome {
    /// Which leg this is.
    pub leg: Leg,
    /// Side being bought.
    pub side: Side,
    /// Token the order targets.
    pub token_id: String,
    /// Slippage-padded limit price sent to the venue.
    pub limit_price: Decimal,
    /// Requested size in shares.
    pub requested_size: Decimal,
    /// Result, once known.
    pub result: Option<LegResult>,
}

impl LegOutcome {
    /// A leg with its order parameters fixed and no result yet.
    pub fn pending(
        leg: Leg,
        side: Side,
        token_id: String,
        limit_price: Decimal,
        requested_size: Decimal,
    ) -> Self {
        Self {
            leg,
            side,
            token_id,
            limit_price,
            requested_size,
            result: None,
        }
    }

    /// Whether this leg ended filled.
    pub fn is_filled(&self) -> bool {
        matches!(self.result, Some(LegResult::Filled { .. }))
    }

    /// Filled size, zero if unfilled or pending.
    pub fn filled_size(&self) -> Decimal {
        match &self.result {
            Some(LegResult::Filled { size, .. }) => *size,
            _ => Decimal::ZERO,
        }
    }

    /// Price actually paid, if the leg filled.
    pub fn fill_price(&self) -> Option<Decimal> {
        match &self.result {
            Some(LegResult::Filled { price, .. }) => Some(*price),
            _ => None,
        }
    }
}

/// Full record of one execution attempt, kept until process exit.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// Market being traded.
    #[serde(skip)]
    pub market: Arc<Market>,
    /// Market id, duplicated for serialized output.
    pub market_id: String,
    /// Current state.
    pub state: ExecState,
    /// Shares targeted on each leg.
    pub shares: Decimal,
    /// Combined YES+NO ask at decision time.
    pub combined_price: Decimal,
    /// Expected profit for the whole trade at decision time.
    pub expected_profit: Decimal,
    /// YES leg outcome.
    pub yes_leg: LegOutcome,
    /// NO leg outcome.
    pub no_leg: LegOutcome,
    /// Realized profit or loss once terminal, if determinable.
    pub realized_pnl: Option<Decimal>,
    /// When the evaluator produced the candidate.
    pub decided_at: OffsetDateTime,
    /// When the first order left for the venue.
    pub submitted_at: Option<OffsetDateTime>,
    /// When a terminal state was reached.
    pub terminal_at: Option<OffsetDateTime>,
    /// Emergency-sell attempts made, if any.
    pub unwind_attempts: u32,
}

impl ExecutionRecord {
    /// A record at the start of its life, in [`ExecState::Candidate`].
    pub fn new(
        market: Arc<Market>,
        shares: Decimal,
        combined_price: Decimal,
        expected_profit: Decimal,
        yes_leg: LegOutcome,
        no_leg: LegOutcome,
    ) -> Self {
        let market_id = market.id.clone();
        Self {
            market,
            market_id,
            state: ExecState::Candidate,
            shares,
            combined_price,
            expected_profit,
            yes_leg,
            no_leg,
            realized_pnl: None,
            decided_at: OffsetDateTime::now_utc(),
            submitted_at: None,
            terminal_at: None,
            unwind_attempts: 0,
        }
    }

    /// Move to `next`, logging the transition and bumping its counter.
    ///
    /// Illegal transitions are logged loudly and refused so a bug cannot
    /// corrupt the terminal bookkeeping.
    pub fn transition(&mut self, next: ExecState) {
        if !self.state.can_transition_to(next) {
            warn!(
                market_id = %self.market_id,
                from = %self.state,
                to = %next,
                "refusing illegal state transition"
            );
            return;
        }

        info!(
            market_id = %self.market_id,
            from = %self.state,
            to = %next,
            shares = %self.shares,
            "execution state transition"
        );
        metrics::inc_exec_transition(next.to_string().as_str());

        self.state = next;
        match next {
            ExecState::Leg1Submitted => self.submitted_at = Some(OffsetDateTime::now_utc()),
            s if s.is_terminal() => self.terminal_at = Some(OffsetDateTime::now_utc()),
            _ => {}
        }
    }

    /// Whether the record has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether this execution left a held YES/NO pair behind.
    pub fn holds_pair(&self) -> bool {
        self.state == ExecState::BothFilled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Coin, Timeframe};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn sample_market() -> Arc<Market> {
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

    fn sample_record() -> ExecutionRecord {
        let market = sample_market();
        ExecutionRecord {
            market_id: market.id.clone(),
            state: ExecState::Candidate,
            shares: dec!(10),
            combined_price: dec!(0.97),
            expected_profit: dec!(0.30),
            yes_leg: LegOutcome {
                leg: Leg::First,
                side: Side::Yes,
                token_id: market.yes_token_id.clone(),
                limit_price: dec!(0.48),
                requested_size: dec!(10),
                result: None,
            },
            no_leg: LegOutcome {
                leg: Leg::Second,
                side: Side::No,
                token_id: market.no_token_id.clone(),
                limit_price: dec!(0.49),
                requested_size: dec!(10),
                result: None,
            },
            realized_pnl: None,
            decided_at: OffsetDateTime::now_utc(),
            submitted_at: None,
            terminal_at: None,
            unwind_attempts: 0,
            market,
        }
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        let mut record = sample_record();
        for next in [
            ExecState::Admitted,
            ExecState::Leg1Submitted,
            ExecState::Leg2Submitted,
            ExecState::BothFilled,
        ] {
            record.transition(next);
            assert_eq!(record.state, next);
        }
        assert!(record.is_terminal());
        assert!(record.holds_pair());
        assert!(record.terminal_at.is_some());
    }

    #[test]
    fn unwind_path_transitions_are_legal() {
        let mut record = sample_record();
        for next in [
            ExecState::Admitted,
            ExecState::Leg1Submitted,
            ExecState::Leg2Submitted,
            ExecState::Leg2Failed,
            ExecState::Unwinding,
            ExecState::Unwound,
        ] {
            record.transition(next);
            assert_eq!(record.state, next);
        }
        assert!(record.is_terminal());
        assert!(!record.holds_pair());
    }

    #[test]
    fn illegal_transition_is_refused() {
        let mut record = sample_record();
        record.transition(ExecState::BothFilled);
        assert_eq!(record.state, ExecState::Candidate);

        record.transition(ExecState::Admitted);
        record.transition(ExecState::Leg1Submitted);
        record.transition(ExecState::Leg1Failed);
        assert!(record.is_terminal());

        // Terminal states accept nothing further.
        record.transition(ExecState::Unwinding);
        assert_eq!(record.state, ExecState::Leg1Failed);
    }

    #[test]
    fn leg1_cannot_skip_to_both_filled() {
        assert!(!ExecState::Leg1Submitted.can_transition_to(ExecState::BothFilled));
        assert!(!ExecState::Leg1Failed.can_transition_to(ExecState::Unwinding));
        assert!(!ExecState::Candidate.can_transition_to(ExecState::Leg1Submitted));
    }
}
