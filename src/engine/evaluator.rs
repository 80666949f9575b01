//! Spread evaluation: turn fresh pair quotes into trade candidates.
//!
//! All price math is exact decimal. The profit signal is on the order of
//! 0.5-2% of notional, so binary floating point is banned from this path.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::Market;
use crate::config::Config;
use crate::quotes::PairQuote;

/// Evaluation thresholds, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct EvalSettings {
    /// Combined ask must be strictly below this.
    pub min_spread_target: Decimal,
    /// Implied profit per share must reach this.
    pub profit_threshold: Decimal,
    /// Maximum dollar outlay per trade.
    pub bet_size: Decimal,
    /// Minimum share count per trade.
    pub min_shares: Decimal,
    /// Fractional padding applied to limit prices.
    pub slippage_tolerance: Decimal,
}

impl EvalSettings {
    /// Build settings from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_spread_target: config.min_spread_target,
            profit_threshold: config.profit_threshold,
            bet_size: config.bet_size,
            min_shares: Decimal::from(config.min_shares),
            slippage_tolerance: config.slippage_tolerance,
        }
    }
}

/// A priced, sized trade the RiskGate may admit.
#[derive(Debug, Clone)]
pub struct TradeCandidate {
    /// Market being traded.
    pub market: Arc<Market>,
    /// Quote pair the decision was made on.
    pub quote: PairQuote,
    /// Combined YES+NO ask.
    pub combined: Decimal,
    /// Implied profit per share: 1 - combined.
    pub profit_per_share: Decimal,
    /// Whole shares to buy on each leg.
    pub shares: Decimal,
    /// Slippage-padded YES limit price.
    pub yes_limit: Decimal,
    /// Slippage-padded NO limit price.
    pub no_limit: Decimal,
    /// Dollar outlay at the quoted prices.
    pub outlay: Decimal,
    /// Expected profit for the whole trade at the quoted prices.
    pub expected_profit: Decimal,
}

/// Pad a limit price by the slippage tolerance, quantized up to the cent and
/// capped below $1.00.
fn pad_limit(ask: Decimal, tolerance: Decimal) -> Decimal {
    let padded = ask * (Decimal::ONE + tolerance);
    let cents = (padded * Decimal::ONE_HUNDRED).ceil() / Decimal::ONE_HUNDRED;
    cents.min(Decimal::new(99, 2))
}

/// Evaluate one market's fresh pair quote.
///
/// Returns a candidate only when the combined ask clears the spread target,
/// the implied profit clears the threshold (including after slippage
/// padding), and the size floor is met. Sizing is the smaller of both sides'
/// top-of-book size and the share count the bet budget buys at the cheaper
/// ask, floored to whole shares.
pub fn evaluate(
    market: &Arc<Market>,
    pair: &PairQuote,
    settings: &EvalSettings,
) -> Option<TradeCandidate> {
    let combined = pair.combined();
    if combined >= settings.min_spread_target {
        return None;
    }

    let profit_per_share = Decimal::ONE - combined;
    if profit_per_share < settings.profit_threshold {
        return None;
    }

    let min_ask = pair.yes.ask.min(pair.no.ask);
    let budget_shares = (settings.bet_size / min_ask).floor();
    let shares = pair
        .yes
        .ask_size
        .min(pair.no.ask_size)
        .min(budget_shares)
        .floor();

    if shares < settings.min_shares {
        debug!(
            market_id = %market.id,
            %shares,
            min_shares = %settings.min_shares,
            "spread profitable but sizing below minimum"
        );
        return None;
    }

    let yes_limit = pad_limit(pair.yes.ask, settings.slippage_tolerance);
    let no_limit = pad_limit(pair.no.ask, settings.slippage_tolerance);

    // Worst-case fill at the padded limits must still be profitable.
    if yes_limit + no_limit >= Decimal::ONE {
        debug!(
            market_id = %market.id,
            %yes_limit,
            %no_limit,
            "spread vanishes after slippage padding"
        );
        return None;
    }

    let outlay = combined * shares;
    let expected_profit = profit_per_share * shares;

    Some(TradeCandidate {
        market: Arc::clone(market),
        quote: *pair,
        combined,
        profit_per_share,
        shares,
        yes_limit,
        no_limit,
        outlay,
        expected_profit,
    })
}
