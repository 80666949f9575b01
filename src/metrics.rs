//! Prometheus metrics for the scan-execute pipeline.
//!
//! Counters cover the funnel from catalog refresh through evaluation, risk
//! admission, execution, and settlement, plus the failure paths that matter
//! operationally: stale quotes, rate-limit tightening, unwinds, and halts.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use tracing::debug;

// === Metric Name Constants ===

/// Markets in the current catalog snapshot.
pub const METRIC_MARKETS_MONITORED: &str = "markets_monitored";
/// Catalog refresh failures counter metric name.
pub const METRIC_CATALOG_REFRESH_FAILURES: &str = "catalog_refresh_failures_total";
/// Opportunities found counter metric name.
pub const METRIC_OPPORTUNITIES_FOUND: &str = "opportunities_found_total";
/// Risk rejections counter metric name, labeled by reason.
pub const METRIC_RISK_REJECTIONS: &str = "risk_rejections_total";
/// Execution state transitions counter metric name, labeled by state.
pub const METRIC_EXEC_TRANSITIONS: &str = "exec_transitions_total";
/// Completed trades counter metric name.
pub const METRIC_TRADES_COMPLETED: &str = "trades_completed_total";
/// Emergency sell attempts counter metric name.
pub const METRIC_UNWIND_ATTEMPTS: &str = "unwind_attempts_total";
/// Exhausted unwind sequences counter metric name.
pub const METRIC_UNWIND_FAILURES: &str = "unwind_failures_total";
/// Trading halts counter metric name.
pub const METRIC_TRADING_HALTS: &str = "trading_halts_total";
/// Stale quotes skipped counter metric name.
pub const METRIC_STALE_QUOTES_SKIPPED: &str = "stale_quotes_skipped_total";
/// Rate limit tightenings counter metric name, labeled by bucket.
pub const METRIC_RATE_LIMIT_TIGHTENED: &str = "rate_limit_tightened_total";
/// Merges submitted counter metric name.
pub const METRIC_MERGES_SUBMITTED: &str = "merges_submitted_total";
/// Abandoned merges counter metric name.
pub const METRIC_MERGE_FAILURES: &str = "merge_failures_total";
/// Pairs awaiting merge.
pub const METRIC_SETTLEMENT_QUEUE_DEPTH: &str = "settlement_queue_depth";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_gauge!(
        METRIC_MARKETS_MONITORED,
        "Markets in the current catalog snapshot"
    );
    describe_gauge!(
        METRIC_SETTLEMENT_QUEUE_DEPTH,
        "Filled pairs waiting for their merge"
    );

    describe_counter!(
        METRIC_CATALOG_REFRESH_FAILURES,
        "Total catalog refresh failures"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_FOUND,
        "Total candidates that cleared spread evaluation"
    );
    describe_counter!(
        METRIC_RISK_REJECTIONS,
        "Total candidates rejected at admission, by reason"
    );
    describe_counter!(
        METRIC_EXEC_TRANSITIONS,
        "Total execution state transitions, by target state"
    );
    describe_counter!(METRIC_TRADES_COMPLETED, "Total trades with both legs filled");
    describe_counter!(METRIC_UNWIND_ATTEMPTS, "Total emergency sell attempts");
    describe_counter!(
        METRIC_UNWIND_FAILURES,
        "Total unwind sequences that exhausted their retries"
    );
    describe_counter!(METRIC_TRADING_HALTS, "Total trading halt trips");
    describe_counter!(
        METRIC_STALE_QUOTES_SKIPPED,
        "Total evaluations skipped on stale quotes"
    );
    describe_counter!(
        METRIC_RATE_LIMIT_TIGHTENED,
        "Total multiplicative rate reductions after venue 429s, by bucket"
    );
    describe_counter!(METRIC_MERGES_SUBMITTED, "Total pair merges submitted");
    describe_counter!(
        METRIC_MERGE_FAILURES,
        "Total pair merges abandoned after retries"
    );
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total WebSocket messages received"
    );
    describe_counter!(METRIC_WS_RECONNECTS, "Total WebSocket reconnections");

    debug!("Metrics initialized");
}

/// Set the markets-monitored gauge.
pub fn set_markets_monitored(count: usize) {
    gauge!(METRIC_MARKETS_MONITORED).set(count as f64);
}

/// Set the settlement queue depth gauge.
pub fn set_settlement_queue_depth(count: usize) {
    gauge!(METRIC_SETTLEMENT_QUEUE_DEPTH).set(count as f64);
}

/// Increment the catalog refresh failure counter.
pub fn inc_catalog_refresh_failure() {
    counter!(METRIC_CATALOG_REFRESH_FAILURES).increment(1);
}

/// Increment the opportunities found counter.
pub fn inc_opportunity_found() {
    counter!(METRIC_OPPORTUNITIES_FOUND).increment(1);
}

/// Increment the risk rejection counter for a reason.
pub fn inc_risk_rejection(reason: &'static str) {
    counter!(METRIC_RISK_REJECTIONS, "reason" => reason).increment(1);
}

/// Increment the state transition counter for the entered state.
pub fn inc_exec_transition(state: &str) {
    counter!(METRIC_EXEC_TRANSITIONS, "state" => state.to_string()).increment(1);
}

/// Increment the completed trades counter.
pub fn inc_trade_completed() {
    counter!(METRIC_TRADES_COMPLETED).increment(1);
}

/// Increment the emergency sell attempt counter.
pub fn inc_unwind_attempt() {
    counter!(METRIC_UNWIND_ATTEMPTS).increment(1);
}

/// Increment the exhausted unwind counter.
pub fn inc_unwind_failure() {
    counter!(METRIC_UNWIND_FAILURES).increment(1);
}

/// Increment the trading halt counter.
pub fn inc_trading_halt() {
    counter!(METRIC_TRADING_HALTS).increment(1);
}

/// Increment the stale quote skip counter.
pub fn inc_stale_quote_skipped() {
    counter!(METRIC_STALE_QUOTES_SKIPPED).increment(1);
}

/// Increment the rate tightening counter for a bucket.
pub fn inc_rate_limit_tightened(bucket: &'static str) {
    counter!(METRIC_RATE_LIMIT_TIGHTENED, "bucket" => bucket).increment(1);
}

/// Increment the merges submitted counter.
pub fn inc_merge_submitted() {
    counter!(METRIC_MERGES_SUBMITTED).increment(1);
}

/// Increment the abandoned merge counter.
pub fn inc_merge_failure() {
    counter!(METRIC_MERGE_FAILURES).increment(1);
}

/// Increment the WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment the WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}
