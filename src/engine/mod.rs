//! Scan-evaluate-execute loop.
//!
//! Each tick walks the current catalog snapshot, prices every market with a
//! fresh pair quote, and hands admitted candidates to the executor as
//! spawned tasks. Shutdown stops admission immediately but waits for every
//! in-flight execution to reach a terminal state before returning.

pub mod evaluator;
pub mod executor;
pub mod state;

pub use evaluator::{evaluate, EvalSettings, TradeCandidate};
pub use executor::{ExecSettings, OrderExecutor};
pub use state::{ExecState, ExecutionRecord, Leg, LegOutcome, LegResult};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::catalog::MarketCatalog;
use crate::config::Config;
use crate::metrics;
use crate::quotes::QuoteFeed;
use crate::risk::RiskGate;

/// Running counters for the status endpoint.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Market evaluations performed.
    pub checks: AtomicU64,
    /// Candidates that cleared evaluation.
    pub opportunities: AtomicU64,
    /// Scan passes completed.
    pub scans: AtomicU64,
    best_spread: Mutex<Option<Decimal>>,
}

impl EngineStats {
    /// Tightest combined ask seen so far.
    pub fn best_spread(&self) -> Option<Decimal> {
        *self.best_spread.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn note_spread(&self, combined: Decimal) {
        let mut best = self.best_spread.lock().unwrap_or_else(|e| e.into_inner());
        if best.map_or(true, |b| combined < b) {
            *best = Some(combined);
        }
    }
}

/// The scan loop over catalog, feed, gate, and executor.
pub struct Engine {
    catalog: Arc<MarketCatalog>,
    feed: Arc<QuoteFeed>,
    gate: Arc<RiskGate>,
    executor: Arc<OrderExecutor>,
    settings: EvalSettings,
    scan_interval: Duration,
    stats: Arc<EngineStats>,
}

impl Engine {
    /// Wire the loop over its collaborators.
    pub fn new(
        catalog: Arc<MarketCatalog>,
        feed: Arc<QuoteFeed>,
        gate: Arc<RiskGate>,
        executor: Arc<OrderExecutor>,
        config: &Config,
    ) -> Self {
        Self {
            catalog,
            feed,
            gate,
            executor,
            settings: EvalSettings::from_config(config),
            scan_interval: Duration::from_millis(config.poll_interval_ms),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Shared counters for the status endpoint.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Run until shutdown, then drain in-flight executions.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<ExecutionRecord> = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan_once(&mut in_flight).await;
                    // Reap finished executions so the set stays small.
                    while let Some(result) = in_flight.try_join_next() {
                        if let Err(e) = result {
                            debug!(error = %e, "execution task ended abnormally");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(count = in_flight.len(), "draining in-flight executions");
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                debug!(error = %e, "execution task ended abnormally");
            }
        }
        info!("scan loop stopped");
    }

    /// One pass over the catalog snapshot.
    async fn scan_once(&self, in_flight: &mut JoinSet<ExecutionRecord>) {
        let markets = self.catalog.markets().await;
        for market in markets {
            // Markets without two individually fresh sides are skipped, not
            // priced at zero.
            let Some(pair) = self.feed.pair_quote(&market) else {
                continue;
            };
            self.stats.checks.fetch_add(1, Ordering::Relaxed);
            self.stats.note_spread(pair.combined());

            let Some(candidate) = evaluate(&market, &pair, &self.settings) else {
                continue;
            };
            self.stats.opportunities.fetch_add(1, Ordering::Relaxed);
            metrics::inc_opportunity_found();

            match self.gate.admit(&candidate).await {
                Ok(admission) => {
                    let executor = Arc::clone(&self.executor);
                    in_flight.spawn(async move { executor.execute(candidate, admission).await });
                }
                // Rejections are logged and counted inside the gate.
                Err(_) => continue,
            }
        }
        self.stats.scans.fetch_add(1, Ordering::Relaxed);
    }
}
