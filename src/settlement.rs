//! Settlement: merging held YES/NO pairs back to collateral.
//!
//! Completed executions arrive on a queue. Each pair waits out a settle
//! delay so the fills reach on-chain finality, then merges are flushed in
//! batches. A merge that ultimately fails is logged and dropped, never
//! escalated: an unmerged pair still pays out $1.00 per share at resolution,
//! so capital is delayed, not lost.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::metrics;
use crate::venue::Settler;

/// Merge attempts per pair before giving up.
const MERGE_MAX_ATTEMPTS: u32 = 3;
/// Gap between merge attempts.
const MERGE_RETRY_GAP: Duration = Duration::from_secs(2);
/// Queue depth; the executor never blocks on settlement.
const QUEUE_DEPTH: usize = 256;

/// One filled YES/NO pair awaiting merge.
#[derive(Debug, Clone)]
pub struct CompletedPair {
    /// Market (condition) id to merge under.
    pub market_id: String,
    /// Pair count to merge, the smaller of the two actual fills.
    pub size: Decimal,
    /// When both fills were confirmed.
    pub filled_at: Instant,
}

impl CompletedPair {
    /// A pair completed now.
    pub fn new(market_id: impl Into<String>, size: Decimal) -> Self {
        Self {
            market_id: market_id.into(),
            size,
            filled_at: Instant::now(),
        }
    }
}

/// Settlement behavior knobs, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct SettlementSettings {
    /// Wait after fill confirmation before merging.
    pub settle_delay: Duration,
    /// Flush as soon as this many pairs are ready.
    pub batch_size: usize,
    /// Flush at least this often regardless of batch size.
    pub flush_interval: Duration,
}

impl SettlementSettings {
    /// Build settings from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            settle_delay: Duration::from_secs(config.settle_delay_secs),
            batch_size: config.settlement_batch_size,
            flush_interval: Duration::from_secs(config.settlement_flush_secs),
        }
    }
}

/// Background task that drains the completed-pair queue into merges.
pub struct SettlementManager {
    settler: Arc<dyn Settler>,
    settings: SettlementSettings,
    rx: mpsc::Receiver<CompletedPair>,
    pending: Vec<CompletedPair>,
}

impl SettlementManager {
    /// Build the manager and the sender the executor pushes into.
    pub fn new(
        settler: Arc<dyn Settler>,
        settings: SettlementSettings,
    ) -> (mpsc::Sender<CompletedPair>, Self) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (
            tx,
            Self {
                settler,
                settings,
                rx,
                pending: Vec::new(),
            },
        )
    }

    /// Run until shutdown, then drain whatever is still queued.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                pair = self.rx.recv() => {
                    match pair {
                        Some(pair) => {
                            info!(market_id = %pair.market_id, size = %pair.size, "pair queued for merge");
                            self.pending.push(pair);
                            if self.ready_count() >= self.settings.batch_size {
                                self.flush().await;
                            }
                        }
                        // All senders dropped; nothing more will arrive.
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Collect any pairs still in the channel before the final drain.
        while let Ok(pair) = self.rx.try_recv() {
            self.pending.push(pair);
        }
        self.drain().await;
    }

    fn ready_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|p| p.filled_at.elapsed() >= self.settings.settle_delay)
            .count()
    }

    /// Merge every pair whose settle delay has elapsed; keep the rest queued.
    async fn flush(&mut self) {
        let delay = self.settings.settle_delay;
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.filled_at.elapsed() >= delay);
        self.pending = waiting;

        for pair in ready {
            self.merge_with_retry(&pair).await;
        }
        metrics::set_settlement_queue_depth(self.pending.len());
    }

    /// Final drain at shutdown: wait out remaining delays, then merge all.
    async fn drain(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        info!(queued = self.pending.len(), "draining settlement queue");

        let delay = self.settings.settle_delay;
        if let Some(youngest) = self.pending.iter().map(|p| p.filled_at).max() {
            let elapsed = youngest.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        let pending = std::mem::take(&mut self.pending);
        for pair in pending {
            self.merge_with_retry(&pair).await;
        }
        metrics::set_settlement_queue_depth(0);
    }

    #[instrument(skip(self, pair), fields(market_id = %pair.market_id, size = %pair.size))]
    async fn merge_with_retry(&self, pair: &CompletedPair) {
        for attempt in 1..=MERGE_MAX_ATTEMPTS {
            match self.settler.merge_tokens(&pair.market_id, pair.size).await {
                Ok(tx_ref) => {
                    info!(%tx_ref, attempt, "pair merged to collateral");
                    metrics::inc_merge_submitted();
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "merge attempt failed");
                    if attempt < MERGE_MAX_ATTEMPTS {
                        tokio::time::sleep(MERGE_RETRY_GAP).await;
                    }
                }
            }
        }
        // The pair still resolves to $1.00 per share at market resolution.
        warn!("merge abandoned after retries; pair will pay out at resolution");
        metrics::inc_merge_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::venue::MockVenue;

    fn settings() -> SettlementSettings {
        SettlementSettings {
            settle_delay: Duration::from_secs(10),
            batch_size: 5,
            flush_interval: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn merge_waits_out_the_settle_delay() {
        let venue = Arc::new(MockVenue::new());
        let (tx, manager) = SettlementManager::new(venue.clone(), settings());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(manager.run(shutdown_rx));

        tx.send(CompletedPair::new("mkt-1", dec!(10))).await.unwrap();

        // Before the delay elapses a flush tick must not merge.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(venue.merge_calls().is_empty());

        // Past the delay the next flush picks it up.
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(venue.merge_calls(), vec![("mkt-1".to_string(), dec!(10))]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_queued_pairs() {
        let venue = Arc::new(MockVenue::new());
        let (tx, manager) = SettlementManager::new(venue.clone(), settings());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(manager.run(shutdown_rx));

        tx.send(CompletedPair::new("mkt-1", dec!(10))).await.unwrap();
        tx.send(CompletedPair::new("mkt-2", dec!(7))).await.unwrap();
        tokio::task::yield_now().await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let calls = venue.merge_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&("mkt-1".to_string(), dec!(10))));
        assert!(calls.contains(&("mkt-2".to_string(), dec!(7))));
    }

    #[tokio::test(start_paused = true)]
    async fn merge_failure_is_retried_then_abandoned() {
        let venue = Arc::new(MockVenue::new());
        venue.fail_merges("rpc unavailable");
        let (tx, manager) = SettlementManager::new(venue.clone(), settings());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(manager.run(shutdown_rx));

        tx.send(CompletedPair::new("mkt-1", dec!(10))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // Three attempts recorded, no panic, task exits cleanly.
        assert_eq!(venue.merge_calls().len(), MERGE_MAX_ATTEMPTS as usize);
    }
}
