//! Market catalog: discovery, refresh, and scan-mode rotation.
//!
//! The catalog owns the set of markets the scanner is allowed to look at.
//! A background task refreshes it periodically; refresh failures keep the
//! previous snapshot live until a staleness ceiling is hit, after which the
//! snapshot reads as empty and scanning pauses until a refresh succeeds.

pub mod discovery;
pub mod types;

pub use types::{detect_coin, Coin, Market, ScanMode, Side, Timeframe};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::CatalogError;
use crate::metrics;

/// Catalog behavior knobs, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// Gamma API base URL.
    pub gamma_url: String,
    /// Scan mode: fixed, or auto-rotating between the two.
    pub mode: ModePolicy,
    /// Timeframes queried in crypto mode.
    pub timeframes: Vec<Timeframe>,
    /// Refresh period.
    pub refresh_interval: Duration,
    /// Consecutive failures tolerated before the snapshot reads as empty.
    pub max_failures: u32,
    /// Markets resolving sooner than this are excluded.
    pub min_time_to_resolution_secs: i64,
}

/// Fixed mode or auto-rotation with per-mode dwell times.
#[derive(Debug, Clone)]
pub enum ModePolicy {
    /// Always scan the same universe.
    Fixed(ScanMode),
    /// Alternate between universes.
    Auto {
        /// Dwell time in crypto mode.
        crypto_interval: Duration,
        /// Dwell time in all-binary mode.
        all_interval: Duration,
    },
}

impl CatalogSettings {
    /// Build settings from the application config.
    pub fn from_config(config: &Config) -> Self {
        let mode = match config.scan_mode.as_str() {
            "crypto" => ModePolicy::Fixed(ScanMode::CryptoOnly),
            "all" => ModePolicy::Fixed(ScanMode::AllBinary),
            _ => ModePolicy::Auto {
                crypto_interval: Duration::from_secs(config.crypto_mode_secs),
                all_interval: Duration::from_secs(config.all_mode_secs),
            },
        };

        let mut timeframes = Vec::new();
        if config.enable_15m {
            timeframes.push(Timeframe::M15);
        }
        if config.enable_1h {
            timeframes.push(Timeframe::H1);
        }
        if config.enable_4h {
            timeframes.push(Timeframe::H4);
        }
        if config.enable_daily {
            timeframes.push(Timeframe::Daily);
        }

        Self {
            gamma_url: config.gamma_url.clone(),
            mode,
            timeframes,
            refresh_interval: Duration::from_secs(config.catalog_refresh_secs),
            max_failures: config.max_catalog_failures,
            min_time_to_resolution_secs: config.min_time_to_resolution_secs,
        }
    }
}

/// The live market set plus the mode it was fetched under.
#[derive(Debug, Default)]
struct Snapshot {
    markets: Vec<Arc<Market>>,
    mode: Option<ScanMode>,
}

/// Periodically refreshed set of scannable markets.
pub struct MarketCatalog {
    client: reqwest::Client,
    settings: CatalogSettings,
    snapshot: RwLock<Snapshot>,
    consecutive_failures: AtomicU32,
    mode: RwLock<ScanMode>,
}

impl MarketCatalog {
    /// Create an empty catalog. Call [`refresh`](Self::refresh) or spawn
    /// [`run`](Self::run) to populate it.
    pub fn new(client: reqwest::Client, settings: CatalogSettings) -> Self {
        let initial_mode = match settings.mode {
            ModePolicy::Fixed(mode) => mode,
            ModePolicy::Auto { .. } => ScanMode::CryptoOnly,
        };
        Self {
            client,
            settings,
            snapshot: RwLock::new(Snapshot::default()),
            consecutive_failures: AtomicU32::new(0),
            mode: RwLock::new(initial_mode),
        }
    }

    /// The scan mode the catalog is currently operating under.
    pub async fn current_mode(&self) -> ScanMode {
        *self.mode.read().await
    }

    /// Whether refresh failures have exceeded the staleness ceiling.
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) >= self.settings.max_failures
    }

    /// Current market snapshot. Empty while the catalog is stale.
    pub async fn markets(&self) -> Vec<Arc<Market>> {
        if self.is_stale() {
            return Vec::new();
        }
        self.snapshot.read().await.markets.clone()
    }

    /// Number of markets currently monitored.
    pub async fn len(&self) -> usize {
        self.snapshot.read().await.markets.len()
    }

    /// Whether the catalog holds no markets.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every token id in the current snapshot, for feed subscriptions.
    pub async fn token_ids(&self) -> Vec<String> {
        let snapshot = self.snapshot.read().await;
        let mut ids = Vec::with_capacity(snapshot.markets.len() * 2);
        for market in &snapshot.markets {
            ids.push(market.yes_token_id.clone());
            ids.push(market.no_token_id.clone());
        }
        ids
    }

    /// Fetch a fresh market set for the current mode and swap it in.
    ///
    /// On failure the previous snapshot stays live and the failure counter
    /// increments; on success the counter resets.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize, CatalogError> {
        let mode = *self.mode.read().await;

        let result = match mode {
            ScanMode::CryptoOnly => {
                discovery::fetch_crypto_markets(
                    &self.client,
                    &self.settings.gamma_url,
                    &self.settings.timeframes,
                )
                .await
            }
            ScanMode::AllBinary => {
                discovery::fetch_all_binary_markets(&self.client, &self.settings.gamma_url).await
            }
        };

        match result {
            Ok(markets) => {
                let markets: Vec<Arc<Market>> = markets
                    .into_iter()
                    .filter(|m| {
                        m.seconds_to_resolution() > self.settings.min_time_to_resolution_secs
                    })
                    .map(Arc::new)
                    .collect();

                let count = markets.len();
                let mut snapshot = self.snapshot.write().await;
                snapshot.markets = markets;
                snapshot.mode = Some(mode);
                drop(snapshot);

                self.consecutive_failures.store(0, Ordering::Relaxed);
                metrics::set_markets_monitored(count);
                info!(%mode, count, "catalog refreshed");
                Ok(count)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::inc_catalog_refresh_failure();
                if failures >= self.settings.max_failures {
                    error!(%mode, failures, error = %e, "catalog stale, scanning paused");
                } else {
                    warn!(%mode, failures, error = %e, "catalog refresh failed, keeping previous snapshot");
                }
                Err(e)
            }
        }
    }

    /// Swap in a fixed market set directly, bypassing discovery.
    #[cfg(test)]
    pub(crate) async fn install_markets(&self, markets: Vec<Arc<Market>>) {
        self.snapshot.write().await.markets = markets;
    }

    /// Rotate the scan mode if the auto policy says it is due.
    async fn maybe_rotate_mode(&self, mode_started: &mut Instant) {
        let ModePolicy::Auto {
            crypto_interval,
            all_interval,
        } = self.settings.mode
        else {
            return;
        };

        let current = *self.mode.read().await;
        let dwell = match current {
            ScanMode::CryptoOnly => crypto_interval,
            ScanMode::AllBinary => all_interval,
        };

        if mode_started.elapsed() >= dwell {
            let next = match current {
                ScanMode::CryptoOnly => ScanMode::AllBinary,
                ScanMode::AllBinary => ScanMode::CryptoOnly,
            };
            *self.mode.write().await = next;
            *mode_started = Instant::now();
            info!(from = %current, to = %next, "scan mode rotated");
        }
    }

    /// Refresh loop. Runs until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut mode_started = Instant::now();
        let mut ticker = tokio::time::interval(self.settings.refresh_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.maybe_rotate_mode(&mut mode_started).await;
                    // Errors already logged and counted inside refresh.
                    let _ = self.refresh().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("catalog refresh task stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn settings() -> CatalogSettings {
        CatalogSettings {
            gamma_url: "http://localhost:0".to_string(),
            mode: ModePolicy::Fixed(ScanMode::CryptoOnly),
            timeframes: vec![Timeframe::M15],
            refresh_interval: Duration::from_secs(60),
            max_failures: 3,
            min_time_to_resolution_secs: 120,
        }
    }

    fn sample_market(id: &str) -> Market {
        Market {
            id: id.to_string(),
            slug: format!("{}-slug", id),
            question: "Bitcoin Up or Down?".to_string(),
            timeframe: Timeframe::M15,
            coin: Coin::Btc,
            yes_token_id: format!("{}-yes", id),
            no_token_id: format!("{}-no", id),
            deadline: datetime!(2030-01-01 00:00 UTC),
        }
    }

    #[tokio::test]
    async fn stale_catalog_reads_empty() {
        let catalog = MarketCatalog::new(reqwest::Client::new(), settings());

        {
            let mut snapshot = catalog.snapshot.write().await;
            snapshot.markets = vec![Arc::new(sample_market("m1"))];
        }
        assert_eq!(catalog.markets().await.len(), 1);

        catalog.consecutive_failures.store(3, Ordering::Relaxed);
        assert!(catalog.is_stale());
        assert!(catalog.markets().await.is_empty());

        // A recovery clears the gate.
        catalog.consecutive_failures.store(0, Ordering::Relaxed);
        assert_eq!(catalog.markets().await.len(), 1);
    }

    #[tokio::test]
    async fn token_ids_cover_both_sides() {
        let catalog = MarketCatalog::new(reqwest::Client::new(), settings());
        {
            let mut snapshot = catalog.snapshot.write().await;
            snapshot.markets = vec![Arc::new(sample_market("m1")), Arc::new(sample_market("m2"))];
        }

        let ids = catalog.token_ids().await;
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(&"m1-yes".to_string()));
        assert!(ids.contains(&"m2-no".to_string()));
    }
}
