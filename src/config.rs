//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Venue Credentials (L2 API) ===
    /// Funder/proxy wallet address sent in auth headers.
    #[serde(default)]
    pub poly_address: Option<String>,

    /// L2 API key.
    #[serde(default)]
    pub poly_api_key: Option<String>,

    /// L2 API secret (base64).
    #[serde(default)]
    pub poly_api_secret: Option<String>,

    /// L2 API passphrase.
    #[serde(default)]
    pub poly_passphrase: Option<String>,

    // === Trading Parameters ===
    /// Combined YES+NO ask must be strictly below this to trade (e.g., 0.99).
    #[serde(default = "default_min_spread_target")]
    pub min_spread_target: Decimal,

    /// Minimum implied profit per share, after the spread check.
    #[serde(default = "default_profit_threshold")]
    pub profit_threshold: Decimal,

    /// Target dollar outlay per trade; sizing divides this by combined cost.
    #[serde(default = "default_bet_size")]
    pub bet_size: Decimal,

    /// Reject trades sized below this many shares.
    #[serde(default = "default_min_shares")]
    pub min_shares: u64,

    /// Fractional slippage padding applied to limit prices (0.003 = 0.3%).
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance: Decimal,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Starting balance for simulation.
    #[serde(default = "default_sim_balance")]
    pub sim_balance: Decimal,

    // === Market Catalog ===
    /// Scan mode: "crypto", "all", or "auto" (alternate between the two).
    #[serde(default = "default_scan_mode")]
    pub scan_mode: String,

    /// Enable 15-minute markets.
    #[serde(default = "default_true")]
    pub enable_15m: bool,

    /// Enable hourly markets.
    #[serde(default = "default_true")]
    pub enable_1h: bool,

    /// Enable 4-hour markets.
    #[serde(default)]
    pub enable_4h: bool,

    /// Enable daily markets.
    #[serde(default)]
    pub enable_daily: bool,

    /// Seconds between catalog refreshes.
    #[serde(default = "default_catalog_refresh_secs")]
    pub catalog_refresh_secs: u64,

    /// Consecutive refresh failures allowed before scanning pauses.
    #[serde(default = "default_max_catalog_failures")]
    pub max_catalog_failures: u32,

    /// Skip markets resolving within this many seconds.
    #[serde(default = "default_min_time_to_resolution_secs")]
    pub min_time_to_resolution_secs: i64,

    /// Seconds spent in crypto mode before auto-switching.
    #[serde(default = "default_crypto_mode_secs")]
    pub crypto_mode_secs: u64,

    /// Seconds spent in all-binary mode before auto-switching.
    #[serde(default = "default_all_mode_secs")]
    pub all_mode_secs: u64,

    // === Quote Feed ===
    /// Enable WebSocket market feed instead of polling.
    #[serde(default)]
    pub use_wss: bool,

    /// Milliseconds between REST book polls per market.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quotes older than this are treated as absent.
    #[serde(default = "default_max_quote_staleness_ms")]
    pub max_quote_staleness_ms: u64,

    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub clob_url: String,

    /// Gamma (market discovery) API base URL.
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,

    /// Initial WebSocket reconnect delay in milliseconds.
    #[serde(default = "default_ws_reconnect_initial_ms")]
    pub ws_reconnect_initial_ms: u64,

    /// Maximum WebSocket reconnect delay in seconds.
    #[serde(default = "default_ws_reconnect_max_s")]
    pub ws_reconnect_max_s: u64,

    // === Rate Limits ===
    /// Steady-state quote polls per second.
    #[serde(default = "default_quote_rate_per_sec")]
    pub quote_rate_per_sec: f64,

    /// Quote bucket burst capacity.
    #[serde(default = "default_quote_burst")]
    pub quote_burst: f64,

    /// Steady-state order placements per second.
    #[serde(default = "default_order_rate_per_sec")]
    pub order_rate_per_sec: f64,

    /// Order bucket burst capacity.
    #[serde(default = "default_order_burst")]
    pub order_burst: f64,

    /// How long an order placement may wait for budget, in milliseconds.
    #[serde(default = "default_order_acquire_timeout_ms")]
    pub order_acquire_timeout_ms: u64,

    // === Execution ===
    /// Emergency-sell retry attempts before giving up.
    #[serde(default = "default_unwind_max_attempts")]
    pub unwind_max_attempts: u32,

    /// Gap between emergency-sell retries in milliseconds.
    #[serde(default = "default_unwind_retry_gap_ms")]
    pub unwind_retry_gap_ms: u64,

    /// Consecutive unwind failures before the process-wide halt trips.
    #[serde(default = "default_unwind_failure_halt_threshold")]
    pub unwind_failure_halt_threshold: u32,

    // === Settlement ===
    /// Seconds to wait after fills before merging a pair.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Merge once this many pairs have queued.
    #[serde(default = "default_settlement_batch_size")]
    pub settlement_batch_size: usize,

    /// Merge queued pairs at least this often, in seconds.
    #[serde(default = "default_settlement_flush_secs")]
    pub settlement_flush_secs: u64,

    // === Server Configuration ===
    /// HTTP server port for health/status endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable the Prometheus metrics exporter.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Port for the Prometheus metrics exporter.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_min_spread_target() -> Decimal {
    Decimal::new(99, 2) // 0.99
}

fn default_profit_threshold() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_bet_size() -> Decimal {
    Decimal::new(10, 0) // $10
}

fn default_min_shares() -> u64 {
    5
}

fn default_slippage_tolerance() -> Decimal {
    Decimal::new(3, 3) // 0.003
}

fn default_true() -> bool {
    true
}

fn default_sim_balance() -> Decimal {
    Decimal::new(100, 0) // $100
}

fn default_scan_mode() -> String {
    "auto".to_string()
}

fn default_catalog_refresh_secs() -> u64 {
    60
}

fn default_max_catalog_failures() -> u32 {
    5
}

fn default_min_time_to_resolution_secs() -> i64 {
    120
}

fn default_crypto_mode_secs() -> u64 {
    600
}

fn default_all_mode_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_quote_staleness_ms() -> u64 {
    2_000
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_ws_reconnect_initial_ms() -> u64 {
    500
}

fn default_ws_reconnect_max_s() -> u64 {
    30
}

fn default_quote_rate_per_sec() -> f64 {
    8.0
}

fn default_quote_burst() -> f64 {
    8.0
}

fn default_order_rate_per_sec() -> f64 {
    2.0
}

fn default_order_burst() -> f64 {
    4.0
}

fn default_order_acquire_timeout_ms() -> u64 {
    500
}

fn default_unwind_max_attempts() -> u32 {
    5
}

fn default_unwind_retry_gap_ms() -> u64 {
    3_000
}

fn default_unwind_failure_halt_threshold() -> u32 {
    2
}

fn default_settle_delay_secs() -> u64 {
    10
}

fn default_settlement_batch_size() -> usize {
    5
}

fn default_settlement_flush_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_spread_target <= Decimal::ZERO || self.min_spread_target >= Decimal::ONE {
            return Err("MIN_SPREAD_TARGET must be in (0, 1)".to_string());
        }

        if self.min_shares == 0 {
            return Err("MIN_SHARES must be at least 1".to_string());
        }

        if self.bet_size <= Decimal::ZERO {
            return Err("BET_SIZE must be positive".to_string());
        }

        if self.slippage_tolerance < Decimal::ZERO || self.slippage_tolerance > Decimal::new(5, 2) {
            return Err("SLIPPAGE_TOLERANCE must be in [0, 0.05]".to_string());
        }

        if !matches!(self.scan_mode.as_str(), "crypto" | "all" | "auto") {
            return Err("SCAN_MODE must be one of: crypto, all, auto".to_string());
        }

        if !(self.enable_15m || self.enable_1h || self.enable_4h || self.enable_daily) {
            return Err("at least one timeframe must be enabled".to_string());
        }

        if self.quote_rate_per_sec <= 0.0 || self.order_rate_per_sec <= 0.0 {
            return Err("rate limits must be positive".to_string());
        }

        if !self.dry_run {
            let creds_present = self.poly_address.is_some()
                && self.poly_api_key.is_some()
                && self.poly_api_secret.is_some()
                && self.poly_passphrase.is_some();
            if !creds_present {
                return Err(
                    "live trading requires POLY_ADDRESS, POLY_API_KEY, POLY_API_SECRET, POLY_PASSPHRASE"
                        .to_string(),
                );
            }
        }

        Ok(())
    }
}
