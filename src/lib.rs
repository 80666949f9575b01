//! Two-leg arbitrage engine for binary YES/NO prediction markets.
//!
//! The engine continuously scans a catalog of binary markets for pairs
//! whose YES and NO asks sum to less than $1.00. One side always pays
//! $1.00 per share at resolution, so buying both legs below that locks in
//! the spread:
//!
//! ```text
//! YES ask:  $0.48
//! NO ask:   $0.49
//! ─────────────────
//! Combined: $0.97 < $1.00
//! Profit:   $0.03 per share, whichever way the market resolves
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`catalog`]: Market discovery, refresh, and scan-mode rotation
//! - [`quotes`]: Quote feed with staleness gating; REST and WebSocket sources
//! - [`engine`]: Spread evaluation, execution state machine, order executor
//! - [`risk`]: Admission checks, dedup, and the trading halt
//! - [`limiter`]: Adaptive token-bucket rate budgets
//! - [`venue`]: Venue traits, the CLOB client, and the scripted test venue
//! - [`settlement`]: Merging filled pairs back to collateral
//! - [`api`]: HTTP API for health and status
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod quotes;
pub mod risk;
pub mod settlement;
pub mod utils;
pub mod venue;

pub use config::Config;
pub use error::{BotError, Result};
