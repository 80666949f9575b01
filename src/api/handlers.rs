//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::EngineStats;
use crate::risk::TradingHalt;

/// Point-in-time status fields, refreshed by a background task.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// Active scan mode.
    pub scan_mode: String,
    /// Markets in the current catalog snapshot.
    pub markets_monitored: usize,
    /// Trades with both legs filled.
    pub trades_completed: usize,
    /// Simulated balance, present in dry-run operation.
    pub sim_balance: Option<String>,
}

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the engine is scanning.
    pub ready: Arc<AtomicBool>,
    /// Scan loop counters.
    pub stats: Arc<EngineStats>,
    /// Process-wide trading halt.
    pub halt: Arc<TradingHalt>,
    /// Slow-moving status fields.
    pub snapshot: Arc<tokio::sync::RwLock<StatusSnapshot>>,
}

impl AppState {
    /// Create new app state with empty counters.
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(EngineStats::default()),
            halt: Arc::new(TradingHalt::new(u32::MAX)),
            snapshot: Arc::new(tokio::sync::RwLock::new(StatusSnapshot::default())),
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the engine is scanning.
    pub ready: bool,
    /// Whether admission is halted.
    pub halted: bool,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Active scan mode.
    pub scan_mode: String,
    /// Halt reason, when admission is halted.
    pub halt_reason: Option<String>,
    /// Statistics.
    pub stats: StatsResponse,
}

/// Statistics in status response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Markets in the current catalog snapshot.
    pub markets_monitored: usize,
    /// Market evaluations performed.
    pub checks_performed: u64,
    /// Candidates that cleared evaluation.
    pub opportunities_found: u64,
    /// Trades with both legs filled.
    pub trades_completed: usize,
    /// Tightest combined ask seen, as a string.
    pub best_spread: Option<String>,
    /// Simulated balance, present in dry-run operation.
    pub sim_balance: Option<String>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        halted: state.halt.is_halted(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns engine status and statistics.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await.clone();

    let status = if state.halt.is_halted() {
        "halted"
    } else if state.is_ready() {
        "running"
    } else {
        "starting"
    };

    Json(StatusResponse {
        status,
        scan_mode: snapshot.scan_mode,
        halt_reason: state.halt.reason().map(|r| r.to_string()),
        stats: StatsResponse {
            markets_monitored: snapshot.markets_monitored,
            checks_performed: state.stats.checks.load(Ordering::Relaxed),
            opportunities_found: state.stats.opportunities.load(Ordering::Relaxed),
            trades_completed: snapshot.trades_completed,
            best_spread: state.stats.best_spread().map(|s| s.to_string()),
            sim_balance: snapshot.sim_balance,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
