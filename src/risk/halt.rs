//! Process-wide trading halt.
//!
//! Once tripped, no new executions are admitted anywhere in the process.
//! In-flight executions still run to a terminal state. The halt is one-way;
//! clearing it means restarting with the fault investigated.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use tracing::{error, warn};

use crate::metrics;

/// Why the halt tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Consecutive unwind failures reached the configured threshold.
    SustainedUnwindFailure {
        /// How many failures in a row.
        consecutive: u32,
    },
    /// Venue rejected our credentials.
    VenueAuthFailure(String),
    /// Operator-initiated or other explicit cause.
    Manual(String),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::SustainedUnwindFailure { consecutive } => {
                write!(f, "sustained unwind failure ({} consecutive)", consecutive)
            }
            HaltReason::VenueAuthFailure(msg) => write!(f, "venue auth failure: {}", msg),
            HaltReason::Manual(msg) => write!(f, "manual halt: {}", msg),
        }
    }
}

/// One-way halt switch shared by every scan task.
#[derive(Debug)]
pub struct TradingHalt {
    halted: AtomicBool,
    reason: Mutex<Option<HaltReason>>,
    consecutive_unwind_failures: AtomicU32,
    unwind_failure_threshold: u32,
}

impl TradingHalt {
    /// Create an untripped halt.
    pub fn new(unwind_failure_threshold: u32) -> Self {
        Self {
            halted: AtomicBool::new(false),
            reason: Mutex::new(None),
            consecutive_unwind_failures: AtomicU32::new(0),
            unwind_failure_threshold,
        }
    }

    /// Whether admission is blocked.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// The reason the halt tripped, if it has.
    pub fn reason(&self) -> Option<HaltReason> {
        self.reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Trip the halt.
    pub fn trip(&self, reason: HaltReason) {
        let mut guard = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        if !self.halted.swap(true, Ordering::SeqCst) {
            error!(%reason, "TRADING HALTED");
            metrics::inc_trading_halt();
            *guard = Some(reason);
        }
    }

    /// Record a failed unwind. Trips the halt at the threshold.
    pub fn record_unwind_failure(&self) {
        let consecutive = self
            .consecutive_unwind_failures
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        warn!(consecutive, "unwind failure recorded");
        if consecutive >= self.unwind_failure_threshold {
            self.trip(HaltReason::SustainedUnwindFailure { consecutive });
        }
    }

    /// Record a successful unwind, resetting the failure streak.
    pub fn record_unwind_success(&self) {
        self.consecutive_unwind_failures.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_trips_once_and_keeps_first_reason() {
        let halt = TradingHalt::new(2);
        assert!(!halt.is_halted());

        halt.trip(HaltReason::Manual("first".to_string()));
        halt.trip(HaltReason::Manual("second".to_string()));

        assert!(halt.is_halted());
        assert_eq!(halt.reason(), Some(HaltReason::Manual("first".to_string())));
    }

    #[test]
    fn unwind_failures_trip_at_threshold() {
        let halt = TradingHalt::new(2);

        halt.record_unwind_failure();
        assert!(!halt.is_halted());

        halt.record_unwind_failure();
        assert!(halt.is_halted());
        assert!(matches!(
            halt.reason(),
            Some(HaltReason::SustainedUnwindFailure { consecutive: 2 })
        ));
    }

    #[test]
    fn unwind_success_resets_the_streak() {
        let halt = TradingHalt::new(2);

        halt.record_unwind_failure();
        halt.record_unwind_success();
        halt.record_unwind_failure();

        assert!(!halt.is_halted());
    }
}
