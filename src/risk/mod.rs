//! Risk controls: admission checks, duplicate-trade prevention, and the
//! process-wide trading halt.

pub mod dedup;
pub mod gate;
pub mod halt;

pub use dedup::DedupSet;
pub use gate::{Admission, RiskGate};
pub use halt::{HaltReason, TradingHalt};
