//! Per-market execution mutual exclusion.
//!
//! A market id is reserved atomically before any network call and stays
//! reserved while an execution is in flight or a position is held. Reserve
//! and release are the only mutations; the single check-and-set under one
//! lock is what makes concurrent admissions for the same market impossible.

use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;
use tracing::debug;

use crate::catalog::Market;

/// Set of market ids with an execution in flight or a position held.
#[derive(Debug, Default)]
pub struct DedupSet {
    slots: Mutex<HashMap<String, OffsetDateTime>>,
}

impl DedupSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically reserve the market's slot. False if already held.
    pub fn try_reserve(&self, market: &Market) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(&market.id) {
            return false;
        }
        slots.insert(market.id.clone(), market.deadline);
        true
    }

    /// Release a slot. Only for executions that ended with no position.
    pub fn release(&self, market_id: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.remove(market_id).is_some() {
            debug!(market_id, "dedup slot released");
        }
    }

    /// Whether the market currently holds a slot.
    pub fn contains(&self, market_id: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.contains_key(market_id)
    }

    /// Drop slots whose market deadline has passed. Returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|_, deadline| *deadline > now);
        before - slots.len()
    }

    /// Number of held slots.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.len()
    }

    /// Whether no slots are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Coin, Timeframe};
    use std::sync::Arc;
    use time::macros::datetime;
    use time::Duration;

    fn market_with_deadline(id: &str, deadline: OffsetDateTime) -> Market {
        Market {
            id: id.to_string(),
            slug: format!("{}-slug", id),
            question: String::new(),
            timeframe: Timeframe::M15,
            coin: Coin::Btc,
            yes_token_id: format!("{}-yes", id),
            no_token_id: format!("{}-no", id),
            deadline,
        }
    }

    #[test]
    fn reserve_is_exclusive_until_released() {
        let dedup = DedupSet::new();
        let market = market_with_deadline("m1", datetime!(2030-01-01 00:00 UTC));

        assert!(dedup.try_reserve(&market));
        assert!(!dedup.try_reserve(&market));
        assert!(dedup.contains("m1"));

        dedup.release("m1");
        assert!(dedup.try_reserve(&market));
    }

    #[test]
    fn purge_drops_only_expired_slots() {
        let dedup = DedupSet::new();
        let now = OffsetDateTime::now_utc();
        let expired = market_with_deadline("old", now - Duration::minutes(5));
        let live = market_with_deadline("new", now + Duration::minutes(5));

        assert!(dedup.try_reserve(&expired));
        assert!(dedup.try_reserve(&live));

        assert_eq!(dedup.purge_expired(), 1);
        assert!(!dedup.contains("old"));
        assert!(dedup.contains("new"));
    }

    #[test]
    fn concurrent_reservations_admit_exactly_one() {
        let dedup = Arc::new(DedupSet::new());
        let market = Arc::new(market_with_deadline("m1", datetime!(2030-01-01 00:00 UTC)));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let dedup = Arc::clone(&dedup);
            let market = Arc::clone(&market);
            handles.push(std::thread::spawn(move || dedup.try_reserve(&market)));
        }

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|&reserved| reserved)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(dedup.len(), 1);
    }
}
