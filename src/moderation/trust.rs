//! Consecutive-ham counters that promote a sender to approved.

use std::collections::HashMap;

use dashmap::DashMap;
use teloxide::types::UserId;

/// Ham messages needed for automatic approval.
pub const PROMOTION_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
pub struct TrustCounters {
    counts: DashMap<u64, u32>,
}

impl TrustCounters {
    pub fn restore(counts: HashMap<u64, u32>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
        }
    }

    /// Count one ham message. Returns `true` exactly once, when the user
    /// reaches the threshold; the counter is gone afterwards.
    pub fn record_ham(&self, user: UserId) -> bool {
        *self.counts.entry(user.0).or_insert(0) += 1;
        self.counts
            .remove_if(&user.0, |_, count| *count >= PROMOTION_THRESHOLD)
            .is_some()
    }

    #[cfg(test)]
    pub fn get(&self, user: UserId) -> Option<u32> {
        self.counts.get(&user.0).map(|c| *c)
    }

    pub fn snapshot(&self) -> HashMap<u64, u32> {
        self.counts.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.counts.len()
    }
}
