use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Propagation calls, one per replica per round.
pub const PROPAGATE_CALLS: &str = "propagate-calls";
/// Swap evaluations (accepted or not).
pub const SWAP_CALLS: &str = "swap-calls";
/// Accepted swaps.
pub const SWAP_ACCEPTS: &str = "swap-accepts";
/// Completed rounds.
pub const ROUND_COUNT: &str = "round-count";
/// Parallel-map operator invocations.
pub const PARALLEL_MAP_CALLS: &str = "parallel-map-calls";
/// Sequence operator invocations.
pub const SEQUENCE_CALLS: &str = "sequence-calls";
/// Loop operator invocations.
pub const LOOP_CALLS: &str = "loop-calls";
/// Merge invocations.
pub const MERGE_CALLS: &str = "merge-calls";

/// Named invocation counters, safe to bump from worker threads.
///
/// Counters are write-only during a run and never consulted for control flow.
#[derive(Debug, Default)]
pub struct Counters {
    inner: Mutex<BTreeMap<String, u64>>,
}

impl Counters {
    /// Creates an empty counter table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to `name`.
    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    /// Adds `amount` to `name`.
    pub fn add(&self, name: &str, amount: u64) {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *table.entry(name.to_string()).or_insert(0) += amount;
    }

    /// Current value of `name`, zero when never touched.
    pub fn get(&self, name: &str) -> u64 {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        table.get(name).copied().unwrap_or(0)
    }

    /// Copy of every counter.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
