//! Mutex-guarded metrics counters.
//!
//! The only intra-process shared mutable state outside a session. Counters
//! are monotonically increasing and snapshot-readable for exposure at the
//! boundary.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Counter: leaf stages executed.
pub const STAGES_TOTAL: &str = "stages_total";
/// Counter: leaf stages that returned an error.
pub const STAGE_ERRORS_TOTAL: &str = "stage_errors_total";
/// Counter: model runner invocations.
pub const MODEL_REQUESTS_TOTAL: &str = "model_requests_total";
/// Counter: model runner invocations that failed.
pub const MODEL_ERRORS_TOTAL: &str = "model_errors_total";
/// Counter: render job submissions attempted.
pub const RENDER_SUBMITS_TOTAL: &str = "render_submits_total";
/// Counter: polls that contacted the external render API.
pub const RENDER_POLLS_TOTAL: &str = "render_polls_total";
/// Counter: retrieval queries served.
pub const RETRIEVAL_QUERIES_TOTAL: &str = "retrieval_queries_total";
/// Counter: retrieval queries that returned no candidate above the floor.
pub const RETRIEVAL_EMPTY_TOTAL: &str = "retrieval_empty_total";

/// A registry of named monotonically-increasing counters.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<HashMap<String, u64>>,
}

impl MetricsRegistry {
    /// Creates a registry with all well-known counters at zero.
    #[must_use]
    pub fn new() -> Self {
        let mut counters = HashMap::new();
        for name in [
            STAGES_TOTAL,
            STAGE_ERRORS_TOTAL,
            MODEL_REQUESTS_TOTAL,
            MODEL_ERRORS_TOTAL,
            RENDER_SUBMITS_TOTAL,
            RENDER_POLLS_TOTAL,
            RETRIEVAL_QUERIES_TOTAL,
            RETRIEVAL_EMPTY_TOTAL,
        ] {
            counters.insert(name.to_string(), 0);
        }
        Self {
            counters: Mutex::new(counters),
        }
    }

    /// Increments a counter by one, creating it if unknown.
    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    /// Increments a counter by an amount, creating it if unknown.
    pub fn increment_by(&self, name: &str, amount: u64) {
        let mut counters = self.counters.lock();
        *counters.entry(name.to_string()).or_insert(0) += amount;
    }

    /// Reads a single counter (zero if never incremented).
    #[must_use]
    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Returns a copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_snapshot() {
        let metrics = MetricsRegistry::new();
        metrics.increment(STAGES_TOTAL);
        metrics.increment_by(STAGES_TOTAL, 2);
        assert_eq!(metrics.get(STAGES_TOTAL), 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get(STAGES_TOTAL), Some(&3));
        assert_eq!(snapshot.get(MODEL_ERRORS_TOTAL), Some(&0));
    }

    #[test]
    fn unknown_counters_are_created_on_demand() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.get("custom_total"), 0);
        metrics.increment("custom_total");
        assert_eq!(metrics.get("custom_total"), 1);
    }
}
