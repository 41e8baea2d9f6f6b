use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Neutral prior used for strategies with no settled outcomes yet, so a new
/// strategy is neither favoured nor penalised at cold start.
const NEUTRAL_TRUST: f64 = 0.5;

/// Rolling per-strategy counters. Monotonically non-decreasing except on an
/// explicit [`PerformanceTracker::reset`].
#[derive(Debug, Clone, Serialize)]
pub struct StrategyPerformance {
    pub total: u64,
    pub successes: u64,
    pub avg_confidence: f64,
    pub updated_at: DateTime<Utc>,
}

impl StrategyPerformance {
    fn new() -> Self {
        StrategyPerformance {
            total: 0,
            successes: 0,
            avg_confidence: 0.0,
            updated_at: Utc::now(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            NEUTRAL_TRUST
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

/// Tracks observed outcomes per strategy id and turns them into trust
/// weights for consensus combination.
///
/// Updates are additive under the lock: two outcomes for the same strategy
/// settling concurrently both land (no lost updates), and within one event
/// stream they apply in arrival order.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    inner: Mutex<HashMap<String, StrategyPerformance>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a settled outcome for `strategy_id`.
    ///
    /// The running average confidence uses `avg' = (avg*n + c) / (n+1)` with
    /// `n` the count before this update.
    pub fn record_outcome(&self, strategy_id: &str, correct: bool, confidence: f64) {
        let mut inner = self.inner.lock().expect("performance lock poisoned");
        let perf = inner
            .entry(strategy_id.to_string())
            .or_insert_with(StrategyPerformance::new);
        let n = perf.total as f64;
        perf.avg_confidence = (perf.avg_confidence * n + confidence.clamp(0.0, 1.0)) / (n + 1.0);
        perf.total += 1;
        if correct {
            perf.successes += 1;
        }
        perf.updated_at = Utc::now();
    }

    /// Historical success rate for a strategy, `0.5` when unobserved.
    pub fn trust_weight(&self, strategy_id: &str) -> f64 {
        let inner = self.inner.lock().expect("performance lock poisoned");
        inner
            .get(strategy_id)
            .map(|p| p.success_rate())
            .unwrap_or(NEUTRAL_TRUST)
    }

    pub fn performance(&self, strategy_id: &str) -> Option<StrategyPerformance> {
        let inner = self.inner.lock().expect("performance lock poisoned");
        inner.get(strategy_id).cloned()
    }

    /// Explicitly zero one strategy's counters.
    pub fn reset(&self, strategy_id: &str) {
        let mut inner = self.inner.lock().expect("performance lock poisoned");
        inner.insert(strategy_id.to_string(), StrategyPerformance::new());
    }

    /// Point-in-time copy of every strategy's counters.
    pub fn snapshot(&self) -> Vec<(String, StrategyPerformance)> {
        let inner = self.inner.lock().expect("performance lock poisoned");
        let mut entries: Vec<_> = inner
            .iter()
            .map(|(id, perf)| (id.clone(), perf.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
