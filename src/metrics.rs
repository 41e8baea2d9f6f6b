use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// EWMA smoothing factor for per-operation durations.
const EWMA_ALPHA: f64 = 0.2;

/// Rolling statistics for one named operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OpStats {
    pub calls: u64,
    pub failures: u64,
    pub total_ms: f64,
    pub ewma_ms: f64,
    pub last_error: Option<String>,
}

impl OpStats {
    fn record(&mut self, duration: Duration, ok: bool) {
        let ms = duration.as_secs_f64() * 1000.0;
        self.calls += 1;
        if !ok {
            self.failures += 1;
        }
        self.total_ms += ms;
        self.ewma_ms = if self.calls == 1 {
            ms
        } else {
            EWMA_ALPHA * ms + (1.0 - EWMA_ALPHA) * self.ewma_ms
        };
    }
}

/// Records durations, counters, and error reports for every engine
/// operation. Leaf dependency: shared (via `Arc`) by the registry, the
/// generator, and the pipeline.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    ops: Mutex<HashMap<String, OpStats>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one timed invocation of `op`.
    pub fn record(&self, op: &str, duration: Duration, ok: bool) {
        let mut ops = self.ops.lock().expect("metrics lock poisoned");
        ops.entry(op.to_string()).or_default().record(duration, ok);
    }

    /// Record a failure with its cause, without timing information.
    pub fn record_error(&self, op: &str, cause: &str) {
        let mut ops = self.ops.lock().expect("metrics lock poisoned");
        let stats = ops.entry(op.to_string()).or_default();
        stats.calls += 1;
        stats.failures += 1;
        stats.last_error = Some(cause.to_string());
    }

    pub fn failures(&self, op: &str) -> u64 {
        let ops = self.ops.lock().expect("metrics lock poisoned");
        ops.get(op).map(|s| s.failures).unwrap_or(0)
    }

    pub fn calls(&self, op: &str) -> u64 {
        let ops = self.ops.lock().expect("metrics lock poisoned");
        ops.get(op).map(|s| s.calls).unwrap_or(0)
    }

    /// Point-in-time copy of all operation stats, keyed by operation name.
    pub fn snapshot(&self) -> HashMap<String, OpStats> {
        self.ops.lock().expect("metrics lock poisoned").clone()
    }

    /// Snapshot rendered as JSON, for export to the observability collaborator.
    pub fn export_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}
