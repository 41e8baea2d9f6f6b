use thiserror::Error;

/// Errors surfaced by the engine proper.
///
/// Per-evaluator failures are deliberately *not* part of this enum: a
/// misbehaving strategy is recovered (excluded from its batch) and reported
/// as an [`EvaluatorFailure`] record, so a bad plugin can never abort a
/// decision cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A strategy id was registered twice. Fatal to that registration call
    /// only.
    #[error("strategy `{0}` is already registered")]
    DuplicateStrategy(String),

    /// `combine()` was handed an empty recommendation set. The triggering
    /// update is dropped, not retried — a retry would reuse the same stale
    /// context.
    #[error("cannot combine an empty set of recommendations")]
    NoRecommendations,

    /// A risk profile with contradictory bounds. Rejected at configuration
    /// load, never silently clamped.
    #[error("invalid risk profile: {0}")]
    InvalidPolicy(String),
}

/// A recovered per-evaluator failure within one evaluation batch.
///
/// Collected alongside the batch's successful recommendations so callers
/// (and tests) can assert on failure counts rather than on log output.
#[derive(Debug, Clone)]
pub struct EvaluatorFailure {
    pub strategy_id: String,
    pub cause: String,
}

impl std::fmt::Display for EvaluatorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evaluator `{}` failed: {}", self.strategy_id, self.cause)
    }
}
