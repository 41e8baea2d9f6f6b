use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{EngineError, EvaluatorFailure};
use crate::metrics::MetricsCollector;
use crate::types::{StrategyContext, StrategyRecommendation};

/// A pluggable scoring strategy.
///
/// Implementations must be pure with respect to the context: no shared
/// mutable state across evaluators within a batch. Internal heuristics
/// (thresholds, lookup tables) are fine.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Unique identifier, used for registration, weighting and logging.
    fn id(&self) -> &str;

    /// Score one decision context.
    async fn evaluate(&self, ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation>;
}

/// Result of one concurrent evaluation batch.
///
/// Failures are first-class so callers and tests can assert on counts
/// instead of scraping logs.
#[derive(Debug, Default)]
pub struct EvaluationBatch {
    pub recommendations: Vec<StrategyRecommendation>,
    pub failures: Vec<EvaluatorFailure>,
}

/// Holds the registered evaluators and fans a context out across all of
/// them concurrently.
///
/// The evaluator set is snapshotted at the start of each batch, so a
/// concurrent `register` call is never visible to an in-flight evaluation.
pub struct StrategyRegistry {
    strategies: RwLock<Vec<Arc<dyn Strategy>>>,
    metrics: Arc<MetricsCollector>,
}

impl StrategyRegistry {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        StrategyRegistry {
            strategies: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Register a strategy. Fails if its id is already present.
    pub fn register(&self, strategy: Arc<dyn Strategy>) -> Result<(), EngineError> {
        let mut strategies = self.strategies.write().expect("registry lock poisoned");
        if strategies.iter().any(|s| s.id() == strategy.id()) {
            return Err(EngineError::DuplicateStrategy(strategy.id().to_string()));
        }
        strategies.push(strategy);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.strategies.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered evaluator against `ctx` concurrently.
    ///
    /// Each invocation gets its own failure boundary and time budget: an
    /// evaluator that errors or overruns `budget` is excluded from the
    /// result and reported as a failure, never aborting the batch. The
    /// batch is a join, not a race — it completes once every evaluator has
    /// reported or timed out.
    pub async fn evaluate(&self, ctx: &StrategyContext, budget: Duration) -> EvaluationBatch {
        let snapshot: Vec<Arc<dyn Strategy>> = {
            let strategies = self.strategies.read().expect("registry lock poisoned");
            strategies.clone()
        };

        // Ids are captured before spawning so that even a panicked task's
        // failure stays attributable to its strategy.
        let mut ids = Vec::with_capacity(snapshot.len());
        let mut handles = Vec::with_capacity(snapshot.len());
        for strategy in snapshot {
            let id = strategy.id().to_string();
            let op = format!("strategy.{id}");
            let ctx = ctx.clone();
            let metrics = Arc::clone(&self.metrics);
            handles.push(tokio::spawn(async move {
                let start = std::time::Instant::now();
                let result = timeout(budget, strategy.evaluate(&ctx)).await;
                let elapsed = start.elapsed();
                match result {
                    Ok(Ok(mut rec)) => {
                        metrics.record(&op, elapsed, true);
                        rec.confidence = rec.confidence.clamp(0.0, 1.0);
                        rec.risk.score = rec.risk.score.clamp(0.0, 1.0);
                        Ok(rec)
                    }
                    Ok(Err(err)) => {
                        metrics.record(&op, elapsed, false);
                        Err(format!("{err:#}"))
                    }
                    Err(_) => {
                        metrics.record(&op, elapsed, false);
                        Err(format!("timed out after {}ms", budget.as_millis()))
                    }
                }
            }));
            ids.push(id);
        }

        let mut batch = EvaluationBatch::default();
        for (id, joined) in ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(rec)) => batch.recommendations.push(rec),
                Ok(Err(cause)) => {
                    warn!(
                        strategy = %id,
                        cause = %cause,
                        "evaluator failed, excluded from batch"
                    );
                    batch.failures.push(EvaluatorFailure {
                        strategy_id: id,
                        cause,
                    });
                }
                Err(join_err) => {
                    // A panicking evaluator takes the same recovery path as
                    // one returning an error.
                    warn!(strategy = %id, "evaluator task panicked: {join_err}");
                    batch.failures.push(EvaluatorFailure {
                        strategy_id: id,
                        cause: join_err.to_string(),
                    });
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, RiskAssessment};
    use chrono::Utc;

    fn test_context() -> StrategyContext {
        StrategyContext {
            entity_id: "entity".into(),
            metric: "points".into(),
            timestamp: Utc::now(),
            market: crate::types::MarketSnapshot {
                line: 25.5,
                volume: 10_000.0,
                movement: crate::types::Movement::Up,
            },
            prediction: crate::types::PredictionSnapshot {
                expected_value: 28.0,
                confidence: 0.7,
                factors: vec!["recent-form".into()],
            },
        }
    }

    fn rec(id: &str, confidence: f64) -> StrategyRecommendation {
        StrategyRecommendation {
            strategy_id: id.into(),
            direction: Direction::Over,
            confidence,
            expected_value: 0.1,
            risk: RiskAssessment::new(0.2),
            created_at: Utc::now(),
            outcome: None,
        }
    }

    struct Fixed {
        id: &'static str,
        confidence: f64,
    }

    #[async_trait]
    impl Strategy for Fixed {
        fn id(&self) -> &str {
            self.id
        }
        async fn evaluate(&self, _ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation> {
            Ok(rec(self.id, self.confidence))
        }
    }

    struct Failing;

    #[async_trait]
    impl Strategy for Failing {
        fn id(&self) -> &str {
            "failing"
        }
        async fn evaluate(&self, _ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation> {
            anyhow::bail!("synthetic evaluator fault")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Strategy for Panicking {
        fn id(&self) -> &str {
            "panicking"
        }
        async fn evaluate(&self, _ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation> {
            panic!("synthetic evaluator panic")
        }
    }

    struct Slow;

    #[async_trait]
    impl Strategy for Slow {
        fn id(&self) -> &str {
            "slow"
        }
        async fn evaluate(&self, _ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(rec("slow", 0.9))
        }
    }

    fn registry() -> StrategyRegistry {
        StrategyRegistry::new(Arc::new(MetricsCollector::new()))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = registry();
        registry
            .register(Arc::new(Fixed {
                id: "momentum",
                confidence: 0.6,
            }))
            .unwrap();
        let err = registry
            .register(Arc::new(Fixed {
                id: "momentum",
                confidence: 0.8,
            }))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStrategy(id) if id == "momentum"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failing_evaluator_is_isolated() {
        let registry = registry();
        registry
            .register(Arc::new(Fixed {
                id: "ok",
                confidence: 0.6,
            }))
            .unwrap();
        registry.register(Arc::new(Failing)).unwrap();

        let batch = registry
            .evaluate(&test_context(), Duration::from_millis(250))
            .await;
        assert_eq!(batch.recommendations.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].strategy_id, "failing");
    }

    #[tokio::test]
    async fn panicking_evaluator_failure_names_the_strategy() {
        let registry = registry();
        registry
            .register(Arc::new(Fixed {
                id: "ok",
                confidence: 0.6,
            }))
            .unwrap();
        registry.register(Arc::new(Panicking)).unwrap();

        let batch = registry
            .evaluate(&test_context(), Duration::from_millis(250))
            .await;
        assert_eq!(batch.recommendations.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].strategy_id, "panicking");
        assert!(batch.failures[0].cause.contains("panic"));
    }

    #[tokio::test]
    async fn timeout_takes_the_failure_path() {
        let registry = registry();
        registry.register(Arc::new(Slow)).unwrap();
        registry
            .register(Arc::new(Fixed {
                id: "fast",
                confidence: 0.7,
            }))
            .unwrap();

        let batch = registry
            .evaluate(&test_context(), Duration::from_millis(20))
            .await;
        assert_eq!(batch.recommendations.len(), 1);
        assert_eq!(batch.recommendations[0].strategy_id, "fast");
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].cause.contains("timed out"));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped() {
        let registry = registry();
        registry
            .register(Arc::new(Fixed {
                id: "overconfident",
                confidence: 1.4,
            }))
            .unwrap();

        let batch = registry
            .evaluate(&test_context(), Duration::from_millis(250))
            .await;
        assert_eq!(batch.recommendations[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn evaluations_are_recorded_in_metrics() {
        let metrics = Arc::new(MetricsCollector::new());
        let registry = StrategyRegistry::new(Arc::clone(&metrics));
        registry.register(Arc::new(Failing)).unwrap();

        registry
            .evaluate(&test_context(), Duration::from_millis(250))
            .await;
        assert_eq!(metrics.calls("strategy.failing"), 1);
        assert_eq!(metrics.failures("strategy.failing"), 1);
    }
}
