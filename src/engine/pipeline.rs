//! The decision pipeline: one logical lane from inbound update to bounded
//! recommendation, with strategy fan-out as the only parallel section.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::combiner::combine;
use super::parlay;
use super::performance::PerformanceTracker;
use super::portfolio;
use super::registry::StrategyRegistry;
use super::stake;
use crate::config::RiskProfile;
use crate::error::EngineError;
use crate::events::{EngineEvent, EngineOutput};
use crate::metrics::MetricsCollector;
use crate::types::{
    BetLeg, BettingOpportunity, Direction, MarketSnapshot, OpenPosition, OpportunityKind,
    PredictionSnapshot, StrategyContext,
};

/// Latest market and prediction state for one (entity, metric) subject.
#[derive(Debug, Default)]
struct SubjectState {
    market: Option<MarketSnapshot>,
    prediction: Option<PredictionSnapshot>,
    last_update: Option<DateTime<Utc>>,
}

/// Event-driven decision pipeline.
///
/// Owns the per-subject snapshots and the open-position book; everything
/// else (registry, tracker, metrics) is shared. The risk profile is read
/// through a watch channel at the top of every cycle, so a hot reload takes
/// effect on the next update without restarting the engine.
pub struct DecisionPipeline {
    registry: Arc<StrategyRegistry>,
    tracker: Arc<PerformanceTracker>,
    metrics: Arc<MetricsCollector>,
    policy_rx: watch::Receiver<RiskProfile>,
    subjects: HashMap<(String, String), SubjectState>,
    open_positions: HashMap<String, OpenPosition>,
    next_recommendation: u64,
}

impl DecisionPipeline {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        tracker: Arc<PerformanceTracker>,
        metrics: Arc<MetricsCollector>,
        policy_rx: watch::Receiver<RiskProfile>,
    ) -> Self {
        DecisionPipeline {
            registry,
            tracker,
            metrics,
            policy_rx,
            subjects: HashMap::new(),
            open_positions: HashMap::new(),
            next_recommendation: 0,
        }
    }

    /// Number of positions currently held open by the pipeline.
    pub fn open_position_count(&self) -> usize {
        self.open_positions.len()
    }

    /// Consume events until the input channel closes, emitting outputs.
    ///
    /// A cycle-fatal error (e.g. a malformed policy reaching the risk
    /// assessor) is surfaced as an error-level operational alert and the
    /// offending update dropped; the loop itself keeps running.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineEvent>,
        tx: mpsc::Sender<EngineOutput>,
    ) {
        while let Some(event) = rx.recv().await {
            match self.handle(event).await {
                Ok(outputs) => {
                    for output in outputs {
                        if tx.send(output).await.is_err() {
                            info!("output channel closed, stopping pipeline");
                            return;
                        }
                    }
                }
                Err(err) => error!("decision cycle failed: {err:#}"),
            }
        }
    }

    /// Process one inbound event, returning the outputs it produced.
    pub async fn handle(&mut self, event: EngineEvent) -> Result<Vec<EngineOutput>> {
        match event {
            EngineEvent::MarketUpdate {
                entity_id,
                metric,
                value,
                volume,
                movement,
                timestamp,
            } => {
                let state = self
                    .subjects
                    .entry((entity_id.clone(), metric.clone()))
                    .or_default();
                state.market = Some(MarketSnapshot {
                    line: value,
                    volume,
                    movement,
                });
                state.last_update = Some(timestamp);
                self.decide(&entity_id, &metric).await
            }
            EngineEvent::PredictionUpdate {
                entity_id,
                metric,
                expected_value,
                confidence,
                factors,
                timestamp,
            } => {
                let state = self
                    .subjects
                    .entry((entity_id.clone(), metric.clone()))
                    .or_default();
                state.prediction = Some(PredictionSnapshot {
                    expected_value,
                    confidence: confidence.clamp(0.0, 1.0),
                    factors,
                });
                state.last_update = Some(timestamp);
                self.decide(&entity_id, &metric).await
            }
            EngineEvent::PropBatch { props } => {
                let policy = self.policy();
                policy.validate()?;
                // Parlays size against the same exposure headroom as
                // singles: whatever the book already holds caps every
                // generated stake.
                let open: Vec<OpenPosition> = self.open_positions.values().cloned().collect();
                let headroom = portfolio::assess(&open, None, &policy)?.max_allowed_stake;
                let mut opportunities = parlay::generate(
                    &props,
                    &policy,
                    &self.registry,
                    &self.tracker,
                    &self.metrics,
                )
                .await;
                for opp in &mut opportunities {
                    opp.max_stake = opp.max_stake.min(headroom);
                    opp.recommended_stake = opp.recommended_stake.min(opp.max_stake);
                }
                info!(
                    props = props.len(),
                    opportunities = opportunities.len(),
                    "combination generation complete"
                );
                Ok(vec![EngineOutput::OpportunityBatch { opportunities }])
            }
            EngineEvent::BetOutcome {
                strategy_id,
                recommendation_id,
                correct,
                payout,
                stake,
            } => Ok(self.settle(&strategy_id, &recommendation_id, correct, payout, stake)),
        }
    }

    fn policy(&self) -> RiskProfile {
        self.policy_rx.borrow().clone()
    }

    /// Run one decision cycle for a subject, if both snapshots are present.
    async fn decide(&mut self, entity_id: &str, metric: &str) -> Result<Vec<EngineOutput>> {
        let key = (entity_id.to_string(), metric.to_string());
        let Some(state) = self.subjects.get(&key) else {
            return Ok(vec![]);
        };
        let (Some(market), Some(prediction)) = (state.market.clone(), state.prediction.clone())
        else {
            // One-sided subject: wait for the other feed.
            return Ok(vec![]);
        };

        let policy = self.policy();
        policy.validate()?;

        let ctx = StrategyContext {
            entity_id: entity_id.to_string(),
            metric: metric.to_string(),
            timestamp: state.last_update.unwrap_or_else(Utc::now),
            market,
            prediction,
        };

        let start = std::time::Instant::now();
        let budget = Duration::from_millis(policy.evaluator_timeout_ms);
        let batch = self.registry.evaluate(&ctx, budget).await;

        let consensus = match combine(&batch.recommendations, &self.tracker) {
            Ok(consensus) => consensus,
            Err(EngineError::NoRecommendations) => {
                // Dropped, not retried: a retry would reuse the same stale
                // context.
                warn!(
                    entity = entity_id,
                    metric,
                    failures = batch.failures.len(),
                    "no recommendations for update, dropping"
                );
                self.metrics.record_error("pipeline.decide", "empty batch");
                return Ok(vec![]);
            }
            Err(err) => return Err(err.into()),
        };

        if consensus.confidence < policy.min_confidence {
            debug!(
                entity = entity_id,
                confidence = consensus.confidence,
                "below confidence floor, discarding"
            );
            return Ok(vec![]);
        }
        if consensus.expected_value < policy.min_edge {
            debug!(
                entity = entity_id,
                ev = consensus.expected_value,
                "below edge floor, discarding"
            );
            return Ok(vec![]);
        }
        if !policy.hedging_enabled
            && self.opposes_open_position(entity_id, metric, consensus.direction)
        {
            debug!(
                entity = entity_id,
                metric, "hedging disabled, discarding opposing bet"
            );
            return Ok(vec![]);
        }

        // Portfolio bound first, then Kelly within it.
        let open: Vec<OpenPosition> = self.open_positions.values().cloned().collect();
        let risk = portfolio::assess(&open, None, &policy)?;
        let sized = stake::size(consensus.confidence, risk.tier, &policy);
        let final_stake = sized.min(risk.max_allowed_stake);
        if final_stake <= 0.0 {
            debug!(entity = entity_id, "no stake headroom, discarding");
            return Ok(vec![]);
        }

        self.next_recommendation += 1;
        let recommendation_id = format!("rec-{}", self.next_recommendation);
        let leg = BetLeg {
            prop_id: format!("{entity_id}:{metric}"),
            // The engine does not learn the underlying game for streamed
            // subjects; the entity is the most specific event grouping
            // available here.
            event_id: entity_id.to_string(),
            entity_id: entity_id.to_string(),
            metric: metric.to_string(),
            direction: consensus.direction,
            confidence: consensus.confidence,
            // Line markets carry no odds in their snapshot; even odds is
            // the neutral assumption the evaluators also price against.
            decimal_odds: 2.0,
        };
        let opportunity = BettingOpportunity {
            id: recommendation_id.clone(),
            kind: OpportunityKind::Single,
            confidence: consensus.confidence,
            expected_value: consensus.expected_value,
            risk_tier: risk.tier,
            recommended_stake: final_stake,
            max_stake: stake::max_stake_for_tier(risk.tier, &policy).min(risk.max_allowed_stake),
            legs: vec![leg],
        };

        // Re-assess with the candidate included so concentration and
        // correlation flags it introduces reach the emitted assessment.
        let final_risk = portfolio::assess(&open, Some(&opportunity), &policy)?;
        let mut emitted_risk = consensus.risk.clone();
        emitted_risk.score = emitted_risk.score.max(final_risk.assessment.score);
        emitted_risk
            .factors
            .extend(final_risk.assessment.factors.iter().cloned());

        self.open_positions.insert(
            recommendation_id.clone(),
            OpenPosition {
                opportunity_id: recommendation_id.clone(),
                stake: final_stake,
                legs: opportunity.legs.clone(),
            },
        );

        self.metrics.record("pipeline.decide", start.elapsed(), true);
        info!(
            entity = entity_id,
            metric,
            direction = ?consensus.direction,
            confidence = consensus.confidence,
            stake = final_stake,
            "recommendation emitted"
        );

        Ok(vec![EngineOutput::Recommendation {
            recommendation_id,
            direction: consensus.direction,
            confidence: consensus.confidence,
            expected_value: consensus.expected_value,
            risk: emitted_risk,
            stake: final_stake,
            timestamp: Utc::now(),
        }])
    }

    /// An opposing bet is one against an open leg on the same entity AND
    /// metric; other metrics on the entity are independent markets.
    fn opposes_open_position(&self, entity_id: &str, metric: &str, direction: Direction) -> bool {
        self.open_positions.values().any(|pos| {
            pos.legs.iter().any(|leg| {
                leg.entity_id == entity_id
                    && leg.metric == metric
                    && leg.direction == direction.opposite()
            })
        })
    }

    /// Feed a settled outcome back into the performance tracker.
    ///
    /// Updates are applied in arrival order and are additive; the settled
    /// position, if tracked, is closed.
    fn settle(
        &mut self,
        strategy_id: &str,
        recommendation_id: &str,
        correct: bool,
        payout: f64,
        stake: f64,
    ) -> Vec<EngineOutput> {
        let confidence = self
            .open_positions
            .remove(recommendation_id)
            .and_then(|pos| pos.legs.first().map(|leg| leg.confidence))
            .unwrap_or(0.5);
        self.tracker.record_outcome(strategy_id, correct, confidence);
        info!(
            strategy = strategy_id,
            recommendation = recommendation_id,
            correct,
            payout,
            stake,
            "outcome settled"
        );

        match self.tracker.performance(strategy_id) {
            Some(perf) => vec![EngineOutput::PerformanceSnapshot {
                strategy_id: strategy_id.to_string(),
                success_rate: perf.success_rate(),
                avg_confidence: perf.avg_confidence,
                total: perf.total,
            }],
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::strategies::{MomentumStrategy, ValueStrategy};
    use crate::types::Movement;

    fn pipeline_with(policy: RiskProfile) -> (DecisionPipeline, watch::Sender<RiskProfile>) {
        let metrics = Arc::new(MetricsCollector::new());
        let registry = Arc::new(StrategyRegistry::new(Arc::clone(&metrics)));
        registry.register(Arc::new(MomentumStrategy)).unwrap();
        registry.register(Arc::new(ValueStrategy)).unwrap();
        let tracker = Arc::new(PerformanceTracker::new());
        let (policy_tx, policy_rx) = watch::channel(policy);
        (
            DecisionPipeline::new(registry, tracker, metrics, policy_rx),
            policy_tx,
        )
    }

    fn market_update(entity: &str) -> EngineEvent {
        EngineEvent::MarketUpdate {
            entity_id: entity.into(),
            metric: "points".into(),
            value: 25.0,
            volume: 20_000.0,
            movement: Movement::Up,
            timestamp: Utc::now(),
        }
    }

    fn prediction_update(entity: &str, confidence: f64) -> EngineEvent {
        EngineEvent::PredictionUpdate {
            entity_id: entity.into(),
            metric: "points".into(),
            expected_value: 31.0,
            confidence,
            factors: vec!["recent-form".into()],
            timestamp: Utc::now(),
        }
    }

    fn prop_candidates(count: usize) -> Vec<crate::types::PropCandidate> {
        (0..count)
            .map(|i| crate::types::PropCandidate {
                prop_id: format!("prop-{i}"),
                event_id: format!("event-{i}"),
                entity_id: format!("entity-{i}"),
                metric: "points".into(),
                decimal_odds: 2.1,
                market: MarketSnapshot {
                    line: 20.0,
                    volume: 15_000.0,
                    movement: Movement::Up,
                },
                prediction: PredictionSnapshot {
                    expected_value: 26.0,
                    confidence: 0.85,
                    factors: vec![],
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn update_without_both_snapshots_emits_nothing() {
        let (mut pipeline, _tx) = pipeline_with(RiskProfile::default_for_tests());
        let outputs = pipeline.handle(market_update("p1")).await.unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn full_cycle_emits_a_bounded_recommendation() {
        let policy = RiskProfile::default_for_tests();
        let cap = policy.max_stake_per_bet;
        let (mut pipeline, _tx) = pipeline_with(policy);

        pipeline.handle(market_update("p1")).await.unwrap();
        let outputs = pipeline
            .handle(prediction_update("p1", 0.85))
            .await
            .unwrap();

        assert_eq!(outputs.len(), 1);
        match &outputs[0] {
            EngineOutput::Recommendation {
                direction,
                confidence,
                stake,
                ..
            } => {
                assert_eq!(*direction, Direction::Over);
                assert!((0.0..=1.0).contains(confidence));
                assert!(*stake > 0.0);
                assert!(*stake <= cap);
            }
            other => panic!("expected Recommendation, got {other:?}"),
        }
        assert_eq!(pipeline.open_position_count(), 1);
    }

    #[tokio::test]
    async fn low_confidence_consensus_is_discarded() {
        let (mut pipeline, _tx) = pipeline_with(RiskProfile::default_for_tests());
        pipeline.handle(market_update("p1")).await.unwrap();
        let outputs = pipeline
            .handle(prediction_update("p1", 0.2))
            .await
            .unwrap();
        assert!(outputs.is_empty());
        assert_eq!(pipeline.open_position_count(), 0);
    }

    #[tokio::test]
    async fn empty_registry_drops_the_update() {
        let metrics = Arc::new(MetricsCollector::new());
        let registry = Arc::new(StrategyRegistry::new(Arc::clone(&metrics)));
        let tracker = Arc::new(PerformanceTracker::new());
        let (_policy_tx, policy_rx) = watch::channel(RiskProfile::default_for_tests());
        let mut pipeline =
            DecisionPipeline::new(registry, tracker, Arc::clone(&metrics), policy_rx);

        pipeline.handle(market_update("p1")).await.unwrap();
        let outputs = pipeline
            .handle(prediction_update("p1", 0.9))
            .await
            .unwrap();
        assert!(outputs.is_empty());
        assert_eq!(metrics.failures("pipeline.decide"), 1);
    }

    #[tokio::test]
    async fn invalid_policy_is_fatal_to_the_cycle() {
        let mut policy = RiskProfile::default_for_tests();
        let (mut pipeline, tx) = pipeline_with(policy.clone());
        pipeline.handle(market_update("p1")).await.unwrap();

        // A hot-reloaded profile with contradictory bounds must surface as
        // an error on the next cycle, not as a silent zero stake.
        policy.min_confidence = 3.0;
        tx.send(policy).unwrap();
        pipeline
            .handle(prediction_update("p1", 0.85))
            .await
            .unwrap_err();
    }

    #[tokio::test]
    async fn hedging_gate_blocks_opposing_bet() {
        let (mut pipeline, _tx) = pipeline_with(RiskProfile::default_for_tests());
        pipeline.handle(market_update("p1")).await.unwrap();
        let first = pipeline
            .handle(prediction_update("p1", 0.85))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Same subject, model now far below the line: consensus flips to
        // UNDER while an OVER position is open, so it must be suppressed.
        let opposing = EngineEvent::PredictionUpdate {
            entity_id: "p1".into(),
            metric: "points".into(),
            expected_value: 15.0,
            confidence: 0.9,
            factors: vec![],
            timestamp: Utc::now(),
        };
        let outputs = pipeline.handle(opposing).await.unwrap();
        assert!(outputs.is_empty());
        assert_eq!(pipeline.open_position_count(), 1);
    }

    #[tokio::test]
    async fn hedging_gate_is_scoped_to_the_metric() {
        let (mut pipeline, _tx) = pipeline_with(RiskProfile::default_for_tests());
        pipeline.handle(market_update("p1")).await.unwrap();
        let first = pipeline
            .handle(prediction_update("p1", 0.85))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Same entity, different metric: an UNDER on assists is an
        // independent market, not a hedge of the open OVER on points.
        pipeline
            .handle(EngineEvent::MarketUpdate {
                entity_id: "p1".into(),
                metric: "assists".into(),
                value: 25.0,
                volume: 20_000.0,
                movement: Movement::Up,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        let outputs = pipeline
            .handle(EngineEvent::PredictionUpdate {
                entity_id: "p1".into(),
                metric: "assists".into(),
                expected_value: 15.0,
                confidence: 0.9,
                factors: vec![],
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(outputs.len(), 1);
        match &outputs[0] {
            EngineOutput::Recommendation { direction, .. } => {
                assert_eq!(*direction, Direction::Under);
            }
            other => panic!("expected Recommendation, got {other:?}"),
        }
        assert_eq!(pipeline.open_position_count(), 2);
    }

    #[tokio::test]
    async fn settlement_updates_tracker_and_closes_position() {
        let (mut pipeline, _tx) = pipeline_with(RiskProfile::default_for_tests());
        pipeline.handle(market_update("p1")).await.unwrap();
        let outputs = pipeline
            .handle(prediction_update("p1", 0.85))
            .await
            .unwrap();
        let recommendation_id = match &outputs[0] {
            EngineOutput::Recommendation {
                recommendation_id, ..
            } => recommendation_id.clone(),
            other => panic!("expected Recommendation, got {other:?}"),
        };

        let outputs = pipeline
            .handle(EngineEvent::BetOutcome {
                strategy_id: "consensus".into(),
                recommendation_id,
                correct: true,
                payout: 20.0,
                stake: 10.0,
            })
            .await
            .unwrap();

        assert_eq!(pipeline.open_position_count(), 0);
        match &outputs[0] {
            EngineOutput::PerformanceSnapshot {
                strategy_id,
                success_rate,
                total,
                ..
            } => {
                assert_eq!(strategy_id, "consensus");
                assert_eq!(*total, 1);
                assert_eq!(*success_rate, 1.0);
            }
            other => panic!("expected PerformanceSnapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prop_batch_produces_an_opportunity_batch() {
        let mut policy = RiskProfile::default_for_tests();
        policy.min_confidence = 0.3;
        policy.min_edge = 0.0;
        let (mut pipeline, _tx) = pipeline_with(policy);

        let outputs = pipeline
            .handle(EngineEvent::PropBatch {
                props: prop_candidates(3),
            })
            .await
            .unwrap();
        match &outputs[0] {
            EngineOutput::OpportunityBatch { opportunities } => {
                assert!(!opportunities.is_empty());
                for opp in opportunities {
                    assert_eq!(opp.kind, OpportunityKind::Parlay);
                    let recomputed: f64 = opp.legs.iter().map(|l| l.confidence).product();
                    assert!((opp.confidence - recomputed).abs() < 1e-12);
                }
            }
            other => panic!("expected OpportunityBatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parlay_stakes_are_clamped_to_exposure_headroom() {
        let mut policy = RiskProfile::default_for_tests();
        policy.max_exposure = 30.0;
        policy.max_stake_per_bet = 20.0;
        policy.min_confidence = 0.3;
        policy.min_edge = 0.0;
        let (mut pipeline, _tx) = pipeline_with(policy);

        // Book already at the exposure cap: zero headroom left.
        pipeline.open_positions.insert(
            "open-1".into(),
            OpenPosition {
                opportunity_id: "open-1".into(),
                stake: 30.0,
                legs: vec![],
            },
        );

        let outputs = pipeline
            .handle(EngineEvent::PropBatch {
                props: prop_candidates(3),
            })
            .await
            .unwrap();
        match &outputs[0] {
            EngineOutput::OpportunityBatch { opportunities } => {
                assert!(!opportunities.is_empty());
                for opp in opportunities {
                    assert_eq!(opp.recommended_stake, 0.0);
                    assert_eq!(opp.max_stake, 0.0);
                }
            }
            other => panic!("expected OpportunityBatch, got {other:?}"),
        }
    }
}
