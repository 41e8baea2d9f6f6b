use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    BettingOpportunity, Direction, Movement, PropCandidate, RiskAssessment,
};

/// Inbound events consumed by the engine.
///
/// Shape only — the transport delivering these (WebSocket, queue, replay
/// file) is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The market moved for a subject metric.
    MarketUpdate {
        entity_id: String,
        metric: String,
        value: f64,
        volume: f64,
        movement: Movement,
        timestamp: DateTime<Utc>,
    },
    /// A model produced a fresh prediction for a subject metric.
    PredictionUpdate {
        entity_id: String,
        metric: String,
        expected_value: f64,
        confidence: f64,
        factors: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// A previously emitted recommendation settled.
    BetOutcome {
        strategy_id: String,
        recommendation_id: String,
        correct: bool,
        payout: f64,
        stake: f64,
    },
    /// A batch of raw single-leg props to feed the combination generator.
    PropBatch { props: Vec<PropCandidate> },
}

/// Outbound events produced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineOutput {
    /// Consensus recommendation for one subject, already risk-bounded.
    Recommendation {
        recommendation_id: String,
        direction: Direction,
        confidence: f64,
        expected_value: f64,
        risk: RiskAssessment,
        stake: f64,
        timestamp: DateTime<Utc>,
    },
    /// Ranked multi-leg (or single) opportunities from one generator run.
    OpportunityBatch {
        opportunities: Vec<BettingOpportunity>,
    },
    /// Rolling per-strategy performance, for observability/export.
    PerformanceSnapshot {
        strategy_id: String,
        success_rate: f64,
        avg_confidence: f64,
        total: u64,
    },
}
