use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the line a recommendation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Over,
    Under,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Over => Direction::Under,
            Direction::Under => Direction::Over,
        }
    }
}

/// Recent movement of the market line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Up,
    Down,
    Stable,
}

/// Market state at the moment a decision is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Current market line for the subject metric.
    pub line: f64,
    /// Traded volume behind the line.
    pub volume: f64,
    pub movement: Movement,
}

/// Model prediction state at the moment a decision is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    /// Point estimate for the subject metric.
    pub expected_value: f64,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    /// Labels of the factors that contributed to the prediction.
    pub factors: Vec<String>,
}

/// Immutable input handed to every evaluator for one decision cycle.
///
/// Built fresh per incoming update and discarded after use; evaluators never
/// share mutable state through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyContext {
    /// Subject entity (player, team).
    pub entity_id: String,
    /// Subject metric (e.g. "points", "total_goals").
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    pub market: MarketSnapshot,
    pub prediction: PredictionSnapshot,
}

/// Named risk findings plus an overall score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub factors: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn new(score: f64) -> Self {
        RiskAssessment {
            score: score.clamp(0.0, 1.0),
            factors: BTreeSet::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_factor(mut self, label: impl Into<String>) -> Self {
        self.factors.insert(label.into());
        self
    }
}

/// Output of one evaluator invocation. Never mutated after creation;
/// corrections produce a new recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub strategy_id: String,
    pub direction: Direction,
    /// Confidence in [0, 1]; clamped at the registry boundary.
    pub confidence: f64,
    /// Signed expected value per unit staked.
    pub expected_value: f64,
    pub risk: RiskAssessment,
    pub created_at: DateTime<Utc>,
    /// Unknown until the underlying bet settles.
    pub outcome: Option<bool>,
}

/// Risk tier attached to an opportunity, discounting its Kelly stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Kelly discount applied for this tier.
    pub fn multiplier(self) -> f64 {
        match self {
            RiskTier::Low => 1.0,
            RiskTier::Medium => 0.75,
            RiskTier::High => 0.5,
        }
    }

    /// Tier derived from a combined confidence value.
    pub fn from_confidence(confidence: f64) -> RiskTier {
        if confidence >= 0.7 {
            RiskTier::Low
        } else if confidence >= 0.5 {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }
}

/// One constituent single-outcome bet within an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetLeg {
    /// Source prop this leg was built from.
    pub prop_id: String,
    /// Underlying game/event.
    pub event_id: String,
    /// Subject entity of the prop.
    pub entity_id: String,
    /// Subject metric the leg bets on.
    pub metric: String,
    pub direction: Direction,
    pub confidence: f64,
    /// Decimal odds for the leg (payout per unit staked, stake included).
    pub decimal_odds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Single,
    Parlay,
}

/// A ranked, risk-bounded betting opportunity — single prop or parlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingOpportunity {
    pub id: String,
    pub kind: OpportunityKind,
    /// Combined confidence; for parlays, the product of leg confidences.
    pub confidence: f64,
    pub expected_value: f64,
    pub risk_tier: RiskTier,
    pub recommended_stake: f64,
    /// Hard cap this opportunity was sized against.
    pub max_stake: f64,
    /// Ordered constituent legs (one for singles).
    pub legs: Vec<BetLeg>,
}

/// A raw candidate prop fed to the combination generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropCandidate {
    pub prop_id: String,
    pub event_id: String,
    pub entity_id: String,
    pub metric: String,
    pub decimal_odds: f64,
    pub market: MarketSnapshot,
    pub prediction: PredictionSnapshot,
}

/// An open or recommended position held against the portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub opportunity_id: String,
    pub stake: f64,
    pub legs: Vec<BetLeg>,
}

impl OpenPosition {
    /// Whether two positions share both an event and a subject entity across
    /// their legs — the correlation heuristic used by the risk assessor.
    pub fn correlated_with(&self, other: &OpenPosition) -> bool {
        let shares_event = self
            .legs
            .iter()
            .any(|a| other.legs.iter().any(|b| a.event_id == b.event_id));
        let shares_entity = self
            .legs
            .iter()
            .any(|a| other.legs.iter().any(|b| a.entity_id == b.entity_id));
        shares_event && shares_entity
    }
}
