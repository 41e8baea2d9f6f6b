//! Performance-weighted consensus over a batch of strategy recommendations.

use chrono::Utc;

use super::performance::PerformanceTracker;
use crate::error::EngineError;
use crate::types::{Direction, RiskAssessment, StrategyRecommendation};

/// Strategy id carried by combined recommendations.
pub const CONSENSUS_ID: &str = "consensus";

/// Merge per-strategy recommendations into one consensus recommendation.
///
/// Each input is weighted by `confidence * trust_weight(strategy)`. The
/// consensus direction is the side with the larger summed weight; an exact
/// tie resolves to OVER (documented policy default, deterministic).
/// Consensus confidence and expected value are the weight-normalised
/// averages over *all* inputs — minority-direction recommendations still
/// pull the blend, this is a continuous merge rather than a pure vote. The
/// combined risk assessment unions all factor labels and averages scores.
///
/// Output is independent of input order.
pub fn combine(
    recommendations: &[StrategyRecommendation],
    tracker: &PerformanceTracker,
) -> Result<StrategyRecommendation, EngineError> {
    if recommendations.is_empty() {
        return Err(EngineError::NoRecommendations);
    }

    let mut over_weight = 0.0;
    let mut under_weight = 0.0;
    let mut total_weight = 0.0;
    let mut weighted_confidence = 0.0;
    let mut weighted_ev = 0.0;
    let mut risk_score_sum = 0.0;
    let mut risk = RiskAssessment::new(0.0);

    for rec in recommendations {
        let weight = rec.confidence * tracker.trust_weight(&rec.strategy_id);
        match rec.direction {
            Direction::Over => over_weight += weight,
            Direction::Under => under_weight += weight,
        }
        total_weight += weight;
        weighted_confidence += weight * rec.confidence;
        weighted_ev += weight * rec.expected_value;
        risk_score_sum += rec.risk.score;
        for factor in &rec.risk.factors {
            risk.factors.insert(factor.clone());
        }
    }

    let direction = if over_weight >= under_weight {
        Direction::Over
    } else {
        Direction::Under
    };

    // All weights can be zero (every confidence 0, or every trust 0); fall
    // back to an unweighted average rather than dividing by zero.
    let n = recommendations.len() as f64;
    let (confidence, expected_value) = if total_weight > f64::EPSILON {
        (
            weighted_confidence / total_weight,
            weighted_ev / total_weight,
        )
    } else {
        (
            recommendations.iter().map(|r| r.confidence).sum::<f64>() / n,
            recommendations.iter().map(|r| r.expected_value).sum::<f64>() / n,
        )
    };

    risk.score = (risk_score_sum / n).clamp(0.0, 1.0);
    risk.timestamp = Utc::now();

    Ok(StrategyRecommendation {
        strategy_id: CONSENSUS_ID.to_string(),
        direction,
        confidence: confidence.clamp(0.0, 1.0),
        expected_value,
        risk,
        created_at: Utc::now(),
        outcome: None,
    })
}
