//! Built-in evaluators.
//!
//! Both are deliberately simple heuristics: the engine's value is in how it
//! combines and bounds strategy output, not in any single scorer. External
//! plugins implement the same [`Strategy`] trait and register alongside
//! these.

use async_trait::async_trait;
use chrono::Utc;

use super::registry::Strategy;
use crate::types::{
    Direction, Movement, RiskAssessment, StrategyContext, StrategyRecommendation,
};

/// Volume below which a market is considered thin.
const THIN_VOLUME: f64 = 1_000.0;

fn model_direction(ctx: &StrategyContext) -> Direction {
    if ctx.prediction.expected_value >= ctx.market.line {
        Direction::Over
    } else {
        Direction::Under
    }
}

/// Expected value per unit staked, assuming even-odds prop pricing.
fn even_odds_ev(confidence: f64) -> f64 {
    2.0 * confidence - 1.0
}

/// Follows the direction of recent line movement, trusting it more when the
/// model agrees and the market is liquid.
pub struct MomentumStrategy;

#[async_trait]
impl Strategy for MomentumStrategy {
    fn id(&self) -> &str {
        "momentum"
    }

    async fn evaluate(&self, ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation> {
        let model_dir = model_direction(ctx);
        let direction = match ctx.market.movement {
            Movement::Up => Direction::Over,
            Movement::Down => Direction::Under,
            Movement::Stable => model_dir,
        };

        let base = ctx.prediction.confidence;
        let mut confidence = if direction == model_dir {
            base * 1.1
        } else {
            base * 0.8
        };
        if ctx.market.movement == Movement::Stable {
            // No momentum to ride; this signal is weak by construction.
            confidence *= 0.85;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let mut risk = RiskAssessment::new(1.0 - confidence);
        if ctx.market.volume < THIN_VOLUME {
            risk = risk.with_factor("thin market volume");
        }
        if ctx.market.movement == Movement::Stable {
            risk = risk.with_factor("no line movement");
        }

        Ok(StrategyRecommendation {
            strategy_id: self.id().to_string(),
            direction,
            confidence,
            expected_value: even_odds_ev(confidence),
            risk,
            created_at: Utc::now(),
            outcome: None,
        })
    }
}

/// Bets the gap between the model's point estimate and the market line:
/// the wider the gap, the stronger the signal.
pub struct ValueStrategy;

#[async_trait]
impl Strategy for ValueStrategy {
    fn id(&self) -> &str {
        "value"
    }

    async fn evaluate(&self, ctx: &StrategyContext) -> anyhow::Result<StrategyRecommendation> {
        let line = ctx.market.line;
        let gap = if line.abs() > f64::EPSILON {
            (ctx.prediction.expected_value - line) / line.abs()
        } else {
            ctx.prediction.expected_value - line
        };
        let direction = if gap >= 0.0 {
            Direction::Over
        } else {
            Direction::Under
        };

        // A 25% relative gap saturates the signal.
        let strength = (gap.abs() * 4.0).min(1.0);
        let confidence = (ctx.prediction.confidence * (0.5 + 0.5 * strength)).clamp(0.0, 1.0);

        let mut risk = RiskAssessment::new(1.0 - confidence);
        if strength < 0.2 {
            risk = risk.with_factor("marginal value gap");
        }
        for factor in &ctx.prediction.factors {
            risk = risk.with_factor(format!("model factor: {factor}"));
        }

        Ok(StrategyRecommendation {
            strategy_id: self.id().to_string(),
            direction,
            confidence,
            expected_value: even_odds_ev(confidence),
            risk,
            created_at: Utc::now(),
            outcome: None,
        })
    }
}
