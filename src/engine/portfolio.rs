//! Portfolio-level risk: exposure headroom, concentration, correlation.

use std::collections::HashMap;

use chrono::Utc;

use crate::config::RiskProfile;
use crate::error::EngineError;
use crate::types::{BettingOpportunity, OpenPosition, RiskAssessment, RiskTier};

pub const FACTOR_CONCENTRATION: &str = "high game concentration";
pub const FACTOR_CORRELATED: &str = "correlated bets detected";

/// Result of assessing the current portfolio against the risk policy.
#[derive(Debug, Clone)]
pub struct PortfolioRisk {
    pub assessment: RiskAssessment,
    pub tier: RiskTier,
    /// Sum of stakes across open positions.
    pub current_exposure: f64,
    /// Headroom left under the policy's exposure cap.
    pub max_allowed_stake: f64,
}

/// Assess exposure, concentration and correlation risk.
///
/// `candidate` is the opportunity currently being sized, if any: its legs
/// count toward per-event concentration (a new bet can push an event over
/// the limit), while exposure headroom is computed from open positions only.
///
/// A malformed policy is fatal to the decision cycle — it propagates rather
/// than producing a silent zero stake.
pub fn assess(
    open_positions: &[OpenPosition],
    candidate: Option<&BettingOpportunity>,
    policy: &RiskProfile,
) -> Result<PortfolioRisk, EngineError> {
    policy.validate()?;

    let current_exposure: f64 = open_positions.iter().map(|p| p.stake).sum();
    let max_allowed_stake = (policy.max_exposure - current_exposure).max(0.0);
    let exposure_ratio = current_exposure / policy.max_exposure;

    let tier = if exposure_ratio >= policy.high_exposure_ratio {
        RiskTier::High
    } else if exposure_ratio >= policy.medium_exposure_ratio {
        RiskTier::Medium
    } else {
        RiskTier::Low
    };

    // Per-event stake totals. A position's full stake counts toward every
    // event its legs touch: a parlay loses whole if any leg loses.
    let mut event_stakes: HashMap<&str, f64> = HashMap::new();
    for pos in open_positions {
        for leg in &pos.legs {
            *event_stakes.entry(leg.event_id.as_str()).or_default() += pos.stake;
        }
    }
    if let Some(opp) = candidate {
        for leg in &opp.legs {
            *event_stakes.entry(leg.event_id.as_str()).or_default() += opp.recommended_stake;
        }
    }

    let concentration_cap = policy.concentration_fraction * policy.max_exposure;
    // Strictly greater: exactly at the cap does not trigger.
    let concentrated = event_stakes.values().any(|&s| s > concentration_cap);

    let candidate_position = candidate.map(|opp| OpenPosition {
        opportunity_id: opp.id.clone(),
        stake: opp.recommended_stake,
        legs: opp.legs.clone(),
    });
    let mut all: Vec<&OpenPosition> = open_positions.iter().collect();
    if let Some(pos) = candidate_position.as_ref() {
        all.push(pos);
    }
    let correlated = all
        .iter()
        .enumerate()
        .any(|(i, a)| all.iter().skip(i + 1).any(|b| a.correlated_with(b)));

    let mut assessment = RiskAssessment {
        score: 0.0,
        factors: Default::default(),
        timestamp: Utc::now(),
    };
    let mut score = exposure_ratio;
    if concentrated {
        assessment.factors.insert(FACTOR_CONCENTRATION.to_string());
        score += 0.15;
    }
    if correlated {
        assessment.factors.insert(FACTOR_CORRELATED.to_string());
        score += 0.15;
    }
    assessment.score = score.clamp(0.0, 1.0);

    Ok(PortfolioRisk {
        assessment,
        tier,
        current_exposure,
        max_allowed_stake,
    })
}
