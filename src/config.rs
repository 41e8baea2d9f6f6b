use clap::Parser;

use crate::error::EngineError;

/// Risk policy for the strategy & risk combination engine.
///
/// Supplied by the external configuration collaborator; every field can come
/// from the CLI or the environment. The engine re-reads the profile between
/// decision cycles, so a reload takes effect on the next update.
#[derive(Parser, Debug, Clone)]
#[command(name = "edge-engine", version, about)]
pub struct RiskProfile {
    /// Maximum total exposure across all open positions (USD)
    #[arg(long, env = "MAX_EXPOSURE", default_value = "1000.0")]
    pub max_exposure: f64,

    /// Maximum stake for any single bet (USD)
    #[arg(long, env = "MAX_STAKE_PER_BET", default_value = "50.0")]
    pub max_stake_per_bet: f64,

    /// Bankroll the Kelly fraction is scaled against (USD)
    #[arg(long, env = "BANKROLL", default_value = "1000.0")]
    pub bankroll: f64,

    /// Minimum combined confidence required to act (0.0–1.0)
    #[arg(long, env = "MIN_CONFIDENCE", default_value = "0.55")]
    pub min_confidence: f64,

    /// Minimum expected value required to place a bet (e.g. 0.05 = 5%)
    #[arg(long, env = "MIN_EDGE", default_value = "0.05")]
    pub min_edge: f64,

    /// Fractional Kelly multiplier (0.0–1.0)
    #[arg(long, env = "KELLY_MULTIPLIER", default_value = "0.25")]
    pub kelly_multiplier: f64,

    /// Allow recommendations that oppose an open position on the same subject
    #[arg(long, env = "HEDGING_ENABLED", default_value = "false")]
    pub hedging_enabled: bool,

    /// Maximum number of legs in a generated parlay
    #[arg(long, env = "MAX_LEGS", default_value = "4")]
    pub max_legs: usize,

    /// Maximum candidate pool fed to parlay enumeration (bounds C(n, k))
    #[arg(long, env = "MAX_PARLAY_POOL", default_value = "12")]
    pub max_parlay_pool: usize,

    /// Per-evaluator time budget; an evaluator exceeding it is treated as failed
    #[arg(long, env = "EVALUATOR_TIMEOUT_MS", default_value = "250")]
    pub evaluator_timeout_ms: u64,

    /// Fraction of max exposure on one event that flags game concentration
    #[arg(long, env = "CONCENTRATION_FRACTION", default_value = "0.4")]
    pub concentration_fraction: f64,

    /// Exposure ratio at or above which portfolio risk is tiered medium
    #[arg(long, env = "MEDIUM_EXPOSURE_RATIO", default_value = "0.5")]
    pub medium_exposure_ratio: f64,

    /// Exposure ratio at or above which portfolio risk is tiered high
    #[arg(long, env = "HIGH_EXPOSURE_RATIO", default_value = "0.8")]
    pub high_exposure_ratio: f64,
}

impl RiskProfile {
    /// Reject contradictory bounds outright rather than clamping them.
    ///
    /// A profile that fails here must never reach a decision cycle: masking
    /// misconfiguration as "no opportunity" is exactly what the engine's
    /// error contract forbids.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_exposure <= 0.0 {
            return Err(EngineError::InvalidPolicy(
                "max_exposure must be positive".into(),
            ));
        }
        if self.max_stake_per_bet <= 0.0 || self.max_stake_per_bet > self.max_exposure {
            return Err(EngineError::InvalidPolicy(
                "max_stake_per_bet must be positive and no larger than max_exposure".into(),
            ));
        }
        if self.bankroll <= 0.0 {
            return Err(EngineError::InvalidPolicy("bankroll must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::InvalidPolicy(
                "min_confidence must be between 0.0 and 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.kelly_multiplier) || self.kelly_multiplier == 0.0 {
            return Err(EngineError::InvalidPolicy(
                "kelly_multiplier must be in (0.0, 1.0]".into(),
            ));
        }
        if self.max_legs < 2 {
            return Err(EngineError::InvalidPolicy(
                "max_legs must be at least 2".into(),
            ));
        }
        if self.max_parlay_pool < self.max_legs {
            return Err(EngineError::InvalidPolicy(
                "max_parlay_pool must be at least max_legs".into(),
            ));
        }
        if self.evaluator_timeout_ms == 0 {
            return Err(EngineError::InvalidPolicy(
                "evaluator_timeout_ms must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.concentration_fraction) {
            return Err(EngineError::InvalidPolicy(
                "concentration_fraction must be between 0.0 and 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.medium_exposure_ratio)
            || !(0.0..=1.0).contains(&self.high_exposure_ratio)
            || self.medium_exposure_ratio > self.high_exposure_ratio
        {
            return Err(EngineError::InvalidPolicy(
                "exposure ratios must lie in [0.0, 1.0] with medium <= high".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
impl RiskProfile {
    /// Profile with all defaults, for use in unit tests.
    pub fn default_for_tests() -> RiskProfile {
        RiskProfile::parse_from(["edge-engine"])
    }
}
