//! Risk-adjusted Kelly stake sizing.
//!
//! The Kelly criterion sizes a bet to maximise the expected logarithm of
//! wealth. Here it is used in a discounted, capped form: the raw fraction
//! `p − q = 2p − 1` (even-odds edge) is scaled by the policy's fractional
//! Kelly multiplier and by the portfolio risk tier's discount, converted to
//! currency against the bankroll, then clamped by two hard caps.

use crate::config::RiskProfile;
use crate::types::RiskTier;

/// Maximum stake allowed for a tier: the per-bet cap discounted by the same
/// tier multiplier the Kelly fraction uses.
pub fn max_stake_for_tier(tier: RiskTier, policy: &RiskProfile) -> f64 {
    policy.max_stake_per_bet * tier.multiplier()
}

/// Size a stake from a combined confidence and the current risk tier.
///
/// Returns exactly `0.0` whenever the adjusted Kelly fraction is zero or
/// negative — nothing is actionable at non-positive edge. Otherwise the
/// stake is `min(kelly * bankroll, max_stake_per_bet, max_stake_for_tier)`.
pub fn size(confidence: f64, tier: RiskTier, policy: &RiskProfile) -> f64 {
    debug_assert!(
        (0.0..=1.0).contains(&confidence),
        "confidence out of range"
    );

    let kelly = (2.0 * confidence - 1.0) * policy.kelly_multiplier * tier.multiplier();
    if kelly <= 0.0 {
        return 0.0;
    }

    (kelly * policy.bankroll)
        .min(policy.max_stake_per_bet)
        .min(max_stake_for_tier(tier, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn policy() -> RiskProfile {
        // Defaults: bankroll 1000, max_stake_per_bet 50, kelly 0.25.
        RiskProfile::default_for_tests()
    }

    #[test]
    fn zero_stake_at_coin_flip_confidence() {
        assert_relative_eq!(size(0.5, RiskTier::Low, &policy()), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_stake_at_negative_edge() {
        assert_relative_eq!(size(0.3, RiskTier::Low, &policy()), 0.0, epsilon = 1e-9);
        assert_relative_eq!(size(0.0, RiskTier::High, &policy()), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn positive_edge_scales_with_bankroll_until_capped() {
        let mut p = policy();
        p.max_stake_per_bet = 500.0;
        // kelly = 0.2 * 0.25 = 0.05 -> $50 on a $1000 bankroll
        assert_relative_eq!(size(0.6, RiskTier::Low, &p), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn stake_never_exceeds_per_bet_cap() {
        let p = policy();
        // kelly = 0.6 * 0.25 = 0.15 -> $150 raw, capped at $50
        assert_relative_eq!(size(0.8, RiskTier::Low, &p), p.max_stake_per_bet, epsilon = 1e-9);
        assert!(size(1.0, RiskTier::Low, &p) <= p.max_stake_per_bet);
    }

    #[test]
    fn tier_discount_applies_to_both_fraction_and_cap() {
        let p = policy();
        // High tier halves the fraction AND the cap: raw $75, cap $25.
        assert_relative_eq!(size(0.8, RiskTier::High, &p), 25.0, epsilon = 1e-9);
        // Medium tier: raw 0.6*0.25*0.75*1000 = $112.5, cap $37.5.
        assert_relative_eq!(size(0.8, RiskTier::Medium, &p), 37.5, epsilon = 1e-9);
    }

    #[test]
    fn tier_caps_derive_from_per_bet_cap() {
        let p = policy();
        assert_relative_eq!(max_stake_for_tier(RiskTier::Low, &p), 50.0, epsilon = 1e-9);
        assert_relative_eq!(max_stake_for_tier(RiskTier::Medium, &p), 37.5, epsilon = 1e-9);
        assert_relative_eq!(max_stake_for_tier(RiskTier::High, &p), 25.0, epsilon = 1e-9);
    }
}
