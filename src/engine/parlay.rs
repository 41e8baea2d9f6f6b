//! Combination (parlay) generation.
//!
//! Enumeration is combinatorial by design: for a candidate pool of `n` legs
//! the generator visits C(n, k) subsets for every leg count k in
//! `2..=max_legs`. This is the engine's deliberate cost center, so both
//! bounds are explicit policy: the pool is pre-trimmed to the
//! `max_parlay_pool` highest-confidence legs before any subset is built,
//! and `max_legs` defaults to 4.

use std::time::Duration;

use tracing::debug;

use super::combiner::combine;
use super::performance::PerformanceTracker;
use super::registry::StrategyRegistry;
use super::stake;
use crate::config::RiskProfile;
use crate::metrics::MetricsCollector;
use crate::types::{
    BetLeg, BettingOpportunity, OpportunityKind, PropCandidate, RiskTier, StrategyContext,
};

/// Visit every k-subset of `0..n` in lexicographic order.
fn for_each_subset(n: usize, k: usize, mut visit: impl FnMut(&[usize])) {
    if k == 0 || k > n {
        return;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        visit(&idx);
        // Find the rightmost index that can still advance.
        let mut i = k;
        loop {
            if i == 0 {
                return;
            }
            i -= 1;
            if idx[i] != i + n - k {
                break;
            }
        }
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Score every valid 2..=max_legs combination from an evaluated leg pool.
///
/// Joint confidence is the exact product of leg confidences (so it is
/// non-increasing in leg count); joint odds the product of leg decimal
/// odds; expected value `jc*(jo - 1) - (1 - jc)`. Subsets below the
/// policy's confidence or edge floors are rejected. Output is sorted
/// descending by expected value.
pub fn enumerate(legs: &[BetLeg], policy: &RiskProfile) -> Vec<BettingOpportunity> {
    let mut pool: Vec<&BetLeg> = legs.iter().collect();
    pool.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    pool.truncate(policy.max_parlay_pool);

    let mut opportunities = Vec::new();
    let max_legs = policy.max_legs.min(pool.len());
    for k in 2..=max_legs {
        for_each_subset(pool.len(), k, |subset| {
            let joint_confidence: f64 = subset.iter().map(|&i| pool[i].confidence).product();
            if joint_confidence < policy.min_confidence {
                return;
            }
            let joint_odds: f64 = subset.iter().map(|&i| pool[i].decimal_odds).product();
            let expected_value = joint_confidence * (joint_odds - 1.0) - (1.0 - joint_confidence);
            if expected_value < policy.min_edge {
                return;
            }

            let legs: Vec<BetLeg> = subset.iter().map(|&i| pool[i].clone()).collect();
            let id = format!(
                "parlay:{}",
                legs.iter()
                    .map(|l| l.prop_id.as_str())
                    .collect::<Vec<_>>()
                    .join("+")
            );
            let tier = RiskTier::from_confidence(joint_confidence);
            opportunities.push(BettingOpportunity {
                id,
                kind: OpportunityKind::Parlay,
                confidence: joint_confidence,
                expected_value,
                risk_tier: tier,
                recommended_stake: stake::size(joint_confidence, tier, policy),
                max_stake: stake::max_stake_for_tier(tier, policy),
                legs,
            });
        });
    }

    opportunities.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
    opportunities
}

/// Generate ranked parlay opportunities from raw prop candidates.
///
/// Each prop is first scored through the full per-leg pipeline (registry
/// fan-out, then weighted consensus); a prop whose batch comes back empty
/// is dropped from the pool without aborting the run.
pub async fn generate(
    props: &[PropCandidate],
    policy: &RiskProfile,
    registry: &StrategyRegistry,
    tracker: &PerformanceTracker,
    metrics: &MetricsCollector,
) -> Vec<BettingOpportunity> {
    let budget = Duration::from_millis(policy.evaluator_timeout_ms);
    let start = std::time::Instant::now();

    let mut legs = Vec::with_capacity(props.len());
    for prop in props {
        let ctx = StrategyContext {
            entity_id: prop.entity_id.clone(),
            metric: prop.metric.clone(),
            timestamp: chrono::Utc::now(),
            market: prop.market.clone(),
            prediction: prop.prediction.clone(),
        };
        let batch = registry.evaluate(&ctx, budget).await;
        match combine(&batch.recommendations, tracker) {
            Ok(consensus) => legs.push(BetLeg {
                prop_id: prop.prop_id.clone(),
                event_id: prop.event_id.clone(),
                entity_id: prop.entity_id.clone(),
                metric: prop.metric.clone(),
                direction: consensus.direction,
                confidence: consensus.confidence,
                decimal_odds: prop.decimal_odds,
            }),
            Err(err) => {
                debug!(prop = %prop.prop_id, "dropping prop from parlay pool: {err}");
                metrics.record_error("parlay.leg", &err.to_string());
            }
        }
    }

    let opportunities = enumerate(&legs, policy);
    metrics.record("parlay.generate", start.elapsed(), true);
    opportunities
}
