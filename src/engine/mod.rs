//! The strategy & risk combination engine.
//!
//! Control flow for one inbound update: the [`registry::StrategyRegistry`]
//! fans the context out across all registered evaluators, the
//! [`combiner`] blends their output into one consensus recommendation
//! weighted by each strategy's observed track record, and the
//! [`portfolio`] assessor and [`stake`] sizer jointly bound the result
//! before it is emitted. Settled outcomes feed the
//! [`performance::PerformanceTracker`], closing the loop.

pub mod combiner;
pub mod parlay;
pub mod performance;
pub mod pipeline;
pub mod portfolio;
pub mod registry;
pub mod stake;
pub mod strategies;

pub use combiner::combine;
pub use performance::{PerformanceTracker, StrategyPerformance};
pub use pipeline::DecisionPipeline;
pub use portfolio::{assess, PortfolioRisk};
pub use registry::{EvaluationBatch, Strategy, StrategyRegistry};
pub use strategies::{MomentumStrategy, ValueStrategy};
