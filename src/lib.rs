//! Strategy & risk combination engine for sports-betting analytics.
//!
//! Turns raw market/prediction signals into ranked, risk-bounded betting
//! recommendations, generates multi-leg (parlay) opportunities, and
//! continuously re-weights its strategies from observed outcomes. The UI,
//! transport, and persistence layers are external collaborators that speak
//! to this crate through [`events::EngineEvent`] and
//! [`events::EngineOutput`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod types;

pub use config::RiskProfile;
pub use engine::{DecisionPipeline, PerformanceTracker, Strategy, StrategyRegistry};
pub use error::{EngineError, EvaluatorFailure};
pub use events::{EngineEvent, EngineOutput};
pub use metrics::MetricsCollector;
