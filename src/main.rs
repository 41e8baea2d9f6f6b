use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use edge_engine::engine::strategies::{MomentumStrategy, ValueStrategy};
use edge_engine::{
    DecisionPipeline, EngineEvent, MetricsCollector, PerformanceTracker, RiskProfile,
    StrategyRegistry,
};

/// Thin host for the engine: JSON-lines events on stdin, JSON-lines outputs
/// on stdout. Real deployments replace this with their own transport.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let policy = RiskProfile::parse();
    policy.validate()?;
    info!(
        max_exposure = policy.max_exposure,
        max_stake = policy.max_stake_per_bet,
        kelly = policy.kelly_multiplier,
        "risk profile loaded"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let registry = Arc::new(StrategyRegistry::new(Arc::clone(&metrics)));
    registry.register(Arc::new(MomentumStrategy))?;
    registry.register(Arc::new(ValueStrategy))?;
    info!("registered {} built-in strategies", registry.len());

    let tracker = Arc::new(PerformanceTracker::new());
    let (_policy_tx, policy_rx) = watch::channel(policy);
    let pipeline = DecisionPipeline::new(registry, tracker, Arc::clone(&metrics), policy_rx);

    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(256);
    let (output_tx, mut output_rx) = mpsc::channel(256);

    // Feed stdin lines into the pipeline.
    let reader = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<EngineEvent>(&line) {
                Ok(event) => {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!("skipping malformed event: {err}"),
            }
        }
    });

    let engine = tokio::spawn(pipeline.run(event_rx, output_tx));

    // Print outputs until the pipeline stops.
    while let Some(output) = output_rx.recv().await {
        match serde_json::to_string(&output) {
            Ok(line) => println!("{line}"),
            Err(err) => error!("failed to serialise output: {err}"),
        }
    }

    reader.abort();
    engine.await?;
    info!("metrics at shutdown: {}", metrics.export_json());
    Ok(())
}
