//! feature-worker: subscribes to raw telemetry and publishes per-window
//! feature vectors.
//!
//! # Usage
//!
//! ```bash
//! feature-worker --config config/fusionguard.toml
//!
//! # Via environment variables
//! FUSIONGUARD_CONFIG=/etc/fusionguard.toml RUST_LOG=debug feature-worker
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fusionguard_compute::FeatureBuilder;
use fusionguard_core::config::load_dotenv;
use fusionguard_core::FusionGuardConfig;
use fusionguard_eisenbahn::{
    ShutdownSignal, Transport, WorkerBuilder, WorkerRunner, ZmqPublisher, ZmqSubscriber,
};
use fusionguard_pipeline::{FeatureStage, Stage, StageOutput, StageWorker};

/// Streaming feature extraction worker.
#[derive(Parser, Debug)]
#[command(name = "feature-worker", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "FUSIONGUARD_CONFIG", default_value = "config/fusionguard.toml")]
    config: String,

    /// Seconds between health pings (overrides `service.health_interval_secs`).
    #[arg(long, env = "FUSIONGUARD_HEALTH_INTERVAL")]
    health_interval: Option<u64>,

    /// Upper bound in seconds on the drain at shutdown.
    #[arg(long, env = "FUSIONGUARD_SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    fusionguard_pipeline::init_tracing();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting feature-worker");

    let config = FusionGuardConfig::from_file(&cli.config)?;
    config.log_summary();

    let upstream: Transport = config.transport.raw.parse()?;
    let output: Transport = config.transport.features.parse()?;

    let subscriber = Arc::new(ZmqSubscriber::connect(&upstream).await?);
    let publisher = Arc::new(ZmqPublisher::bind(&output).await?);

    let builder = FeatureBuilder::new(
        config.features.windows_ms.clone(),
        config.features.channels.iter().cloned(),
    );
    let handler = FeatureStage::new(
        builder,
        StageOutput::new(publisher.clone(), config.transport.publish_timeout()),
    );
    let stage = Stage::new(handler, subscriber, config.transport.max_in_flight);

    let shutdown = ShutdownSignal::new();
    let worker = Arc::new(StageWorker::new("feature-worker", stage, shutdown.clone()));
    let runner_config = WorkerBuilder::new("feature-worker")
        .health_interval(Duration::from_secs(
            cli.health_interval.unwrap_or(config.service.health_interval_secs),
        ))
        .shutdown_timeout(Duration::from_secs(
            cli.shutdown_timeout.unwrap_or(config.service.shutdown_timeout_secs),
        ))
        .build();

    WorkerRunner::run(worker, publisher, runner_config, shutdown).await?;

    tracing::info!("feature-worker exited cleanly");
    Ok(())
}
