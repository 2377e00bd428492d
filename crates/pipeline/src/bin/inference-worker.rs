//! inference-worker: scores feature vectors, publishes risk points and
//! alerts, and optionally appends every risk point to a JSON-lines sink.
//!
//! # Usage
//!
//! ```bash
//! inference-worker --config config/fusionguard.toml
//!
//! # Enable the sink without editing the config file
//! FUSIONGUARD_SINK_ENABLED=true FUSIONGUARD_SINK_PATH=data/risk.jsonl inference-worker
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fusionguard_compute::RiskEngine;
use fusionguard_core::config::load_dotenv;
use fusionguard_core::FusionGuardConfig;
use fusionguard_eisenbahn::{
    ShutdownSignal, Transport, WorkerBuilder, WorkerRunner, ZmqPublisher, ZmqSubscriber,
};
use fusionguard_pipeline::{
    InferenceStage, JsonlSink, NullSink, RiskSink, SinkHandle, Stage, StageHandler, StageOutput,
    StageWorker,
};

/// Disruption risk inference worker.
#[derive(Parser, Debug)]
#[command(name = "inference-worker", version, about)]
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
    tracing::info!(?cli, "starting inference-worker");

    let config = FusionGuardConfig::from_file(&cli.config)?;
    config.log_summary();

    // Artifacts are loaded before any socket is opened; a bad model aborts startup.
    let engine = RiskEngine::load(&config.inference)?;

    let upstream: Transport = config.transport.features.parse()?;
    let risk_out: Transport = config.transport.risk.parse()?;
    let alerts_out: Transport = config.transport.alerts.parse()?;

    let subscriber = Arc::new(ZmqSubscriber::connect(&upstream).await?);
    let risk_publisher = Arc::new(ZmqPublisher::bind(&risk_out).await?);
    let alert_publisher = Arc::new(ZmqPublisher::bind(&alerts_out).await?);

    let timeout = config.transport.publish_timeout();
    let mut handler = InferenceStage::new(
        engine,
        config.inference.thresholds,
        StageOutput::new(risk_publisher.clone(), timeout),
        StageOutput::new(alert_publisher, timeout),
    );

    if config.sink.enabled {
        let sink: Arc<dyn RiskSink> = match &config.sink.path {
            Some(path) => Arc::new(JsonlSink::open(path).await?),
            None => {
                tracing::warn!("sink enabled without a path, records are discarded");
                Arc::new(NullSink)
            }
        };
        let handle = SinkHandle::spawn(
            sink,
            config.sink.queue_capacity,
            config.sink.write_timeout(),
            handler.counters().clone(),
        );
        handler = handler.with_sink(handle);
    }

    let stage = Stage::new(handler, subscriber, config.transport.max_in_flight);

    let shutdown = ShutdownSignal::new();
    let worker = Arc::new(StageWorker::new("inference-worker", stage, shutdown.clone()));
    let runner_config = WorkerBuilder::new("inference-worker")
        .health_interval(Duration::from_secs(
            cli.health_interval.unwrap_or(config.service.health_interval_secs),
        ))
        .shutdown_timeout(Duration::from_secs(
            cli.shutdown_timeout.unwrap_or(config.service.shutdown_timeout_secs),
        ))
        .build();

    WorkerRunner::run(worker, risk_publisher, runner_config, shutdown).await?;

    tracing::info!("inference-worker exited cleanly");
    Ok(())
}
