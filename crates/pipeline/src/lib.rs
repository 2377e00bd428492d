//! Pipeline orchestration: stages that connect telemetry, features and risk
//! over the messaging layer, plus the worker wiring the binaries use.

pub mod counters;
pub mod error;
pub mod feature_stage;
pub mod inference_stage;
pub mod runner;
pub mod sink;
pub mod stage;

pub use counters::{CounterSnapshot, StageCounters};
pub use error::StageError;
pub use feature_stage::FeatureStage;
pub use inference_stage::InferenceStage;
pub use runner::StageWorker;
pub use sink::{JsonlSink, NullSink, RiskSink, SinkError, SinkHandle, SinkRecord};
pub use stage::{decode, Stage, StageHandler, StageOutput, StageState};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
