//! Streaming feature extraction and calibrated risk inference.

pub mod alerts;
pub mod engine;
pub mod explain;
pub mod features;
pub mod model;
pub mod window;

pub use alerts::derive_alerts;
pub use engine::RiskEngine;
pub use explain::{top_contributors, DEFAULT_EXPLAIN_LIMIT};
pub use features::{FeatureBuilder, DEFAULT_ENDED_SHOT_MEMORY};
pub use model::{ArtifactError, Calibration, HorizonRisk, ModelParams, RiskScorer};
pub use window::{ChannelWindow, WindowStats};
