use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quality flag attached to each channel sample by the acquisition system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleQuality {
    #[default]
    Good,
    Missing,
    Outlier,
}

impl std::fmt::Display for SampleQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleQuality::Good => write!(f, "good"),
            SampleQuality::Missing => write!(f, "missing"),
            SampleQuality::Outlier => write!(f, "outlier"),
        }
    }
}

/// One channel reading inside a telemetry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSample {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub quality: SampleQuality,
}

impl ChannelSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            quality: SampleQuality::Good,
        }
    }
}

/// A multi-channel sample for one shot at one instant.
///
/// Timestamps for a given `shot_id` are expected to increase strictly; the
/// ingestion boundary enforces that; the pipeline only tolerates violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub shot_id: String,
    pub ts_unix_ns: i64,
    pub channels: Vec<ChannelSample>,
}

/// Reasons a telemetry point is rejected at a stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing shot_id")]
    MissingShotId,

    #[error("no channels")]
    NoChannels,

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),
}

impl TelemetryPoint {
    pub fn new(shot_id: impl Into<String>, ts_unix_ns: i64, channels: Vec<ChannelSample>) -> Self {
        Self {
            shot_id: shot_id.into(),
            ts_unix_ns,
            channels,
        }
    }

    /// Check the structural invariants of a point.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.shot_id.is_empty() {
            return Err(ValidationError::MissingShotId);
        }
        if self.channels.is_empty() {
            return Err(ValidationError::NoChannels);
        }
        if self.ts_unix_ns <= 0 {
            return Err(ValidationError::InvalidTimestamp(self.ts_unix_ns));
        }
        Ok(())
    }
}

/// Lifecycle marker published when a shot finishes, so per-shot state can be released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotEnded {
    pub shot_id: String,
}
