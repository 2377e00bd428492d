//! Linear risk model, its calibration, and the artifacts they load from.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use fusionguard_core::FeatureVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors raised while loading model, calibration or rule artifacts at startup.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("read {kind} artifact {path}: {source}")]
    Io {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {kind} artifact: {source}")]
    Parse {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule set: {0}")]
    Rules(#[from] fusionguard_rules::RuleError),
}

fn read_artifact(kind: &'static str, path: &Path) -> Result<String, ArtifactError> {
    std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        kind,
        path: path.display().to_string(),
        source,
    })
}

/// Coefficients of the linear disruption model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default)]
    pub coefficients: HashMap<String, f64>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub version: String,
}

impl ModelParams {
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        serde_json::from_str(json).map_err(|source| ArtifactError::Parse {
            kind: "model",
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let model = Self::from_json(&read_artifact("model", path.as_ref())?)?;
        info!(
            version = %model.version,
            coefficients = model.coefficients.len(),
            "loaded model"
        );
        Ok(model)
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.coefficients.get(name).copied()
    }

    /// `intercept + Σ value × coefficient` over features the model knows.
    pub fn raw_score(&self, features: &BTreeMap<String, f64>) -> f64 {
        features
            .iter()
            .filter_map(|(name, value)| self.coefficient(name).map(|c| value * c))
            .fold(self.intercept, |acc, term| acc + term)
    }
}

/// Monotone mapping from raw score to probability: `sigmoid(score × scale + offset)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub version: String,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            version: String::new(),
        }
    }
}

impl Calibration {
    /// A zero scale in the artifact means "unset" and is read as 1.
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let mut calibration: Self =
            serde_json::from_str(json).map_err(|source| ArtifactError::Parse {
                kind: "calibration",
                source,
            })?;
        if calibration.scale == 0.0 {
            calibration.scale = 1.0;
        }
        Ok(calibration)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let calibration = Self::from_json(&read_artifact("calibration", path.as_ref())?)?;
        info!(
            version = %calibration.version,
            scale = calibration.scale,
            offset = calibration.offset,
            "loaded calibration"
        );
        Ok(calibration)
    }

    pub fn apply(&self, score: f64) -> f64 {
        sigmoid(score * self.scale + self.offset)
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Risk at each prediction horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonRisk {
    pub h50: f64,
    pub h200: f64,
}

impl HorizonRisk {
    pub const H50: &'static str = "risk_h50";
    pub const H200: &'static str = "risk_h200";

    /// Derive both horizons from the calibrated 50 ms probability.
    ///
    /// The 200 ms horizon is a fixed squashing of the 50 ms one, not an
    /// independently trained model.
    pub fn from_h50(p: f64) -> Self {
        Self {
            h50: p,
            h200: (p * 0.9 + 0.05).min(1.0),
        }
    }

    /// Lookup table used by rule conditions.
    pub fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([
            (Self::H50.to_string(), self.h50),
            (Self::H200.to_string(), self.h200),
        ])
    }
}

/// Applies the linear model and calibration to feature vectors. Stateless.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    model: ModelParams,
    calibration: Calibration,
}

impl RiskScorer {
    pub fn new(model: ModelParams, calibration: Calibration) -> Self {
        Self { model, calibration }
    }

    pub fn model(&self) -> &ModelParams {
        &self.model
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn raw_score(&self, vector: &FeatureVector) -> f64 {
        self.model.raw_score(&vector.features)
    }

    /// Calibrated probability in `[0, 1]`.
    pub fn score(&self, vector: &FeatureVector) -> f64 {
        self.calibration.apply(self.raw_score(vector))
    }

    pub fn horizons(&self, vector: &FeatureVector) -> HorizonRisk {
        HorizonRisk::from_h50(self.score(vector))
    }
}
