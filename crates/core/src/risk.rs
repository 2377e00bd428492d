use serde::{Deserialize, Serialize};

/// Named value pair, used for the ranked feature contributions on a risk point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: f64,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Mitigation suggestion produced when a rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub confidence: f64,
    pub rationale: String,
}

/// Calibrated disruption risk for one feature vector, with its explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPoint {
    pub shot_id: String,
    pub ts_unix_ns: i64,
    pub risk_h50: f64,
    pub risk_h200: f64,
    pub model_version: String,
    pub calibration_version: String,
    pub top_features: Vec<KeyValue>,
    pub recommendations: Vec<Recommendation>,
}

/// Alert severity derived from the risk level that crossed a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// Event raised when a horizon's risk reaches its configured alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub shot_id: String,
    pub ts_unix_ns: i64,
    pub kind: String,
    pub message: String,
    pub severity: Severity,
}
