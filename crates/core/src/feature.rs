use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key under which the missing-channel ratio is stored in every feature map.
pub const MISSING_RATIO_KEY: &str = "missing_ratio";

/// Per-window statistics computed for every channel, in emission order.
pub const WINDOW_STATS: [&str; 7] = ["mean", "std", "min", "max", "slope", "last", "delta"];

/// Build the canonical feature name `{channel}_{stat}_w{window_ms}`.
pub fn feature_key(channel: &str, stat: &str, window_ms: u32) -> String {
    format!("{channel}_{stat}_w{window_ms}")
}

/// Features computed from one telemetry point for one window size.
///
/// The map is ordered so that every consumer iterates features in the same
/// sequence, which keeps downstream floating-point sums reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub shot_id: String,
    pub ts_unix_ns: i64,
    pub window_ms: u32,
    pub features: BTreeMap<String, f64>,
    pub missing_ratio: f64,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }
}
