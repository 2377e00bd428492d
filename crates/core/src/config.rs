use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.trim().parse().ok())
}

/// Split a comma-separated env value, dropping blank items.
fn env_list(key: &str) -> Option<Vec<String>> {
    env_opt(key).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

// ── Top-level config ──────────────────────────────────────────

/// Full runtime configuration for the feature and inference stages.
///
/// Parsed from `fusionguard.toml`; `FUSIONGUARD_SECTION_KEY` environment
/// variables override individual keys. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionGuardConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    pub features: FeaturesConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

impl FusionGuardConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `FUSIONGUARD_SECTION_KEY` overrides `section.key`; list
    /// values are comma-separated.
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("FUSIONGUARD_SERVICE_NAME") {
            self.service.name = v;
        }
        if let Some(v) = env_opt("FUSIONGUARD_TRANSPORT_RAW") {
            self.transport.raw = v;
        }
        if let Some(v) = env_opt("FUSIONGUARD_TRANSPORT_FEATURES") {
            self.transport.features = v;
        }
        if let Some(v) = env_opt("FUSIONGUARD_TRANSPORT_RISK") {
            self.transport.risk = v;
        }
        if let Some(v) = env_opt("FUSIONGUARD_TRANSPORT_ALERTS") {
            self.transport.alerts = v;
        }
        if let Some(v) = env_parse("FUSIONGUARD_TRANSPORT_PUBLISH_TIMEOUT_MS") {
            self.transport.publish_timeout_ms = v;
        }
        if let Some(v) = env_parse("FUSIONGUARD_TRANSPORT_MAX_IN_FLIGHT") {
            self.transport.max_in_flight = v;
        }
        if let Some(items) = env_list("FUSIONGUARD_FEATURES_WINDOWS_MS") {
            let parsed: Result<Vec<u32>, _> = items.iter().map(|s| s.parse()).collect();
            match parsed {
                Ok(windows) => self.features.windows_ms = windows,
                Err(e) => tracing::warn!(error = %e, "ignoring FUSIONGUARD_FEATURES_WINDOWS_MS"),
            }
        }
        if let Some(channels) = env_list("FUSIONGUARD_FEATURES_CHANNELS") {
            self.features.channels = channels;
        }
        if let Some(v) = env_opt("FUSIONGUARD_INFERENCE_MODEL_PATH") {
            self.inference.model_path = PathBuf::from(v);
        }
        if let Some(v) = env_opt("FUSIONGUARD_INFERENCE_CALIBRATION_PATH") {
            self.inference.calibration_path = PathBuf::from(v);
        }
        if let Some(v) = env_opt("FUSIONGUARD_INFERENCE_RULES_PATH") {
            self.inference.rules_path = PathBuf::from(v);
        }
        if let Some(v) = env_parse("FUSIONGUARD_INFERENCE_RISK_H50_ALERT") {
            self.inference.thresholds.risk_h50_alert = v;
        }
        if let Some(v) = env_parse("FUSIONGUARD_INFERENCE_RISK_H200_ALERT") {
            self.inference.thresholds.risk_h200_alert = v;
        }
        if let Some(v) = env_parse("FUSIONGUARD_SINK_ENABLED") {
            self.sink.enabled = v;
        }
        if let Some(v) = env_opt("FUSIONGUARD_SINK_PATH") {
            self.sink.path = Some(PathBuf::from(v));
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.features.windows_ms.is_empty() {
            return Err(CoreError::InvalidConfig("features.windows_ms is required".into()));
        }
        if self.features.windows_ms.contains(&0) {
            return Err(CoreError::InvalidConfig(
                "features.windows_ms entries must be positive".into(),
            ));
        }
        if self.features.channels.is_empty() {
            return Err(CoreError::InvalidConfig("features.channels is required".into()));
        }
        let t = &self.inference.thresholds;
        for (name, value) in [("risk_h50_alert", t.risk_h50_alert), ("risk_h200_alert", t.risk_h200_alert)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::InvalidConfig(format!(
                    "inference.thresholds.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.transport.max_in_flight == 0 {
            return Err(CoreError::InvalidConfig("transport.max_in_flight must be > 0".into()));
        }
        if self.sink.queue_capacity == 0 {
            return Err(CoreError::InvalidConfig("sink.queue_capacity must be > 0".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (service: {}):", self.service.name);
        tracing::info!(
            "  transport:  raw={}, features={}, risk={}, alerts={}",
            self.transport.raw,
            self.transport.features,
            self.transport.risk,
            self.transport.alerts
        );
        tracing::info!(
            "  features:   windows_ms={:?}, channels={:?}",
            self.features.windows_ms,
            self.features.channels
        );
        tracing::info!(
            "  inference:  model={}, calibration={}, rules={}",
            self.inference.model_path.display(),
            self.inference.calibration_path.display(),
            self.inference.rules_path.display()
        );
        tracing::info!(
            "  thresholds: h50={}, h200={}",
            self.inference.thresholds.risk_h50_alert,
            self.inference.thresholds.risk_h200_alert
        );
        tracing::info!(
            "  sink:       enabled={}, path={}",
            self.sink.enabled,
            self.sink
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".into())
        );
    }
}

// ── Service ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_service_name() -> String {
    "fusionguard".into()
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            health_interval_secs: default_health_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

// ── Transport ─────────────────────────────────────────────────

/// Endpoints are `ipc://…` or `tcp://host:port` strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_raw_endpoint")]
    pub raw: String,
    #[serde(default = "default_features_endpoint")]
    pub features: String,
    #[serde(default = "default_risk_endpoint")]
    pub risk: String,
    #[serde(default = "default_alerts_endpoint")]
    pub alerts: String,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_raw_endpoint() -> String {
    "ipc:///tmp/fusionguard/telemetry-raw.sock".into()
}

fn default_features_endpoint() -> String {
    "ipc:///tmp/fusionguard/features.sock".into()
}

fn default_risk_endpoint() -> String {
    "ipc:///tmp/fusionguard/risk.sock".into()
}

fn default_alerts_endpoint() -> String {
    "ipc:///tmp/fusionguard/alerts.sock".into()
}

fn default_publish_timeout_ms() -> u64 {
    500
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            raw: default_raw_endpoint(),
            features: default_features_endpoint(),
            risk: default_risk_endpoint(),
            alerts: default_alerts_endpoint(),
            publish_timeout_ms: default_publish_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl TransportConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

// ── Features ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub windows_ms: Vec<u32>,
    pub channels: Vec<String>,
}

// ── Inference ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_calibration_path")]
    pub calibration_path: PathBuf,
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    #[serde(default = "default_explain_limit")]
    pub explain_limit: usize,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("artifacts/model.json")
}

fn default_calibration_path() -> PathBuf {
    PathBuf::from("artifacts/calibration.json")
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("config/rules.yaml")
}

fn default_explain_limit() -> usize {
    5
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            calibration_path: default_calibration_path(),
            rules_path: default_rules_path(),
            explain_limit: default_explain_limit(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

/// Alert thresholds per prediction horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_h50_alert")]
    pub risk_h50_alert: f64,
    #[serde(default = "default_h200_alert")]
    pub risk_h200_alert: f64,
}

fn default_h50_alert() -> f64 {
    0.8
}

fn default_h200_alert() -> f64 {
    0.8
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            risk_h50_alert: default_h50_alert(),
            risk_h200_alert: default_h200_alert(),
        }
    }
}

// ── Sink ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: default_queue_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
            path: None,
        }
    }
}

impl SinkConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[features]
windows_ms = [50, 200]
channels = ["ip", "ne", "dwdt", "prad", "h_alpha"]
"#;

    #[test]
    fn parse_minimal_toml_uses_defaults() {
        let cfg = FusionGuardConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.features.windows_ms, vec![50, 200]);
        assert_eq!(cfg.features.channels.len(), 5);
        assert_eq!(cfg.service.name, "fusionguard");
        assert_eq!(cfg.transport.max_in_flight, 64);
        assert_eq!(cfg.transport.publish_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.inference.explain_limit, 5);
        assert_eq!(cfg.inference.thresholds.risk_h50_alert, 0.8);
        assert!(!cfg.sink.enabled);
        assert_eq!(cfg.sink.queue_capacity, 1024);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[service]
name = "inference"
health_interval_secs = 5

[transport]
raw = "tcp://127.0.0.1:7000"
features = "tcp://127.0.0.1:7001"
risk = "tcp://127.0.0.1:7002"
alerts = "tcp://127.0.0.1:7003"
publish_timeout_ms = 250
max_in_flight = 8

[features]
windows_ms = [50]
channels = ["ip"]

[inference]
model_path = "/models/model.json"
calibration_path = "/models/calibration.json"
rules_path = "/models/rules.yaml"
explain_limit = 3

[inference.thresholds]
risk_h50_alert = 0.7
risk_h200_alert = 0.6

[sink]
enabled = true
queue_capacity = 16
path = "/var/lib/fusionguard/risk.jsonl"
"#;
        let cfg = FusionGuardConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.service.name, "inference");
        assert_eq!(cfg.service.health_interval_secs, 5);
        assert_eq!(cfg.service.shutdown_timeout_secs, 10);
        assert_eq!(cfg.transport.features, "tcp://127.0.0.1:7001");
        assert_eq!(cfg.transport.max_in_flight, 8);
        assert_eq!(cfg.inference.explain_limit, 3);
        assert_eq!(cfg.inference.thresholds.risk_h200_alert, 0.6);
        assert_eq!(cfg.sink.queue_capacity, 16);
        assert_eq!(
            cfg.sink.path.as_deref(),
            Some(Path::new("/var/lib/fusionguard/risk.jsonl"))
        );
    }

    #[test]
    fn rejects_empty_windows() {
        let toml = r#"
[features]
windows_ms = []
channels = ["ip"]
"#;
        let err = FusionGuardConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("windows_ms"));
    }

    #[test]
    fn rejects_zero_window() {
        let toml = r#"
[features]
windows_ms = [50, 0]
channels = ["ip"]
"#;
        assert!(FusionGuardConfig::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_empty_channels() {
        let toml = r#"
[features]
windows_ms = [50]
channels = []
"#;
        let err = FusionGuardConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let toml = r#"
[features]
windows_ms = [50]
channels = ["ip"]

[inference.thresholds]
risk_h50_alert = 1.5
"#;
        let err = FusionGuardConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("risk_h50_alert"));
    }

    #[test]
    fn missing_features_section_is_a_parse_error() {
        let err = FusionGuardConfig::from_toml("[service]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn from_file_reports_io_error() {
        let err = FusionGuardConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
