//! Topic constants for PUB/SUB routing.
//!
//! Topics follow the pattern `fusionguard.<domain>.<event>` so subscribers
//! can select a whole domain by prefix.

/// Common prefix of every topic.
pub const PREFIX: &str = "fusionguard.";

// ── Data path ─────────────────────────────────────────────────────────────

/// Raw multi-channel telemetry points.
pub const TELEMETRY_RAW: &str = "fusionguard.telemetry.raw";

/// A shot finished; per-shot feature state may be released.
pub const SHOT_ENDED: &str = "fusionguard.shot.ended";

/// One feature vector per configured window.
pub const FEATURE_VECTOR: &str = "fusionguard.features.vector";

/// Scored, explained and annotated risk points.
pub const RISK_POINT: &str = "fusionguard.risk.point";

/// Threshold crossings derived from risk points.
pub const RISK_ALERT: &str = "fusionguard.risk.alert";

// ── Operations ────────────────────────────────────────────────────────────

/// Periodic worker health heartbeat.
pub const WORKER_HEALTH: &str = "fusionguard.worker.health";
