//! Operational event payloads carried by [`Message`](crate::Message) envelopes.

use serde::{Deserialize, Serialize};

/// Worker health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Periodic heartbeat published by every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    /// Worker name, e.g. `feature-worker`.
    pub worker_id: String,
    pub status: WorkerStatus,
    /// Seconds since the worker started.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_wire_shape() {
        let h = WorkerHealth {
            worker_id: "inference-worker".into(),
            status: WorkerStatus::Unhealthy,
            uptime_secs: 12,
        };
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["worker_id"], "inference-worker");
        let back: WorkerHealth = serde_json::from_value(json).unwrap();
        assert_eq!(back, h);
    }
}
