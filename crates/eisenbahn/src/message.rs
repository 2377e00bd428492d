use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EisenbahnError;

/// Current payload schema version.
pub const SCHEMA_VERSION: u16 = 1;

/// Wire-format message envelope shared by every stage.
///
/// The envelope itself is MessagePack-framed on the socket; the payload
/// inside it is the JSON encoding of the domain type, so the JSON shapes
/// of telemetry points, feature vectors and risk points stay readable by
/// external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Routing topic for PUB/SUB prefix filtering (e.g. "fusionguard.risk.point").
    pub topic: String,

    /// JSON-encoded payload bytes.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    /// Correlation ID carried from an inbound message to everything derived from it.
    pub correlation_id: Uuid,

    /// Schema version for forward-compatible evolution.
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    SCHEMA_VERSION
}

impl Message {
    /// Create a new message with a fresh correlation ID.
    pub fn new<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, EisenbahnError> {
        Self::with_correlation(topic, payload, Uuid::new_v4())
    }

    /// Create a message that continues an existing correlation chain.
    pub fn with_correlation<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, EisenbahnError> {
        Ok(Self {
            topic: topic.into(),
            payload: serde_json::to_vec(payload)?,
            timestamp: Utc::now(),
            correlation_id,
            version: SCHEMA_VERSION,
        })
    }

    /// Wrap already-encoded payload bytes, e.g. when replaying captured input.
    pub fn from_raw(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
            version: SCHEMA_VERSION,
        }
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EisenbahnError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Serialize this entire message envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EisenbahnError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize a message envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EisenbahnError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Serialize `Vec<u8>` as a MessagePack bin rather than an array of integers.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
