use std::time::Duration;

use fusionguard_core::ValidationError;
use fusionguard_eisenbahn::EisenbahnError;
use thiserror::Error;

use crate::stage::StageState;

/// Errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum StageError {
    /// Payload could not be decoded into the expected type.
    #[error("malformed payload on {topic}: {source}")]
    Malformed {
        topic: String,
        #[source]
        source: EisenbahnError,
    },

    #[error("invalid telemetry point: {0}")]
    Invalid(#[from] ValidationError),

    #[error("no handler for topic {0}")]
    UnexpectedTopic(String),

    #[error("publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: EisenbahnError,
    },

    #[error("publish to {topic} timed out after {timeout:?}")]
    PublishTimeout { topic: String, timeout: Duration },

    #[error("invalid stage transition {from} -> {to}")]
    InvalidTransition { from: StageState, to: StageState },

    #[error("messaging error: {0}")]
    Messaging(#[from] EisenbahnError),
}

impl StageError {
    /// Input problems: the message is dropped and counted as malformed.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            StageError::Malformed { .. } | StageError::Invalid(_) | StageError::UnexpectedTopic(_)
        )
    }
}

impl From<StageError> for EisenbahnError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Messaging(inner) => inner,
            other => EisenbahnError::Transport(other.to_string()),
        }
    }
}
