//! Message payloads and topics owned by the messaging layer.
//!
//! Domain payloads (telemetry, features, risk) live in `fusionguard-core`;
//! this module only carries operational events and the topic table.

pub mod events;
pub mod topics;

pub use events::*;
