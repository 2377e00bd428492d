pub mod config;
pub mod error;
pub mod feature;
pub mod risk;
pub mod telemetry;

pub use config::FusionGuardConfig;
pub use error::*;
pub use feature::*;
pub use risk::*;
pub use telemetry::*;
