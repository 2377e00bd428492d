//! Rule-set loader: reads a single YAML file and validates it.
//!
//! Rules are static for the life of the process; there is no reload.

mod core;
mod error;


pub use self::core::{load_rules, parse_rules, validate};
pub use self::error::{Result, RuleError};
