//! Declarative threshold rules that turn risk into mitigation recommendations.
//!
//! This crate provides:
//! - YAML rule-set schema with serde deserialization
//! - A loader that validates ids and flags unknown operators
//! - The evaluator that matches rule conjunctions against features and risk

pub mod evaluator;
pub mod loader;
pub mod schema;

pub use evaluator::{compare, evaluate};
pub use loader::{load_rules, parse_rules, RuleError};
pub use schema::{Condition, Operator, Rule, RuleSet, When};
