//! YAML rule-set schema.
//!
//! ```yaml
//! rules:
//!   - id: high-h50
//!     when:
//!       all:
//!         - { field: risk_h50, op: gte, value: 0.8 }
//!         - { field: feature.ip_std_w50, op: gt, value: 0.1 }
//!     then:
//!       action: reduce_heating
//!       confidence: 0.7
//!       rationale: Rising current variance with high near-term risk
//! ```

use std::fmt;

use fusionguard_core::Recommendation;
use serde::{Deserialize, Serialize};

/// Prefix that routes a condition field to the feature map instead of the risk map.
pub const FEATURE_PREFIX: &str = "feature.";

/// Root of a rule-set file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

/// A conjunction of conditions and the recommendation it yields when all hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub when: When,
    pub then: Recommendation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct When {
    #[serde(default)]
    pub all: Vec<Condition>,
}

/// `field op value`, e.g. `risk_h50 gte 0.8`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: f64,
}

/// Where a condition's field resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef<'a> {
    Feature(&'a str),
    Risk(&'a str),
}

impl Condition {
    pub fn field_ref(&self) -> FieldRef<'_> {
        match self.field.strip_prefix(FEATURE_PREFIX) {
            Some(name) => FieldRef::Feature(name),
            None => FieldRef::Risk(&self.field),
        }
    }
}

/// Comparison operator. Parsed case-insensitively; anything unrecognised is
/// kept verbatim so the rule set still loads, and never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Unknown(String),
}

impl Operator {
    pub fn is_known(&self) -> bool {
        !matches!(self, Operator::Unknown(_))
    }
}

impl From<&str> for Operator {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "gte" => Operator::Gte,
            "gt" => Operator::Gt,
            "lte" => Operator::Lte,
            "lt" => Operator::Lt,
            "eq" => Operator::Eq,
            _ => Operator::Unknown(s.to_string()),
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        Operator::from(s.as_str())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Gte => write!(f, "gte"),
            Operator::Gt => write!(f, "gt"),
            Operator::Lte => write!(f, "lte"),
            Operator::Lt => write!(f, "lt"),
            Operator::Eq => write!(f, "eq"),
            Operator::Unknown(name) => write!(f, "{name}"),
        }
    }
}
