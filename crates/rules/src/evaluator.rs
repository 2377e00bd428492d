//! Recommendation engine: evaluates rule conjunctions against features and risk.

use std::collections::{BTreeMap, HashMap};

use fusionguard_core::Recommendation;

use crate::schema::{Condition, FieldRef, Operator, Rule, RuleSet};

/// Apply `op` to `(actual, target)`. Unknown operators never hold.
pub fn compare(actual: f64, target: f64, op: &Operator) -> bool {
    match op {
        Operator::Gte => actual >= target,
        Operator::Gt => actual > target,
        Operator::Lte => actual <= target,
        Operator::Lt => actual < target,
        Operator::Eq => actual == target,
        Operator::Unknown(_) => false,
    }
}

impl Condition {
    /// An absent field makes the condition false.
    pub fn holds(&self, features: &BTreeMap<String, f64>, risk: &HashMap<String, f64>) -> bool {
        let actual = match self.field_ref() {
            FieldRef::Feature(name) => features.get(name),
            FieldRef::Risk(name) => risk.get(name),
        };
        actual.is_some_and(|&v| compare(v, self.value, &self.op))
    }
}

impl Rule {
    pub fn matches(&self, features: &BTreeMap<String, f64>, risk: &HashMap<String, f64>) -> bool {
        self.when.all.iter().all(|c| c.holds(features, risk))
    }
}

/// Recommendations of every matching rule, in declaration order.
pub fn evaluate(
    rules: &RuleSet,
    features: &BTreeMap<String, f64>,
    risk: &HashMap<String, f64>,
) -> Vec<Recommendation> {
    rules
        .iter()
        .filter(|r| r.matches(features, risk))
        .map(|r| r.then.clone())
        .collect()
}
