use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::schema::RuleSet;

use super::error::{Result, RuleError};

/// Load and validate the rule set at `path`.
///
/// Any failure here is fatal for the caller: a stage must not score
/// without its rules.
pub fn load_rules(path: impl AsRef<Path>) -> Result<RuleSet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let rules = parse_rules(&content)?;
    info!(path = %path.display(), count = rules.len(), "loaded rule set");
    Ok(rules)
}

/// Parse and validate a rule set from YAML text.
pub fn parse_rules(yaml: &str) -> Result<RuleSet> {
    let rules: RuleSet = serde_yaml::from_str(yaml)?;
    validate(&rules)?;
    Ok(rules)
}

/// Reject empty or duplicate ids. Unknown operators and empty condition
/// lists are allowed but logged.
pub fn validate(rules: &RuleSet) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, rule) in rules.iter().enumerate() {
        if rule.id.trim().is_empty() {
            return Err(RuleError::Validation(format!("rule #{idx} has an empty id")));
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(RuleError::Validation(format!(
                "duplicate rule id '{}'",
                rule.id
            )));
        }
        if rule.when.all.is_empty() {
            warn!(rule_id = %rule.id, "rule has no conditions and will always match");
        }
        for cond in rule.when.all.iter().filter(|c| !c.op.is_known()) {
            warn!(
                rule_id = %rule.id,
                field = %cond.field,
                op = %cond.op,
                "unknown operator, condition will never hold"
            );
        }
    }
    Ok(())
}
