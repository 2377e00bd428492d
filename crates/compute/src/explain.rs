use std::collections::BTreeMap;

use fusionguard_core::KeyValue;

use crate::model::ModelParams;

/// Default number of contributors attached to a risk point.
pub const DEFAULT_EXPLAIN_LIMIT: usize = 5;

/// The `limit` features with the largest absolute `value × coefficient`.
///
/// Features without a coefficient are skipped. Ties on magnitude are broken
/// by feature name, ascending. NaN contributions rank above every finite one.
pub fn top_contributors(
    features: &BTreeMap<String, f64>,
    model: &ModelParams,
    limit: usize,
) -> Vec<KeyValue> {
    let mut contribs: Vec<KeyValue> = features
        .iter()
        .filter_map(|(name, value)| {
            model
                .coefficient(name)
                .map(|c| KeyValue::new(name.clone(), value * c))
        })
        .collect();

    contribs.sort_by(|a, b| {
        b.value
            .abs()
            .total_cmp(&a.value.abs())
            .then_with(|| a.key.cmp(&b.key))
    });
    contribs.truncate(limit);
    contribs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(coefficients: &[(&str, f64)]) -> ModelParams {
        ModelParams {
            coefficients: coefficients.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            intercept: 0.0,
            version: "m".into(),
        }
    }

    fn features(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn ranks_by_absolute_contribution() {
        let m = model(&[("a", 1.0), ("b", -3.0), ("c", 0.5), ("d", 2.0)]);
        let f = features(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0), ("e", 100.0)]);
        let top = top_contributors(&f, &m, 3);
        let keys: Vec<_> = top.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "d", "a"]);
        assert_eq!(top[0].value, -3.0);
    }

    #[test]
    fn features_outside_the_model_are_excluded() {
        let m = model(&[("a", 1.0)]);
        let f = features(&[("a", 0.1), ("z", 1e6)]);
        let top = top_contributors(&f, &m, 5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, "a");
    }

    #[test]
    fn returns_fewer_when_few_qualify() {
        let m = model(&[("a", 1.0), ("b", 1.0)]);
        let f = features(&[("a", 1.0), ("b", 2.0)]);
        assert_eq!(top_contributors(&f, &m, DEFAULT_EXPLAIN_LIMIT).len(), 2);
        assert!(top_contributors(&f, &m, 0).is_empty());
    }

    #[test]
    fn ties_break_by_name() {
        let m = model(&[("zeta", 1.0), ("alpha", -1.0), ("mid", 1.0)]);
        let f = features(&[("zeta", 2.0), ("alpha", 2.0), ("mid", 2.0)]);
        let keys: Vec<_> = top_contributors(&f, &m, 5)
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn nan_contribution_keeps_a_total_order() {
        let m = model(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0)]);
        let f = features(&[("a", 1.0), ("b", f64::NAN), ("c", -3.0), ("d", 2.0)]);
        let keys: Vec<_> = top_contributors(&f, &m, 4)
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec!["b", "c", "d", "a"]);
    }
}
