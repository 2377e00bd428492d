use fusionguard_core::config::InferenceConfig;
use fusionguard_core::{FeatureVector, RiskPoint};
use fusionguard_rules::{evaluate, load_rules, RuleSet};
use tracing::info;

use crate::explain::top_contributors;
use crate::model::{ArtifactError, Calibration, ModelParams, RiskScorer};

/// Score, explain and recommend for one feature vector.
///
/// Everything here is read-only after construction, so a single engine can be
/// shared across concurrently running handlers without locking.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    scorer: RiskScorer,
    rules: RuleSet,
    explain_limit: usize,
}

impl RiskEngine {
    pub fn new(
        model: ModelParams,
        calibration: Calibration,
        rules: RuleSet,
        explain_limit: usize,
    ) -> Self {
        Self {
            scorer: RiskScorer::new(model, calibration),
            rules,
            explain_limit,
        }
    }

    /// Load model, calibration and rules from the paths in `config`.
    pub fn load(config: &InferenceConfig) -> Result<Self, ArtifactError> {
        let model = ModelParams::load(&config.model_path)?;
        let calibration = Calibration::load(&config.calibration_path)?;
        let rules = load_rules(&config.rules_path)?;

        info!(
            model_version = %model.version,
            calibration_version = %calibration.version,
            rules = rules.len(),
            explain_limit = config.explain_limit,
            "risk engine ready"
        );
        Ok(Self::new(model, calibration, rules, config.explain_limit))
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Build the full risk point for `vector`.
    pub fn assess(&self, vector: &FeatureVector) -> RiskPoint {
        let risk = self.scorer.horizons(vector);
        let model = self.scorer.model();
        let top_features = top_contributors(&vector.features, model, self.explain_limit);
        let recommendations = evaluate(&self.rules, &vector.features, &risk.as_map());

        RiskPoint {
            shot_id: vector.shot_id.clone(),
            ts_unix_ns: vector.ts_unix_ns,
            risk_h50: risk.h50,
            risk_h200: risk.h200,
            model_version: model.version.clone(),
            calibration_version: self.scorer.calibration().version.clone(),
            top_features,
            recommendations,
        }
    }
}
