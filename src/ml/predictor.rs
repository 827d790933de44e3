use std::{fs, sync::Arc};

use crate::core::error::HawkError;
use crate::core::types::{Direction, FeatureContribution, MlDetails};
use crate::ml::model::GbdtModel;
use crate::ml::shap;
use crate::pipeline::features::{FeatureVector, FEATURE_NAMES};

/// Contributions returned per prediction.
const TOP_K: usize = 6;

/// Thread-safe wrapper around the loaded ensemble.
///
/// Inference is CPU-bound, so `predict` hops onto the blocking pool
/// instead of stalling the request task. A predictor without a model is
/// valid; every prediction then reports the model as unavailable and the
/// verdict falls back to heuristics.
pub struct Predictor {
    model: Option<Arc<GbdtModel>>,
}

impl Predictor {
    /// Load from `model_path` when configured, otherwise use the bundled
    /// bootstrap artifact. A broken external artifact disables ML rather
    /// than aborting startup.
    pub fn from_model_path(model_path: Option<&str>) -> Self {
        let model = match model_path {
            Some(path) => match fs::read(path).map_err(HawkError::from).and_then(|bytes| {
                GbdtModel::from_slice(&bytes)
            }) {
                Ok(model) => {
                    tracing::info!(path, trees = model.tree_count(), "model artifact loaded");
                    Some(Arc::new(model))
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "model artifact unusable, running without ML");
                    None
                }
            },
            None => Some(Arc::new(GbdtModel::bundled())),
        };
        Self { model }
    }

    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_NAMES.len()
    }

    /// Score one feature vector. Returns `Ok(None)` when no model is
    /// loaded; inference failures surface as `HawkError::Model` and are
    /// degraded (not propagated) by the orchestrator.
    pub async fn predict(&self, features: FeatureVector) -> Result<Option<MlDetails>, HawkError> {
        let Some(model) = self.model.clone() else {
            return Ok(None);
        };

        let details = tokio::task::spawn_blocking(move || score(&model, &features))
            .await
            .map_err(|e| HawkError::Model(format!("inference task failed: {}", e)))?;
        Ok(Some(details))
    }
}

fn score(model: &GbdtModel, features: &FeatureVector) -> MlDetails {
    let x = features.values();
    let xgb_score = model.predict(x);
    let phi = shap::shap_values(model, x);

    let mut ranked: Vec<usize> = (0..phi.len()).collect();
    ranked.sort_by(|&a, &b| {
        phi[b]
            .abs()
            .partial_cmp(&phi[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let explanation = ranked
        .into_iter()
        .filter(|&i| phi[i] != 0.0)
        .take(TOP_K)
        .map(|i| FeatureContribution {
            feature: FEATURE_NAMES[i].to_string(),
            shap_value: phi[i],
            feature_value: x[i],
            direction: if phi[i] > 0.0 {
                Direction::Risk
            } else {
                Direction::Safe
            },
        })
        .collect();

    MlDetails {
        ml_score: xgb_score,
        xgb_score,
        // Filled by the fuser once trust and risk factors are known.
        dampened_score: xgb_score,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::psl::SuffixList;
    use crate::pipeline::features::extract;
    use crate::pipeline::normalizer::normalize;

    fn features(raw: &str) -> FeatureVector {
        let psl = SuffixList::bundled();
        extract(&normalize(raw, &psl).unwrap())
    }

    #[tokio::test]
    async fn bundled_predictor_scores_in_unit_interval() {
        let predictor = Predictor::from_model_path(None);
        let details = predictor
            .predict(features("https://example.com/"))
            .await
            .unwrap()
            .expect("model loaded");
        assert!((0.0..=1.0).contains(&details.xgb_score));
        assert_eq!(details.ml_score, details.xgb_score);
    }

    #[tokio::test]
    async fn explanation_is_ranked_and_bounded() {
        let predictor = Predictor::from_model_path(None);
        let details = predictor
            .predict(features("http://185.23.14.9/login?verify=1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!details.explanation.is_empty());
        assert!(details.explanation.len() <= TOP_K);
        for pair in details.explanation.windows(2) {
            assert!(pair[0].shap_value.abs() >= pair[1].shap_value.abs());
        }
        for c in &details.explanation {
            let expected = if c.shap_value > 0.0 {
                Direction::Risk
            } else {
                Direction::Safe
            };
            assert_eq!(c.direction, expected);
        }
    }

    #[tokio::test]
    async fn ip_login_scores_above_plain_corporate() {
        let predictor = Predictor::from_model_path(None);
        let risky = predictor
            .predict(features("http://185.23.14.9/login"))
            .await
            .unwrap()
            .unwrap();
        let calm = predictor
            .predict(features("https://example.com/"))
            .await
            .unwrap()
            .unwrap();
        assert!(risky.xgb_score > calm.xgb_score);
    }

    #[tokio::test]
    async fn disabled_predictor_returns_none() {
        let predictor = Predictor::disabled();
        assert!(predictor
            .predict(features("https://example.com/"))
            .await
            .unwrap()
            .is_none());
        assert!(!predictor.is_loaded());
    }

    #[tokio::test]
    async fn missing_artifact_path_disables_ml() {
        let predictor = Predictor::from_model_path(Some("/nonexistent/model.json"));
        assert!(!predictor.is_loaded());
    }
}
