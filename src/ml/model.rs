use serde::Deserialize;

use crate::core::error::HawkError;
use crate::pipeline::features::FEATURE_NAMES;

const BUNDLED_MODEL: &str = include_str!("../../data/model.json");
const ARTIFACT_FORMAT: &str = "urlhawk-gbdt";

/// One regression tree in flattened array form. `left[i] < 0` marks node
/// `i` as a leaf; `value` holds leaf margins and `cover` the training
/// sample weight that reached each node (required for attribution).
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub split_feature: Vec<i32>,
    pub threshold: Vec<f64>,
    pub left: Vec<i32>,
    pub right: Vec<i32>,
    pub value: Vec<f64>,
    pub cover: Vec<f64>,
}

impl Tree {
    fn validate(&self, index: usize, feature_count: usize) -> Result<(), HawkError> {
        let n = self.split_feature.len();
        let consistent = [
            self.threshold.len(),
            self.left.len(),
            self.right.len(),
            self.value.len(),
            self.cover.len(),
        ]
        .iter()
        .all(|len| *len == n);
        if n == 0 || !consistent {
            return Err(HawkError::Model(format!(
                "tree {} has inconsistent node arrays",
                index
            )));
        }
        for i in 0..n {
            if self.left[i] >= 0 {
                let (l, r) = (self.left[i] as usize, self.right[i] as usize);
                let f = self.split_feature[i];
                if l >= n || r >= n || f < 0 || f as usize >= feature_count {
                    return Err(HawkError::Model(format!(
                        "tree {} node {} is out of range",
                        index, i
                    )));
                }
            }
            if self.cover[i] <= 0.0 {
                return Err(HawkError::Model(format!(
                    "tree {} node {} has non-positive cover",
                    index, i
                )));
            }
        }
        Ok(())
    }

    /// Margin contribution of this tree for one instance.
    pub fn margin(&self, x: &[f64]) -> f64 {
        let mut node = 0usize;
        while self.left[node] >= 0 {
            let f = self.split_feature[node] as usize;
            node = if x[f] < self.threshold[node] {
                self.left[node] as usize
            } else {
                self.right[node] as usize
            };
        }
        self.value[node]
    }

    /// Cover-weighted expected leaf value (the tree's base rate).
    pub fn expected_value(&self) -> f64 {
        self.expected_at(0)
    }

    fn expected_at(&self, node: usize) -> f64 {
        if self.left[node] < 0 {
            return self.value[node];
        }
        let l = self.left[node] as usize;
        let r = self.right[node] as usize;
        (self.cover[l] * self.expected_at(l) + self.cover[r] * self.expected_at(r))
            / self.cover[node]
    }
}

#[derive(Debug, Deserialize)]
struct Artifact {
    format: String,
    #[allow(dead_code)]
    version: u32,
    schema_version: String,
    base_score: f64,
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

/// Immutable gradient-boosted tree ensemble with a single probability
/// output. Loaded once at startup and shared read-only across requests.
#[derive(Debug)]
pub struct GbdtModel {
    base_score: f64,
    trees: Vec<Tree>,
    schema_version: String,
}

impl GbdtModel {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HawkError> {
        let artifact: Artifact =
            serde_json::from_slice(bytes).map_err(|e| HawkError::Model(e.to_string()))?;
        if artifact.format != ARTIFACT_FORMAT {
            return Err(HawkError::Model(format!(
                "unsupported artifact format: {}",
                artifact.format
            )));
        }
        if artifact.feature_names.len() != FEATURE_NAMES.len()
            || artifact
                .feature_names
                .iter()
                .zip(FEATURE_NAMES.iter())
                .any(|(a, b)| a != b)
        {
            return Err(HawkError::Model(
                "artifact feature schema does not match the extractor schema".to_string(),
            ));
        }
        for (i, tree) in artifact.trees.iter().enumerate() {
            tree.validate(i, FEATURE_NAMES.len())?;
        }
        Ok(Self {
            base_score: artifact.base_score,
            trees: artifact.trees,
            schema_version: artifact.schema_version,
        })
    }

    /// The artifact embedded in the crate; replaced in deployments via
    /// `model_path`.
    pub fn bundled() -> Self {
        Self::from_slice(BUNDLED_MODEL.as_bytes()).expect("bundled model artifact parses")
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Raw additive margin (log-odds space).
    pub fn margin(&self, x: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.margin(x)).sum::<f64>()
    }

    /// P(malicious) in [0, 1].
    pub fn predict(&self, x: &[f64]) -> f64 {
        sigmoid(self.margin(x))
    }

    /// Margin the ensemble produces on average (its base rate), used to
    /// check attribution additivity.
    pub fn expected_margin(&self) -> f64 {
        self.base_score + self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}
