//! Serialized regression model artifact.
//!
//! The regressor ships as a JSON artifact: a gradient-boosted tree
//! ensemble plus the training-time constants the feature builder needs
//! (categorical vocabularies and per-column means). Inference is a
//! plain tree walk; no runtime training dependencies.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Number of features the model consumes, in fixed order:
/// category_id, subcategory_id, brand_id, department_id,
/// production_price, days_on_shelf, market_median, market_sample_size,
/// market_std.
pub const FEATURE_COUNT: usize = 9;

/// One node of a regression tree. Leaves carry `value`; interior nodes
/// carry a feature/threshold split and child indices.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub feature: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub left: Option<usize>,
    #[serde(default)]
    pub right: Option<usize>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk from the root to a leaf. Malformed trees contribute zero.
    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut index = 0usize;
        // Bounded by node count: a well-formed tree terminates earlier.
        for _ in 0..=self.nodes.len() {
            let Some(node) = self.nodes.get(index) else {
                return 0.0;
            };
            if node.is_leaf() {
                return node.value.unwrap_or(0.0);
            }
            let (Some(feature), Some(threshold)) = (node.feature, node.threshold) else {
                return 0.0;
            };
            let x = features.get(feature).copied().unwrap_or(0.0);
            let child = if x < threshold { node.left } else { node.right };
            match child {
                Some(c) => index = c,
                None => return 0.0,
            }
        }
        0.0
    }
}

/// Per-field categorical vocabularies bundled with the model.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Vocabularies {
    #[serde(default)]
    pub category: HashMap<String, i64>,
    #[serde(default)]
    pub subcategory: HashMap<String, i64>,
    #[serde(default)]
    pub brand: HashMap<String, i64>,
    #[serde(default)]
    pub department: HashMap<String, i64>,
}

/// The full serialized regressor.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub vocab: Vocabularies,
    /// Reserved id for categorical values outside the vocabulary.
    pub unknown_id: i64,
    /// Training means used to fill missing numeric features.
    #[serde(default)]
    pub column_means: HashMap<String, f64>,
    pub base_score: f64,
    /// Validation-derived confidence of the model itself, in [0, 1].
    pub base_confidence: f64,
    pub trees: Vec<Tree>,
}

impl ModelArtifact {
    /// Parse and validate an artifact from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: ModelArtifact =
            serde_json::from_str(json).context("Failed to parse model artifact JSON")?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.len() != FEATURE_COUNT {
            anyhow::bail!(
                "Model artifact declares {} features, expected {FEATURE_COUNT}",
                self.feature_names.len(),
            );
        }
        if !(0.0..=1.0).contains(&self.base_confidence) {
            anyhow::bail!("base_confidence must be in [0, 1]");
        }
        for (t, tree) in self.trees.iter().enumerate() {
            for (n, node) in tree.nodes.iter().enumerate() {
                if node.is_leaf() {
                    continue;
                }
                let ok = node.feature.is_some_and(|f| f < FEATURE_COUNT)
                    && node.threshold.is_some()
                    && node.left.is_some_and(|c| c < tree.nodes.len())
                    && node.right.is_some_and(|c| c < tree.nodes.len());
                if !ok {
                    anyhow::bail!("Malformed node {n} in tree {t}");
                }
            }
        }
        Ok(())
    }

    /// Sum the ensemble over a feature vector.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let boost: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        self.base_score + boost
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
