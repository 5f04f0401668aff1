//! Feature assembly and ML inference.
//!
//! The adapter owns the loaded model artifact and turns the per-request
//! signals (query, market sample, internal aggregate) into the fixed
//! feature vector the regressor was trained on. The adapter degrades
//! rather than fails: a missing or malformed artifact, or an unfillable
//! feature, simply makes the ML signal unavailable for that call and
//! the recommendation engine falls back to the blend.

pub mod artifact;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::types::{d, InternalAggregate, MarketSample};
pub use artifact::{ModelArtifact, FEATURE_COUNT};

/// Per-imputed-feature confidence penalty.
const IMPUTATION_PENALTY: f64 = 0.05;

/// The ML signal for one call.
#[derive(Debug, Clone)]
pub struct MlPrediction {
    pub price: Decimal,
    /// Model confidence for this call, in [0, 1].
    pub confidence: f64,
}

/// Raw inputs available to the feature builder for one request.
#[derive(Debug, Clone, Default)]
pub struct FeatureInputs {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub department: Option<String>,
    pub production_price: Option<f64>,
    pub days_on_shelf: Option<f64>,
    pub market_median: Option<f64>,
    pub market_sample_size: Option<f64>,
    pub market_std: Option<f64>,
}

impl FeatureInputs {
    /// Assemble inputs from the pipeline signals.
    pub fn from_signals(market: &MarketSample, internal: Option<&InternalAggregate>) -> Self {
        FeatureInputs {
            category: internal.map(|agg| agg.category.clone()),
            subcategory: None,
            brand: None,
            department: None,
            production_price: None,
            days_on_shelf: internal.map(|agg| agg.days_on_shelf),
            market_median: market.median.and_then(|m| m.to_f64()),
            market_sample_size: market
                .has_stats()
                .then_some(market.sample_size as f64),
            market_std: market.std_dev.and_then(|s| s.to_f64()),
        }
    }
}

/// Wrapper around the optional model artifact.
pub struct MlAdapter {
    artifact: Option<ModelArtifact>,
}

impl MlAdapter {
    /// Load the artifact from a filesystem path or an http(s) URL.
    ///
    /// Failures are logged and leave the adapter in the unavailable
    /// state; the service still starts.
    pub async fn load(source: &str) -> Self {
        let json = if source.starts_with("http://") || source.starts_with("https://") {
            match fetch_remote(source).await {
                Ok(json) => json,
                Err(e) => {
                    warn!(source, error = %e, "Model artifact fetch failed; ML disabled");
                    return Self { artifact: None };
                }
            }
        } else {
            match std::fs::read_to_string(source) {
                Ok(json) => json,
                Err(e) => {
                    warn!(source, error = %e, "Model artifact unreadable; ML disabled");
                    return Self { artifact: None };
                }
            }
        };

        match ModelArtifact::from_json(&json) {
            Ok(artifact) => {
                info!(
                    source,
                    trees = artifact.trees.len(),
                    base_confidence = artifact.base_confidence,
                    "Model artifact loaded"
                );
                Self {
                    artifact: Some(artifact),
                }
            }
            Err(e) => {
                warn!(source, error = %e, "Model artifact malformed; ML disabled");
                Self { artifact: None }
            }
        }
    }

    /// An adapter with no model (tests, explicit opt-out).
    pub fn disabled() -> Self {
        Self { artifact: None }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            artifact: Some(artifact),
        }
    }

    /// Whether an artifact is loaded at all.
    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    /// Run inference for one call. `None` means the ML signal is
    /// unavailable (no artifact, or an unfillable feature).
    pub fn predict(&self, inputs: &FeatureInputs) -> Option<MlPrediction> {
        let artifact = self.artifact.as_ref()?;

        let mut features = [0.0f64; FEATURE_COUNT];
        let mut imputed = 0usize;

        // Categorical features: vocabulary id or the unknown bucket.
        let cats = [
            (inputs.category.as_deref(), &artifact.vocab.category),
            (inputs.subcategory.as_deref(), &artifact.vocab.subcategory),
            (inputs.brand.as_deref(), &artifact.vocab.brand),
            (inputs.department.as_deref(), &artifact.vocab.department),
        ];
        for (i, (value, vocab)) in cats.iter().enumerate() {
            match value.and_then(|v| vocab.get(v)) {
                Some(id) => features[i] = *id as f64,
                None => {
                    features[i] = artifact.unknown_id as f64;
                    imputed += 1;
                }
            }
        }

        // Numeric features: live value or the bundled training mean.
        let numerics = [
            (4, "production_price", inputs.production_price),
            (5, "days_on_shelf", inputs.days_on_shelf),
            (6, "market_median", inputs.market_median),
            (7, "market_sample_size", inputs.market_sample_size),
            (8, "market_std", inputs.market_std),
        ];
        for (i, name, value) in numerics {
            match value {
                Some(v) => features[i] = v,
                None => match artifact.column_means.get(name) {
                    Some(mean) => {
                        features[i] = *mean;
                        imputed += 1;
                    }
                    None => {
                        // No live value and no training mean: the
                        // feature vector cannot be completed.
                        warn!(feature = name, "Unfillable model feature; ML unavailable");
                        return None;
                    }
                },
            }
        }

        let price = artifact.predict(&features);
        if !price.is_finite() || price < 0.0 {
            warn!(price, "Model produced an unusable price; ML unavailable");
            return None;
        }

        let confidence =
            (artifact.base_confidence - IMPUTATION_PENALTY * imputed as f64).clamp(0.0, 1.0);

        Some(MlPrediction {
            price: d(price),
            confidence,
        })
    }
}

async fn fetch_remote(url: &str) -> anyhow::Result<String> {
    use anyhow::Context;
    let resp = reqwest::get(url)
        .await
        .context("Model artifact request failed")?;
    if !resp.status().is_success() {
        anyhow::bail!("Model artifact server returned {}", resp.status());
    }
    resp.text().await.context("Failed to read model artifact body")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
