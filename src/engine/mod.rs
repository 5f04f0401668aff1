//! Orchestrator — the top-level `recommend(query)` pipeline.
//!
//! Validates the query, consults the request cache, fans out to the
//! internal matcher and the scrape session concurrently, feeds the
//! joined signals through the ML adapter, and hands everything to the
//! recommendation engine. Each served call emits one structured log
//! record.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStats, RequestCache};
use crate::internal::Matcher;
use crate::model::{FeatureInputs, MlAdapter};
use crate::scrape::SessionManager;
use crate::strategy::{self, MlSignal, RecommendInputs};
use crate::types::{InternalAggregate, PricingError, Query, Recommendation};
use crate::upc;

/// Caller-supplied internal metrics that replace the matching engine's
/// output for one call.
#[derive(Debug, Clone, Deserialize)]
pub struct InternalOverride {
    pub internal_price: Decimal,
    pub sell_through_rate: f64,
    pub days_on_shelf: f64,
    pub category: String,
}

impl From<InternalOverride> for InternalAggregate {
    fn from(ov: InternalOverride) -> Self {
        InternalAggregate {
            // An override carries no record provenance.
            matched_count: 0,
            internal_price: ov.internal_price,
            sell_through_rate: ov.sell_through_rate,
            days_on_shelf: ov.days_on_shelf,
            category: ov.category,
        }
    }
}

/// The assembled pricing pipeline. One instance per process.
pub struct Pricer {
    matcher: Arc<Matcher>,
    session: SessionManager,
    ml: Arc<MlAdapter>,
    cache: RequestCache,
}

impl Pricer {
    pub fn new(
        matcher: Arc<Matcher>,
        session: SessionManager,
        ml: Arc<MlAdapter>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            matcher,
            session,
            ml,
            cache: RequestCache::new(cache_ttl_secs),
        }
    }

    /// The top-level operation: validate, cache, compute.
    ///
    /// Calls carrying an internal override bypass the cache entirely —
    /// the override is per-call input and its result must not be served
    /// to other callers of the same query.
    pub async fn recommend(
        &self,
        raw_query: &str,
        override_internal: Option<InternalOverride>,
    ) -> Result<Recommendation, PricingError> {
        let query = upc::classify(raw_query)?;

        let result = match override_internal {
            Some(ov) => self.compute(&query, Some(ov.into())).await,
            None => {
                let key = RequestCache::key_for(raw_query);
                self.cache
                    .get_or_compute(&key, || self.compute(&query, None))
                    .await
            }
        };

        match &result {
            Ok(rec) => info!(
                query = %query.canonical,
                kind = %query.kind,
                method = %rec.prediction_method,
                weighting = %rec.internal_vs_market_weighting,
                confidence = rec.confidence_score,
                warnings = rec.warnings.len(),
                "Recommendation served"
            ),
            Err(e) => warn!(query = %query.canonical, error = %e, "Recommendation failed"),
        }

        result
    }

    /// One uncached pipeline pass.
    async fn compute(
        &self,
        query: &Query,
        override_internal: Option<InternalAggregate>,
    ) -> Result<Recommendation, PricingError> {
        // Internal match and market scrape run concurrently; the scrape
        // degrades to an error sample rather than failing the join.
        let (outcome, market) = tokio::join!(
            async { self.matcher.match_query(query) },
            self.session.fetch(&query.canonical),
        );

        let (aggregate, rules_price) = match override_internal {
            Some(agg) => (Some(agg), None),
            None => (outcome.aggregate, outcome.single_production_price),
        };

        let features = FeatureInputs::from_signals(&market, aggregate.as_ref());
        let ml = MlSignal {
            prediction: self.ml.predict(&features),
            model_loaded: self.ml.is_loaded(),
        };

        strategy::recommend(&RecommendInputs {
            query,
            market: &market,
            internal: aggregate.as_ref(),
            ml,
            rules_price,
        })
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    /// Stop the scrape session (process shutdown).
    pub async fn shutdown(&self) {
        self.session.stop().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
