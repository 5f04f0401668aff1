//! Recommendation engine.
//!
//! Fuses the market sample, the internal aggregate, and the ML signal
//! into the final recommendation: source weighting, blended price,
//! confidence score, rationale, and warnings. All price math is Decimal
//! so identical inputs produce identical outputs to the cent.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::model::MlPrediction;
use crate::types::{
    InternalAggregate, InternalData, MarketData, MarketSample, PredictionMethod, PricingError,
    Query, Recommendation, SampleStatus,
};

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

/// Weighting starts balanced before adjustments.
const BASE_WEIGHT: Decimal = dec!(0.5);

/// Minimum per-call model confidence for the ML price to drive the blend.
const ML_USE_THRESHOLD: f64 = 0.7;

/// ML blend coefficients: model, market median, internal price.
const ML_WEIGHT: Decimal = dec!(0.6);
const ML_MARKET_WEIGHT: Decimal = dec!(0.3);
const ML_INTERNAL_WEIGHT: Decimal = dec!(0.1);

/// Markup over production price for the rules fallback.
const RULES_MARKUP: Decimal = dec!(1.5);

/// Deviation from the market median that triggers a warning and a
/// confidence penalty.
const DEVIATION_LIMIT: Decimal = dec!(0.30);

/// Sell-through band and shelf-age bound for weighting adjustments.
const SELL_THROUGH_HIGH: f64 = 0.7;
const SELL_THROUGH_LOW: f64 = 0.3;
const STALE_SHELF_DAYS: f64 = 60.0;

/// Market sample-size bands for weighting adjustments.
const THIN_SAMPLE: usize = 5;
const DEEP_SAMPLE: usize = 10;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The ML signal handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct MlSignal {
    pub prediction: Option<MlPrediction>,
    /// Whether a model artifact is loaded at all. Distinguishes "this
    /// deployment has no model" from "the model skipped this call" for
    /// warning purposes.
    pub model_loaded: bool,
}

impl MlSignal {
    pub fn unavailable() -> Self {
        MlSignal::default()
    }

    fn available(&self) -> bool {
        self.prediction.is_some()
    }
}

/// Everything the engine needs for one recommendation.
#[derive(Debug, Clone)]
pub struct RecommendInputs<'a> {
    pub query: &'a Query,
    pub market: &'a MarketSample,
    pub internal: Option<&'a InternalAggregate>,
    pub ml: MlSignal,
    /// Production price of the sole matched record, for the rules
    /// fallback when every other signal is absent.
    pub rules_price: Option<Decimal>,
}

/// One weighting contribution, kept for the rationale.
#[derive(Debug, Clone)]
struct Adjustment {
    label: &'static str,
    delta: Decimal,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compute a recommendation. Fails only when no signal at all can
/// produce a price.
pub fn recommend(inputs: &RecommendInputs) -> Result<Recommendation, PricingError> {
    let market = inputs.market;
    let internal = inputs.internal;

    let (weighting, contributions) = compute_weighting(market, internal);

    let internal_price = internal.map(|agg| agg.internal_price);
    let market_median = if market.has_stats() { market.median } else { None };

    let (price, method) = final_price(
        weighting,
        internal_price,
        market_median,
        &inputs.ml,
        inputs.rules_price,
    )?;

    let confidence = confidence_score(price, market, internal, &inputs.ml);
    let warnings = collect_warnings(price, market, internal, &inputs.ml);
    let rationale = build_rationale(weighting, &contributions);

    debug!(
        query = %inputs.query.canonical,
        method = %method,
        weighting = %weighting,
        price = %price,
        confidence,
        "Recommendation computed"
    );

    Ok(Recommendation {
        upc: inputs.query.raw.clone(),
        recommended_price: price,
        internal_vs_market_weighting: weighting,
        confidence_score: confidence,
        rationale,
        prediction_method: method,
        market_data: market_data(market),
        internal_data: internal.map(InternalData::from),
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Weighting
// ---------------------------------------------------------------------------

/// Additive adjustments on the balanced base weight, then clamp, then
/// the absence overrides. The adjustment list feeds the rationale.
fn compute_weighting(
    market: &MarketSample,
    internal: Option<&InternalAggregate>,
) -> (Decimal, Vec<Adjustment>) {
    let mut adjustments: Vec<Adjustment> = Vec::new();

    if let Some(agg) = internal {
        if agg.sell_through_rate > SELL_THROUGH_HIGH {
            adjustments.push(Adjustment {
                label: "high sell-through",
                delta: dec!(0.20),
            });
        }
        if agg.sell_through_rate < SELL_THROUGH_LOW {
            adjustments.push(Adjustment {
                label: "low sell-through",
                delta: dec!(-0.15),
            });
        }
        if agg.days_on_shelf > STALE_SHELF_DAYS {
            adjustments.push(Adjustment {
                label: "stale inventory",
                delta: dec!(-0.15),
            });
        }
    }

    if market.has_stats() {
        if market.sample_size < THIN_SAMPLE {
            adjustments.push(Adjustment {
                label: "thin market sample",
                delta: dec!(0.20),
            });
        }
        if market.sample_size > DEEP_SAMPLE {
            adjustments.push(Adjustment {
                label: "deep market sample",
                delta: dec!(-0.10),
            });
        }
    }

    let summed: Decimal = adjustments.iter().map(|a| a.delta).sum();
    // Sums can leave [0,1] before clamping; the clamp plateau is part of
    // the algorithm.
    let mut weighting = (BASE_WEIGHT + summed).clamp(Decimal::ZERO, Decimal::ONE);

    if internal.is_none() {
        adjustments.push(Adjustment {
            label: "no internal history",
            delta: -weighting,
        });
        weighting = Decimal::ZERO;
    }
    if market.status != SampleStatus::Ok {
        adjustments.push(Adjustment {
            label: "market data unavailable",
            delta: Decimal::ONE - weighting,
        });
        weighting = Decimal::ONE;
    }

    (weighting, adjustments)
}

// ---------------------------------------------------------------------------
// Price selection
// ---------------------------------------------------------------------------

/// ML-first price selection with blend and rules fallbacks.
fn final_price(
    weighting: Decimal,
    internal_price: Option<Decimal>,
    market_median: Option<Decimal>,
    ml: &MlSignal,
    rules_price: Option<Decimal>,
) -> Result<(Decimal, PredictionMethod), PricingError> {
    // A confident model substitutes the three-way combination.
    if let Some(prediction) = &ml.prediction {
        if prediction.confidence >= ML_USE_THRESHOLD {
            let mut terms = vec![(ML_WEIGHT, prediction.price)];
            if let Some(median) = market_median {
                terms.push((ML_MARKET_WEIGHT, median));
            }
            if let Some(price) = internal_price {
                terms.push((ML_INTERNAL_WEIGHT, price));
            }
            // Omitted terms redistribute proportionally.
            let total: Decimal = terms.iter().map(|(w, _)| *w).sum();
            let price: Decimal = terms.iter().map(|(w, p)| *w * *p).sum::<Decimal>() / total;
            return Ok((price, PredictionMethod::Ml));
        }
    }

    match (internal_price, market_median) {
        (Some(internal), Some(median)) => {
            let price = weighting * internal + (Decimal::ONE - weighting) * median;
            Ok((price, blend_method(weighting)))
        }
        // One side absent: its weight is redistributed to the other.
        (Some(internal), None) => Ok((internal, blend_method(weighting))),
        (None, Some(median)) => Ok((median, blend_method(weighting))),
        (None, None) => match rules_price {
            Some(production) => Ok((production * RULES_MARKUP, PredictionMethod::Rules)),
            None => Err(PricingError::Internal(
                "no market, internal, or model signal available".to_string(),
            )),
        },
    }
}

fn blend_method(weighting: Decimal) -> PredictionMethod {
    if weighting < BASE_WEIGHT {
        PredictionMethod::Market
    } else {
        PredictionMethod::Internal
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

fn confidence_score(
    price: Decimal,
    market: &MarketSample,
    internal: Option<&InternalAggregate>,
    ml: &MlSignal,
) -> i64 {
    let mut score: i64 = 50;

    if market.has_stats() && market.sample_size >= 10 {
        score += 20;
    }
    if internal.is_some_and(|agg| agg.matched_count >= 5) {
        score += 10;
    }
    if ml.available() {
        score += 15;
    }
    if deviates_from_median(price, market) {
        score -= 15;
    }
    if market.status == SampleStatus::Error {
        score -= 20;
    }
    if internal.is_none() {
        score -= 10;
    }

    score.clamp(0, 100)
}

/// Whether the final price sits more than 30% away from the market
/// median (median floored at 1 to keep the ratio meaningful).
fn deviates_from_median(price: Decimal, market: &MarketSample) -> bool {
    if !market.has_stats() {
        return false;
    }
    let Some(median) = market.median else {
        return false;
    };
    let denominator = median.max(Decimal::ONE);
    (price - median).abs() / denominator > DEVIATION_LIMIT
}

// ---------------------------------------------------------------------------
// Warnings & rationale
// ---------------------------------------------------------------------------

fn collect_warnings(
    price: Decimal,
    market: &MarketSample,
    internal: Option<&InternalAggregate>,
    ml: &MlSignal,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if market.status != SampleStatus::Error && market.sample_size < THIN_SAMPLE {
        warnings.push("low market sample".to_string());
    }
    if internal.is_some_and(|agg| agg.days_on_shelf > STALE_SHELF_DAYS) {
        warnings.push("stale inventory".to_string());
    }
    if deviates_from_median(price, market) {
        warnings.push("large deviation from market median".to_string());
    }
    if internal.is_none() {
        warnings.push("no internal data".to_string());
    }
    if market.status == SampleStatus::Error {
        warnings.push("scrape failure".to_string());
    }
    if ml.model_loaded && !ml.available() {
        warnings.push("ML unavailable".to_string());
    }

    warnings
}

/// Deterministic one-sentence rationale naming the two dominant
/// weighting factors and the final split.
fn build_rationale(weighting: Decimal, contributions: &[Adjustment]) -> String {
    let internal_pct = (weighting * dec!(100)).round();
    let market_pct = dec!(100) - internal_pct;
    let split = format!("{internal_pct}% internal / {market_pct}% market");

    let mut ranked: Vec<&Adjustment> = contributions.iter().collect();
    // Stable sort: equal magnitudes keep application order.
    ranked.sort_by(|a, b| b.delta.abs().cmp(&a.delta.abs()));

    match ranked.as_slice() {
        [] => format!("Priced at {split} weighting with no adjustment factors."),
        [only] => format!("Priced at {split} weighting, driven by {}.", only.label),
        [first, second, ..] => format!(
            "Priced at {split} weighting, driven by {} and {}.",
            first.label, second.label,
        ),
    }
}

fn market_data(market: &MarketSample) -> Option<MarketData> {
    if !market.has_stats() {
        return None;
    }
    Some(MarketData {
        median_price: market.median?,
        average_price: market.mean?,
        min_price: market.min?,
        max_price: market.max?,
        sample_size: market.sample_size,
        sold_listings_count: market.sold_count,
        timestamp: market.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
