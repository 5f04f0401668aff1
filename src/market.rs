//! Market sample aggregation.
//!
//! Turns a raw listing vector into robust price statistics. Outliers are
//! discarded against a window around the unfiltered median before any
//! stats are computed, so a single absurd listing cannot drag the
//! reported numbers.

use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{d, Listing, MarketSample, SampleStatus};

/// Outlier window around the unfiltered median: prices outside
/// [0.25 × median, 4.0 × median] are discarded.
const OUTLIER_LOW_FACTOR: Decimal = dec!(0.25);
const OUTLIER_HIGH_FACTOR: Decimal = dec!(4.0);

/// Samples with fewer than this many filtered listings are flagged
/// low-confidence.
const LOW_CONFIDENCE_THRESHOLD: usize = 5;

/// Aggregate a listing vector into a `MarketSample`.
///
/// An empty input yields an `Empty` sample; otherwise the sample is `Ok`
/// with stats computed over the outlier-filtered set.
pub fn aggregate(listings: Vec<Listing>) -> MarketSample {
    if listings.is_empty() {
        return MarketSample::empty();
    }

    let raw_prices: Vec<Decimal> = listings.iter().map(|l| l.price).collect();
    let median_raw = median(&raw_prices);

    let low = median_raw * OUTLIER_LOW_FACTOR;
    let high = median_raw * OUTLIER_HIGH_FACTOR;

    let kept: Vec<&Listing> = listings
        .iter()
        .filter(|l| l.price >= low && l.price <= high)
        .collect();

    if kept.is_empty() {
        // Unreachable for non-empty input (the median neighborhood always
        // survives its own window), kept as a guard.
        return MarketSample::empty();
    }

    let prices: Vec<Decimal> = kept.iter().map(|l| l.price).collect();
    let sample_size = prices.len();
    let sold_count = kept.iter().filter(|l| l.is_sold()).count();

    let sum: Decimal = prices.iter().copied().sum();
    let mean = sum / Decimal::from(sample_size as u64);
    let min = prices.iter().copied().min().unwrap_or(Decimal::ZERO);
    let max = prices.iter().copied().max().unwrap_or(Decimal::ZERO);

    MarketSample {
        status: SampleStatus::Ok,
        median: Some(median(&prices)),
        mean: Some(mean),
        min: Some(min),
        max: Some(max),
        std_dev: Some(std_dev(&prices, mean)),
        sample_size,
        sold_count,
        low_confidence: sample_size < LOW_CONFIDENCE_THRESHOLD,
        timestamp: Utc::now(),
        listings,
        warning: None,
    }
}

/// Median price: middle value, or the mean of the two middle values for
/// an even count. Input need not be sorted.
fn median(prices: &[Decimal]) -> Decimal {
    let mut sorted = prices.to_vec();
    sorted.sort();
    let n = sorted.len();
    if n == 0 {
        return Decimal::ZERO;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / dec!(2)
    }
}

/// Population standard deviation, computed in f64 (sqrt).
fn std_dev(prices: &[Decimal], mean: Decimal) -> Decimal {
    if prices.len() < 2 {
        return Decimal::ZERO;
    }
    let mean_f = mean.to_f64().unwrap_or(0.0);
    let variance = prices
        .iter()
        .map(|p| {
            let diff = p.to_f64().unwrap_or(0.0) - mean_f;
            diff * diff
        })
        .sum::<f64>()
        / prices.len() as f64;
    d(variance.sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
