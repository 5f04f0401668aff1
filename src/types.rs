//! Shared types for the PRICELENS service.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that scrape, matching, and
//! recommendation modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert an f64 to Decimal at API boundaries.
/// Returns Decimal::ZERO for NaN/Infinity.
pub fn d(val: f64) -> Decimal {
    Decimal::from_f64_retain(val).unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// How a raw query string was classified by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    /// A checksum-valid 12-digit UPC-A or 8-digit UPC-E code.
    Upc,
    /// Anything else: brand, category, keywords.
    FreeText,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Upc => write!(f, "upc"),
            QueryKind::FreeText => write!(f, "freetext"),
        }
    }
}

/// A validated, classified query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// The raw input as received from the caller.
    pub raw: String,
    pub kind: QueryKind,
    /// Canonical form: digits only for UPCs, trimmed text otherwise.
    pub canonical: String,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.canonical)
    }
}

// ---------------------------------------------------------------------------
// Market side
// ---------------------------------------------------------------------------

/// Item condition derived from free-text listing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    New,
    Used,
    Refurbished,
    Unknown,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::New => write!(f, "new"),
            Condition::Used => write!(f, "used"),
            Condition::Refurbished => write!(f, "refurbished"),
            Condition::Unknown => write!(f, "unknown"),
        }
    }
}

/// One scraped marketplace entry. Immutable value record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub price: Decimal,
    pub currency: String,
    pub condition: Condition,
    pub sold_date: Option<NaiveDate>,
    pub url: String,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) — {}",
            self.price, self.currency, self.condition, self.title,
        )
    }
}

impl Listing {
    /// Whether this listing represents a completed sale.
    pub fn is_sold(&self) -> bool {
        self.sold_date.is_some()
    }
}

/// Outcome discriminator for a scrape attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleStatus {
    /// Scrape succeeded and returned at least one parseable listing.
    Ok,
    /// Scrape succeeded but no listings were found.
    Empty,
    /// Navigation timeout, missing root selector, or driver failure.
    Error,
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleStatus::Ok => write!(f, "ok"),
            SampleStatus::Empty => write!(f, "empty"),
            SampleStatus::Error => write!(f, "error"),
        }
    }
}

/// The outcome of scraping one query: the listings plus derived stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSample {
    pub status: SampleStatus,
    pub listings: Vec<Listing>,
    /// Median of outlier-filtered prices. None unless status is Ok.
    pub median: Option<Decimal>,
    pub mean: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    /// Standard deviation of filtered prices (ML feature input).
    pub std_dev: Option<Decimal>,
    /// Count of listings with a parseable price, after outlier filtering.
    pub sample_size: usize,
    /// Count of listings with a non-null sold date.
    pub sold_count: usize,
    /// Set when sample_size < 5 after filtering.
    pub low_confidence: bool,
    pub timestamp: DateTime<Utc>,
    /// Attached when the scrape degraded (timeout, driver error, bad cards).
    pub warning: Option<String>,
}

impl fmt::Display for MarketSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.median {
            Some(median) => write!(
                f,
                "[{}] median={} n={} sold={}",
                self.status, median, self.sample_size, self.sold_count,
            ),
            None => write!(f, "[{}] n=0", self.status),
        }
    }
}

impl MarketSample {
    /// An error sample carrying a warning. The pipeline continues and
    /// the recommendation engine compensates via weighting.
    pub fn error(warning: impl Into<String>) -> Self {
        MarketSample {
            status: SampleStatus::Error,
            listings: Vec::new(),
            median: None,
            mean: None,
            min: None,
            max: None,
            std_dev: None,
            sample_size: 0,
            sold_count: 0,
            low_confidence: true,
            timestamp: Utc::now(),
            warning: Some(warning.into()),
        }
    }

    /// An empty-but-successful sample.
    pub fn empty() -> Self {
        MarketSample {
            status: SampleStatus::Empty,
            listings: Vec::new(),
            median: None,
            mean: None,
            min: None,
            max: None,
            std_dev: None,
            sample_size: 0,
            sold_count: 0,
            low_confidence: true,
            timestamp: Utc::now(),
            warning: None,
        }
    }

    /// Whether the sample carries usable price statistics.
    pub fn has_stats(&self) -> bool {
        self.status == SampleStatus::Ok && self.median.is_some()
    }
}

// ---------------------------------------------------------------------------
// Internal side
// ---------------------------------------------------------------------------

/// One row of historical sales. Immutable; loaded once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalRecord {
    pub item_id: String,
    pub department: String,
    pub category: String,
    pub subcategory: String,
    pub brand: String,
    /// Present only when the backing table carries a UPC column.
    #[serde(default)]
    pub upc: Option<String>,
    pub production_date: NaiveDate,
    pub sold_date: Option<NaiveDate>,
    pub days_to_sell: Option<i64>,
    pub production_price: Decimal,
    pub sold_price: Option<Decimal>,
}

impl InternalRecord {
    /// Whether this item was sold (non-null sold price).
    pub fn is_sold(&self) -> bool {
        self.sold_price.is_some()
    }

    /// Days from production until sale, or until `today` if unsold.
    pub fn shelf_days(&self, today: NaiveDate) -> i64 {
        match self.days_to_sell {
            Some(days) => days,
            None => (today - self.production_date).num_days(),
        }
    }
}

/// The outcome of matching a query against internal records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalAggregate {
    pub matched_count: usize,
    /// Mean sold price, falling back to mean production price.
    pub internal_price: Decimal,
    /// Fraction of matched items that were sold, in [0, 1].
    pub sell_through_rate: f64,
    /// Mean days between production and sale (or today for unsold items).
    pub days_on_shelf: f64,
    /// Modal category among matched records.
    pub category: String,
}

impl fmt::Display for InternalAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} matched | price={} sell_through={:.0}% shelf={:.0}d [{}]",
            self.matched_count,
            self.internal_price,
            self.sell_through_rate * 100.0,
            self.days_on_shelf,
            self.category,
        )
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// Which branch of the recommendation engine produced the final price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMethod {
    Ml,
    Market,
    Internal,
    Rules,
}

impl fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionMethod::Ml => write!(f, "ml"),
            PredictionMethod::Market => write!(f, "market"),
            PredictionMethod::Internal => write!(f, "internal"),
            PredictionMethod::Rules => write!(f, "rules"),
        }
    }
}

/// Market statistics as exposed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub median_price: Decimal,
    pub average_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub sample_size: usize,
    pub sold_listings_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Internal aggregate as exposed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalData {
    pub internal_price: Decimal,
    pub sell_through_rate: f64,
    pub days_on_shelf: f64,
    pub category: String,
    pub matched_count: usize,
}

impl From<&InternalAggregate> for InternalData {
    fn from(agg: &InternalAggregate) -> Self {
        InternalData {
            internal_price: agg.internal_price,
            sell_through_rate: agg.sell_through_rate,
            days_on_shelf: agg.days_on_shelf,
            category: agg.category.clone(),
            matched_count: agg.matched_count,
        }
    }
}

/// The final artifact returned to callers.
///
/// Invariants: `recommended_price >= 0`,
/// `0 <= internal_vs_market_weighting <= 1`, `0 <= confidence_score <= 100`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// The raw query string, echoed back.
    pub upc: String,
    pub recommended_price: Decimal,
    pub internal_vs_market_weighting: Decimal,
    pub confidence_score: i64,
    pub rationale: String,
    pub prediction_method: PredictionMethod,
    pub market_data: Option<MarketData>,
    pub internal_data: Option<InternalData>,
    pub warnings: Vec<String>,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} => {} via {} (w_internal={} conf={})",
            self.upc,
            self.recommended_price.round_dp(2),
            self.prediction_method,
            self.internal_vs_market_weighting,
            self.confidence_score,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PRICELENS.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Scrape failure: {0}")]
    ScrapeFailure(String),

    #[error("Data source failure: {0}")]
    DataSourceFailure(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
