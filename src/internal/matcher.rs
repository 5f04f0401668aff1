//! Internal matching engine.
//!
//! Matches a query against the in-memory historical records and
//! aggregates the best matches into an `InternalAggregate`. UPC queries
//! hit an exact index when the data carries UPC codes; free-text queries
//! are scored by distinct-token hits across the descriptive fields.
//! Matching never fails: an unmatched query simply yields no aggregate.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{InternalAggregate, InternalRecord, Query, QueryKind};

/// Matched records beyond this cap are not aggregated.
pub const DEFAULT_MAX_MATCHES: usize = 50;

/// Outcome of one match pass.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub aggregate: Option<InternalAggregate>,
    /// Production price of the sole matched record, when exactly one
    /// record matched. Feeds the rules-based price fallback.
    pub single_production_price: Option<Decimal>,
}

impl MatchOutcome {
    fn none() -> Self {
        MatchOutcome {
            aggregate: None,
            single_production_price: None,
        }
    }
}

/// Lowercased searchable fields of one record, cached at construction.
struct SearchFields {
    brand: String,
    category: String,
    subcategory: String,
    department: String,
}

impl SearchFields {
    fn contains(&self, token: &str) -> bool {
        self.brand.contains(token)
            || self.category.contains(token)
            || self.subcategory.contains(token)
            || self.department.contains(token)
    }
}

/// Read-only matching engine over the startup-loaded records.
pub struct Matcher {
    records: Vec<InternalRecord>,
    search_fields: Vec<SearchFields>,
    upc_index: HashMap<String, Vec<usize>>,
    max_matches: usize,
}

impl Matcher {
    pub fn new(records: Vec<InternalRecord>, max_matches: usize) -> Self {
        let search_fields = records
            .iter()
            .map(|r| SearchFields {
                brand: r.brand.to_lowercase(),
                category: r.category.to_lowercase(),
                subcategory: r.subcategory.to_lowercase(),
                department: r.department.to_lowercase(),
            })
            .collect();

        let mut upc_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if let Some(upc) = &record.upc {
                upc_index.entry(upc.clone()).or_default().push(i);
            }
        }

        Self {
            records,
            search_fields,
            upc_index,
            max_matches,
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Match a query and aggregate the results.
    pub fn match_query(&self, query: &Query) -> MatchOutcome {
        self.match_query_at(query, Utc::now().date_naive())
    }

    /// As `match_query`, with an explicit "today" for shelf-age math.
    pub fn match_query_at(&self, query: &Query, today: NaiveDate) -> MatchOutcome {
        let indices = match query.kind {
            QueryKind::Upc => {
                // Exact UPC hit takes precedence; fall through to token
                // matching when the data carries no such code.
                match self.upc_index.get(&query.canonical) {
                    Some(hits) => hits.clone(),
                    None => self.token_match(&query.canonical),
                }
            }
            QueryKind::FreeText => self.token_match(&query.canonical),
        };

        if indices.is_empty() {
            debug!(query = %query.canonical, "No internal records matched");
            return MatchOutcome::none();
        }

        let matched: Vec<&InternalRecord> = indices
            .iter()
            .take(self.max_matches)
            .map(|i| &self.records[*i])
            .collect();

        debug!(
            query = %query.canonical,
            matched = matched.len(),
            "Internal records matched"
        );

        let single_production_price = if matched.len() == 1 {
            Some(matched[0].production_price)
        } else {
            None
        };

        MatchOutcome {
            aggregate: aggregate(&matched, today),
            single_production_price,
        }
    }

    /// Token scoring: a record's score is the count of distinct query
    /// tokens that substring-match any searchable field. Zero-score
    /// records are excluded; ties break by most recent sold date.
    fn token_match(&self, canonical: &str) -> Vec<usize> {
        let tokens = tokenize(canonical);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .search_fields
            .iter()
            .enumerate()
            .filter_map(|(i, fields)| {
                let score = tokens.iter().filter(|t| fields.contains(t)).count();
                (score > 0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.cmp(sa)
                .then_with(|| self.records[*ib].sold_date.cmp(&self.records[*ia].sold_date))
        });

        scored.into_iter().map(|(i, _)| i).collect()
    }
}

/// Lowercase, strip punctuation, split on whitespace, dedup.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(String::from)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Aggregate matched records per the pricing rules.
fn aggregate(matched: &[&InternalRecord], today: NaiveDate) -> Option<InternalAggregate> {
    if matched.is_empty() {
        return None;
    }

    let total = matched.len();
    let sold: Vec<&&InternalRecord> = matched.iter().filter(|r| r.is_sold()).collect();

    // Mean sold price, falling back to mean production price when no
    // matched item has sold yet.
    let internal_price = if sold.is_empty() {
        mean(matched.iter().map(|r| r.production_price))
    } else {
        mean(sold.iter().map(|r| r.sold_price.unwrap_or(Decimal::ZERO)))
    };

    let sell_through_rate = sold.len() as f64 / total as f64;

    // Shelf age: days-to-sell over sold records, else production age of
    // the unsold ones.
    let days_on_shelf = if sold.is_empty() {
        mean_f64(
            matched
                .iter()
                .filter(|r| !r.is_sold())
                .map(|r| r.shelf_days(today) as f64),
        )
    } else {
        mean_f64(sold.iter().map(|r| r.shelf_days(today) as f64))
    };

    let category = modal_category(matched);

    Some(InternalAggregate {
        matched_count: total,
        internal_price,
        sell_through_rate,
        days_on_shelf,
        category,
    })
}

fn mean(values: impl Iterator<Item = Decimal>) -> Decimal {
    let collected: Vec<Decimal> = values.collect();
    if collected.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = collected.iter().copied().sum();
    sum / Decimal::from(collected.len() as u64)
}

fn mean_f64(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}

/// Most frequent category; ties break lexicographically for determinism.
fn modal_category(matched: &[&InternalRecord]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in matched {
        *counts.entry(record.category.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(ca, na), (cb, nb)| na.cmp(nb).then_with(|| cb.cmp(ca)))
        .map(|(category, _)| category.to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
