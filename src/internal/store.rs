//! Internal sales data backends.
//!
//! The matching engine is written against the `InternalStore` capability;
//! a CSV file and a SQLite database are the two concrete backends. Both
//! produce the same `InternalRecord` rows and are selected by the
//! `internal_data_path` config value (a `sqlite:` prefix picks the
//! relational backend).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use crate::types::{d, InternalRecord};

/// Abstraction over the historical-sales source.
#[async_trait]
pub trait InternalStore: Send + Sync {
    /// Load every record. Called once at process startup; the result is
    /// held immutably for the process lifetime.
    async fn load_all(&self) -> Result<Vec<InternalRecord>>;
}

// ---------------------------------------------------------------------------
// CSV backend
// ---------------------------------------------------------------------------

/// Row shape as it appears in the CSV file, before type conversion.
#[derive(Debug, Deserialize)]
struct CsvRow {
    item_id: String,
    department: String,
    category: String,
    subcategory: String,
    brand: String,
    #[serde(default)]
    upc: Option<String>,
    production_date: String,
    #[serde(default)]
    sold_date: Option<String>,
    #[serde(default)]
    days_to_sell: Option<i64>,
    production_price: String,
    #[serde(default)]
    sold_price: Option<String>,
}

/// CSV-file backend.
pub struct CsvStore {
    path: String,
}

impl CsvStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InternalStore for CsvStore {
    async fn load_all(&self) -> Result<Vec<InternalRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open internal data CSV: {}", self.path))?;

        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.with_context(|| {
                format!("Malformed CSV row {} in {}", line + 2, self.path)
            })?;
            records.push(convert_row(row, line + 2)?);
        }

        info!(count = records.len(), path = %self.path, "Internal records loaded from CSV");
        Ok(records)
    }
}

fn convert_row(row: CsvRow, line: usize) -> Result<InternalRecord> {
    let production_date = parse_date(&row.production_date)
        .with_context(|| format!("Bad production_date on CSV line {line}"))?;

    let sold_date = match row.sold_date.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => Some(parse_date(s).with_context(|| format!("Bad sold_date on CSV line {line}"))?),
        None => None,
    };

    let production_price = Decimal::from_str(row.production_price.trim())
        .with_context(|| format!("Bad production_price on CSV line {line}"))?;

    let sold_price = match row.sold_price.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => Some(
            Decimal::from_str(s.trim())
                .with_context(|| format!("Bad sold_price on CSV line {line}"))?,
        ),
        None => None,
    };

    Ok(InternalRecord {
        item_id: row.item_id,
        department: row.department,
        category: row.category,
        subcategory: row.subcategory,
        brand: row.brand,
        upc: row.upc.filter(|u| !u.trim().is_empty()),
        production_date,
        sold_date,
        days_to_sell: row.days_to_sell,
        production_price,
        sold_price,
    })
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Expected YYYY-MM-DD date, got {s:?}"))
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// Relational backend over a SQLite `internal_sales` table with the same
/// columns as the CSV layout.
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    /// Connect to the database named by a `sqlite:` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        // One connection is plenty: the store is read once at startup.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to internal database: {url}"))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl InternalStore for SqliteStore {
    async fn load_all(&self) -> Result<Vec<InternalRecord>> {
        let rows = sqlx::query(
            "SELECT item_id, department, category, subcategory, brand, upc, \
             production_date, sold_date, days_to_sell, production_price, sold_price \
             FROM internal_sales",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query internal_sales")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let production_date: String = row.try_get("production_date")?;
            let sold_date: Option<String> = row.try_get("sold_date")?;
            let production_price: f64 = row.try_get("production_price")?;
            let sold_price: Option<f64> = row.try_get("sold_price")?;

            records.push(InternalRecord {
                item_id: row.try_get("item_id")?,
                department: row.try_get("department")?,
                category: row.try_get("category")?,
                subcategory: row.try_get("subcategory")?,
                brand: row.try_get("brand")?,
                upc: row.try_get("upc")?,
                production_date: parse_date(&production_date)?,
                sold_date: match sold_date.as_deref().filter(|s| !s.is_empty()) {
                    Some(s) => Some(parse_date(s)?),
                    None => None,
                },
                days_to_sell: row.try_get("days_to_sell")?,
                production_price: d(production_price),
                sold_price: sold_price.map(d),
            });
        }

        info!(count = records.len(), "Internal records loaded from SQLite");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
