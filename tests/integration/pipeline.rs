//! End-to-end pipeline tests over the mock driver.
//!
//! Exercise the full recommend path — validation, cache, concurrent
//! match + scrape, ML adapter, recommendation engine — with scripted
//! market pages and in-memory internal records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pricelens::engine::{InternalOverride, Pricer};
use pricelens::internal::{CsvStore, InternalStore, Matcher};
use pricelens::model::{MlAdapter, ModelArtifact};
use pricelens::scrape::{ScrapeConfig, SessionManager};
use pricelens::types::{InternalRecord, PredictionMethod, PricingError};

use crate::mock_driver::{sold_page, DriverCounters, ScriptedDriver};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn fast_config() -> ScrapeConfig {
    ScrapeConfig {
        max_listings: 30,
        timeout: Duration::from_millis(500),
        delay_min: Duration::from_millis(0),
        delay_max: Duration::from_millis(0),
    }
}

fn nike_record(item_id: &str, upc: Option<&str>) -> InternalRecord {
    InternalRecord {
        item_id: item_id.to_string(),
        department: "Footwear".to_string(),
        category: "Shoes".to_string(),
        subcategory: "Sneakers".to_string(),
        brand: "Nike".to_string(),
        upc: upc.map(String::from),
        production_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        sold_date: Some(NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()),
        days_to_sell: Some(25),
        production_price: dec!(25),
        sold_price: Some(dec!(45)),
    }
}

/// 15 sold listings, median 52, all inside the outlier window.
fn deep_market_page() -> pricelens::scrape::ScrapePage {
    let mut prices = vec!["$50.00"; 7];
    prices.push("$52.00");
    prices.extend(vec!["$54.00"; 7]);
    sold_page(&prices)
}

async fn build_pricer(
    driver: ScriptedDriver,
    records: Vec<InternalRecord>,
    ml: MlAdapter,
) -> (Arc<Pricer>, DriverCounters) {
    let counters = driver.counters();
    let session = SessionManager::start(Box::new(driver), fast_config())
        .await
        .unwrap();
    let pricer = Arc::new(Pricer::new(
        Arc::new(Matcher::new(records, 50)),
        session,
        Arc::new(ml),
        3600,
    ));
    (pricer, counters)
}

/// A trivially-constant model: no trees, base score only, confident
/// enough to drive the blend when internal category data is present.
fn constant_model(price: f64) -> MlAdapter {
    let artifact = ModelArtifact::from_json(&format!(
        r#"{{
        "feature_names": [
            "category_id", "subcategory_id", "brand_id", "department_id",
            "production_price", "days_on_shelf", "market_median",
            "market_sample_size", "market_std"
        ],
        "vocab": {{ "category": {{"Shoes": 0}} }},
        "unknown_id": 99,
        "column_means": {{
            "production_price": 25.0,
            "days_on_shelf": 45.0,
            "market_median": 40.0,
            "market_sample_size": 12.0,
            "market_std": 6.0
        }},
        "base_score": {price},
        "base_confidence": 0.9,
        "trees": []
    }}"#,
    ))
    .unwrap();
    MlAdapter::from_artifact(artifact)
}

// ---------------------------------------------------------------------------
// Pipeline behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_upc_query_end_to_end() {
    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, _) = build_pricer(
        driver,
        vec![nike_record("SKU-1", Some("012345678905"))],
        MlAdapter::disabled(),
    )
    .await;

    // Dashed form canonicalizes to the indexed UPC.
    let rec = pricer.recommend("0-12345-67890-5", None).await.unwrap();
    assert_eq!(rec.upc, "0-12345-67890-5");
    assert_eq!(rec.prediction_method, PredictionMethod::Internal);
    assert_eq!(rec.internal_data.as_ref().unwrap().matched_count, 1);
    assert_eq!(rec.internal_data.as_ref().unwrap().internal_price, dec!(45));
    assert_eq!(rec.market_data.as_ref().unwrap().median_price, dec!(52));

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_strong_internal_with_override_exact_numbers() {
    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, _) = build_pricer(driver, vec![], MlAdapter::disabled()).await;

    let rec = pricer
        .recommend(
            "Nike Sneakers",
            Some(InternalOverride {
                internal_price: dec!(45.00),
                sell_through_rate: 0.85,
                days_on_shelf: 25.0,
                category: "Shoes".to_string(),
            }),
        )
        .await
        .unwrap();

    assert_eq!(rec.internal_vs_market_weighting, dec!(0.60));
    assert_eq!(rec.recommended_price, dec!(47.80));
    assert_eq!(rec.confidence_score, 70);
    assert_eq!(rec.prediction_method, PredictionMethod::Internal);
    assert!(rec.warnings.is_empty());

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_ml_drives_price_when_confident() {
    let driver = ScriptedDriver::new(deep_market_page());
    let records = (0..6)
        .map(|i| nike_record(&format!("SKU-{i}"), None))
        .collect();
    let (pricer, _) = build_pricer(driver, records, constant_model(50.0)).await;

    let rec = pricer.recommend("Nike Sneakers", None).await.unwrap();
    // 0.6*50 + 0.3*52 + 0.1*45
    assert_eq!(rec.recommended_price, dec!(50.10));
    assert_eq!(rec.prediction_method, PredictionMethod::Ml);
    // 50 + 20 (deep sample) + 10 (matched >= 5) + 15 (ml)
    assert_eq!(rec.confidence_score, 95);
    assert!(rec.warnings.is_empty());

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_scrape_error_degrades_to_internal() {
    let driver = ScriptedDriver::new(deep_market_page());
    let counters = driver.counters();
    counters.set_error("blocked by marketplace");

    let (pricer, _) = build_pricer(driver, vec![nike_record("SKU-1", None)], MlAdapter::disabled())
        .await;

    let rec = pricer.recommend("Nike Sneakers", None).await.unwrap();
    assert_eq!(rec.internal_vs_market_weighting, Decimal::ONE);
    assert_eq!(rec.recommended_price, dec!(45));
    assert_eq!(rec.prediction_method, PredictionMethod::Internal);
    assert!(rec.warnings.contains(&"scrape failure".to_string()));
    assert!(rec.market_data.is_none());

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_no_signals_fails_with_internal_error() {
    let driver = ScriptedDriver::new(deep_market_page());
    let counters = driver.counters();
    counters.set_error("blocked");

    let (pricer, _) = build_pricer(driver, vec![], MlAdapter::disabled()).await;

    let err = pricer.recommend("Nike Sneakers", None).await.unwrap_err();
    assert!(matches!(err, PricingError::Internal(_)));

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, counters) = build_pricer(driver, vec![], MlAdapter::disabled()).await;

    let err = pricer.recommend("   ", None).await.unwrap_err();
    assert!(matches!(err, PricingError::InvalidQuery(_)));
    assert_eq!(counters.navigate_calls.load(Ordering::SeqCst), 0);

    pricer.shutdown().await;
}

// ---------------------------------------------------------------------------
// Caching & concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_idempotent_within_ttl() {
    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, counters) =
        build_pricer(driver, vec![nike_record("SKU-1", None)], MlAdapter::disabled()).await;

    let first = pricer.recommend("Nike Sneakers", None).await.unwrap();
    let second = pricer.recommend("Nike Sneakers", None).await.unwrap();

    assert_eq!(first.recommended_price, second.recommended_price);
    assert_eq!(first.confidence_score, second.confidence_score);
    assert_eq!(first.rationale, second.rationale);
    assert_eq!(first.warnings, second.warnings);
    assert_eq!(counters.navigate_calls.load(Ordering::SeqCst), 1);

    pricer.shutdown().await;
}

/// Concurrent identical requests share one scrape: the session is
/// driven once and every caller sees the same recommendation.
#[tokio::test]
async fn test_single_flight_concurrent_identical_queries() {
    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, counters) =
        build_pricer(driver, vec![nike_record("SKU-1", None)], MlAdapter::disabled()).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pricer = pricer.clone();
        handles.push(tokio::spawn(async move {
            pricer.recommend("Nike Sneakers", None).await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(counters.open_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.navigate_calls.load(Ordering::SeqCst), 1);
    for pair in results.windows(2) {
        assert_eq!(pair[0].recommended_price, pair[1].recommended_price);
        assert_eq!(pair[0].rationale, pair[1].rationale);
    }

    pricer.shutdown().await;
    assert_eq!(counters.close_calls.load(Ordering::SeqCst), 1);
}

/// Distinct queries serialize through the one session: both are served,
/// and the driver never sees overlapping navigations.
#[tokio::test]
async fn test_distinct_queries_never_overlap_on_the_session() {
    let driver = ScriptedDriver::new(deep_market_page())
        .with_page("nike sneakers", sold_page(&["$50.00", "$52.00", "$54.00"]))
        .with_page("levis 501", sold_page(&["$30.00", "$32.00", "$34.00"]));
    let (pricer, counters) = build_pricer(driver, vec![], MlAdapter::disabled()).await;

    let a = pricer.clone();
    let b = pricer.clone();
    let (ra, rb) = tokio::join!(
        a.recommend("nike sneakers", None),
        b.recommend("levis 501", None),
    );

    assert_eq!(ra.unwrap().market_data.unwrap().median_price, dec!(52));
    assert_eq!(rb.unwrap().market_data.unwrap().median_price, dec!(32));
    assert_eq!(counters.navigate_calls.load(Ordering::SeqCst), 2);
    assert!(!counters.overlap_detected.load(Ordering::SeqCst));

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_cache_clear_forces_rescrape() {
    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, counters) =
        build_pricer(driver, vec![nike_record("SKU-1", None)], MlAdapter::disabled()).await;

    pricer.recommend("Nike Sneakers", None).await.unwrap();
    assert_eq!(pricer.clear_cache().await, 1);
    pricer.recommend("Nike Sneakers", None).await.unwrap();

    assert_eq!(counters.navigate_calls.load(Ordering::SeqCst), 2);

    pricer.shutdown().await;
}

#[tokio::test]
async fn test_error_not_cached_recovers_after_driver_heals() {
    let driver = ScriptedDriver::new(deep_market_page());
    let counters = driver.counters();
    counters.set_error("temporary outage");

    let (pricer, _) = build_pricer(driver, vec![], MlAdapter::disabled()).await;

    assert!(pricer.recommend("Nike Sneakers", None).await.is_err());

    counters.clear_error();
    let rec = pricer.recommend("Nike Sneakers", None).await.unwrap();
    assert_eq!(rec.prediction_method, PredictionMethod::Market);
    assert_eq!(rec.market_data.unwrap().median_price, dec!(52));

    pricer.shutdown().await;
}

// ---------------------------------------------------------------------------
// CSV-backed stack
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_csv_store_to_recommendation() {
    let mut path = std::env::temp_dir();
    path.push(format!("pricelens_e2e_{}.csv", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        "item_id,department,category,subcategory,brand,upc,production_date,sold_date,days_to_sell,production_price,sold_price\n\
         SKU-1,Footwear,Shoes,Sneakers,Nike,,2026-01-01,2026-01-26,25,25.00,45.00\n\
         SKU-2,Footwear,Shoes,Sneakers,Nike,,2026-01-01,2026-01-31,30,25.00,47.00\n",
    )
    .unwrap();

    let records = CsvStore::new(path.to_str().unwrap())
        .load_all()
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    let driver = ScriptedDriver::new(deep_market_page());
    let (pricer, _) = build_pricer(driver, records, MlAdapter::disabled()).await;

    let rec = pricer.recommend("Nike Sneakers", None).await.unwrap();
    let internal = rec.internal_data.as_ref().unwrap();
    assert_eq!(internal.matched_count, 2);
    assert_eq!(internal.internal_price, dec!(46)); // mean of 45 and 47
    assert!((internal.sell_through_rate - 1.0).abs() < 1e-10);

    pricer.shutdown().await;

    std::fs::remove_file(&path).unwrap();
}

// ---------------------------------------------------------------------------
// Output invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_invariants_hold_across_query_shapes() {
    let driver = ScriptedDriver::new(deep_market_page());
    let records = vec![nike_record("SKU-1", Some("012345678905"))];
    let (pricer, _) = build_pricer(driver, records, constant_model(48.0)).await;

    for query in ["Nike Sneakers", "012345678905", "levis 501", "Shoes"] {
        let Ok(rec) = pricer.recommend(query, None).await else {
            continue;
        };
        assert!(rec.recommended_price >= Decimal::ZERO, "query {query}");
        assert!(rec.internal_vs_market_weighting >= Decimal::ZERO);
        assert!(rec.internal_vs_market_weighting <= Decimal::ONE);
        assert!((0..=100).contains(&rec.confidence_score));
        assert!(matches!(
            rec.prediction_method,
            PredictionMethod::Ml
                | PredictionMethod::Market
                | PredictionMethod::Internal
                | PredictionMethod::Rules
        ));
    }

    pricer.shutdown().await;
}
