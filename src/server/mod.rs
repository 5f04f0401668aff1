//! HTTP server — Axum wiring for the pricing API.
//!
//! One normative endpoint (`POST /price-recommendation`) plus health and
//! cache management. CORS enabled for local tooling.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/price-recommendation", post(routes::price_recommendation))
        .route("/health", get(routes::health))
        .route("/cache/stats", get(routes::cache_stats))
        .route("/cache/clear", delete(routes::cache_clear))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process shuts down.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;

    info!(port, "API server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .await
        .context("API server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Pricer;
    use crate::internal::matcher::DEFAULT_MAX_MATCHES;
    use crate::internal::Matcher;
    use crate::model::MlAdapter;
    use crate::scrape::driver::{MockScrapeDriver, RawCard, ScrapePage};
    use crate::scrape::{ScrapeConfig, SessionManager};
    use crate::types::InternalRecord;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn sold_record() -> InternalRecord {
        InternalRecord {
            item_id: "SKU-1".to_string(),
            department: "Footwear".to_string(),
            category: "Shoes".to_string(),
            subcategory: "Sneakers".to_string(),
            brand: "Nike".to_string(),
            upc: None,
            production_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            sold_date: Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
            days_to_sell: Some(30),
            production_price: dec!(25),
            sold_price: Some(dec!(45)),
        }
    }

    async fn test_state() -> AppState {
        let mut driver = MockScrapeDriver::new();
        driver.expect_open().returning(|| Ok(()));
        driver.expect_navigate_and_extract().returning(|_| {
            Ok(ScrapePage {
                raw_html: String::new(),
                locale_hint: Some("en-US".to_string()),
                cards: (0..12)
                    .map(|i| RawCard {
                        title: format!("item {i}"),
                        price_text: "$52.00".to_string(),
                        condition_text: "Used".to_string(),
                        sold_text: "2026-07-01".to_string(),
                        url: String::new(),
                    })
                    .collect(),
            })
        });
        driver.expect_close().returning(|| Ok(()));

        let session = SessionManager::start(
            Box::new(driver),
            ScrapeConfig {
                max_listings: 30,
                timeout: std::time::Duration::from_millis(500),
                delay_min: std::time::Duration::from_millis(0),
                delay_max: std::time::Duration::from_millis(0),
            },
        )
        .await
        .unwrap();

        Arc::new(Pricer::new(
            Arc::new(Matcher::new(vec![sold_record()], DEFAULT_MAX_MATCHES)),
            session,
            Arc::new(MlAdapter::disabled()),
            3600,
        ))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_recommendation_endpoint() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(post_json(
                "/price-recommendation",
                serde_json::json!({ "upc": "Nike Sneakers", "internal_data": null }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["upc"], "Nike Sneakers");
        assert_eq!(json["prediction_method"], "internal");
        assert!(json["recommended_price"].as_f64().unwrap() > 0.0);
        assert!(json["confidence_score"].as_i64().unwrap() <= 100);
        assert!(json["market_data"]["sample_size"].as_u64().unwrap() >= 10);
        assert!(json["warnings"].is_array());
    }

    #[tokio::test]
    async fn test_recommendation_with_override() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(post_json(
                "/price-recommendation",
                serde_json::json!({
                    "upc": "Nike Sneakers",
                    "internal_data": {
                        "internal_price": 45.0,
                        "sell_through_rate": 0.85,
                        "days_on_shelf": 25.0,
                        "category": "Shoes"
                    }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["internal_data"]["internal_price"].as_f64().unwrap(), 45.0);
        assert_eq!(json["internal_data"]["matched_count"].as_u64().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_query_is_400() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(post_json(
                "/price-recommendation",
                serde_json::json!({ "upc": "   " }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("upc"));
    }

    #[tokio::test]
    async fn test_cache_stats_and_clear() {
        let state = test_state().await;
        let app = build_router(state.clone());

        // Warm the cache with one request.
        let resp = app
            .clone()
            .oneshot(post_json(
                "/price-recommendation",
                serde_json::json!({ "upc": "Nike Sneakers" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["size"], 1);
        assert_eq!(stats["misses"], 1);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/cache/clear")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let cleared: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(cleared["cleared"], 1);
    }
}
