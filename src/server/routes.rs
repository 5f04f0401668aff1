//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<Pricer>`.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::engine::{InternalOverride, Pricer};
use crate::types::{PricingError, Recommendation};

pub type AppState = Arc<Pricer>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /price-recommendation`.
#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    /// UPC code or free-text descriptor.
    pub upc: String,
    /// Optional caller-supplied internal metrics; replaces the matching
    /// engine's output for this call.
    #[serde(default)]
    pub internal_data: Option<InternalOverride>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /price-recommendation
pub async fn price_recommendation(
    State(pricer): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> Result<Json<Recommendation>, (StatusCode, Json<ErrorResponse>)> {
    match pricer.recommend(&request.upc, request.internal_data).await {
        Ok(recommendation) => Ok(Json(recommendation)),
        Err(e) => Err(error_response(e)),
    }
}

/// Map domain errors onto the HTTP surface. Invalid input is the
/// caller's fault; everything else is a generic 500 with detail logged
/// at the emit site.
fn error_response(e: PricingError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        PricingError::InvalidQuery(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("upc: {message}"),
            }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "internal error".to_string(),
            }),
        ),
    }
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /cache/stats
pub async fn cache_stats(State(pricer): State<AppState>) -> Json<serde_json::Value> {
    let stats = pricer.cache_stats().await;
    Json(json!({
        "size": stats.size,
        "hits": stats.hits,
        "misses": stats.misses,
    }))
}

/// DELETE /cache/clear
pub async fn cache_clear(State(pricer): State<AppState>) -> Json<ClearResponse> {
    let cleared = pricer.clear_cache().await;
    Json(ClearResponse { cleared })
}
