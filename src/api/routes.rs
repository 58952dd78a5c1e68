use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::models::{ClearCacheResponse, ScanRequest, ScanResponse};
use crate::api::response;
use crate::error::{AppError, Result};
use crate::extractor::{fetch_page, Extractor, ExtractorSettings};
use crate::protocol::{CoordinatorRequest, CoordinatorResponse};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/messages", post(message_handler))
        .route("/api/scan", post(scan_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route("/api/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

/// Coordinator message channel. Failures travel inside the protocol body,
/// so this always answers 200.
async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<CoordinatorRequest>,
) -> Json<CoordinatorResponse> {
    Json(state.coordinator.dispatch(message).await)
}

async fn scan_handler(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse> {
    info!(url = %req.url, "Processing scan request");
    let start_time = Instant::now();

    let page = fetch_page(&req.url, state.config.page_fetch_timeout)
        .await
        .inspect_err(|e| warn!(url = %req.url, error = %e, "page fetch failed"))?;

    let extractor = Extractor::attach(
        &page,
        state.coordinator.clone(),
        ExtractorSettings::from(state.config.as_ref()),
    )
    .ok_or_else(|| AppError::ParseError("No readable text found on the page".to_string()))?;

    let result = extractor.assess().await?;

    info!(
        url = %req.url,
        rating = %result.rating,
        elapsed = ?start_time.elapsed(),
        "Scan complete"
    );

    Ok(response::success(ScanResponse {
        url: req.url,
        result,
        scanned_at: Utc::now(),
        word_count: extractor.word_count(),
    }))
}

async fn clear_cache_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let cleared = state.coordinator.clear_cache().await?;
    Ok(response::success(ClearCacheResponse { cleared }))
}

async fn stats_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.coordinator.stats().await?;
    Ok(response::success(stats))
}
