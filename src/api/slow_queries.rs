//! Slow Query Routes
//!
//! Routes:
//! - POST /slow-queries/detect - Run slow-query detection now
//! - GET /slow-queries - Browse history
//! - GET /slow-queries/:id - Get one history record
//! - POST /slow-queries/:id/resolve - Mark a record resolved
//! - POST /slow-queries/analyze - Ask the advisor about a query

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlmon_ai::{AiAnalysis, QueryContext};
use tracing::info;

use crate::db::{self, SlowQueryFilter, SlowQueryRecord};
use crate::services::Clock;
use crate::{AppState, Error, Result};

/// Build slow query routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_slow_queries))
        .route("/detect", post(detect_slow_queries))
        .route("/analyze", post(analyze_query))
        .route("/:id", get(get_slow_query))
        .route("/:id/resolve", post(resolve_slow_query))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Restrict detection to one database.
#[derive(Debug, Deserialize, Default)]
pub struct DetectQuery {
    pub database: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub detected: usize,
    pub records: Vec<SlowQueryRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    pub database_name: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn detect_slow_queries(
    State(state): State<AppState>,
    Query(params): Query<DetectQuery>,
) -> Result<Json<DetectResponse>> {
    let records = state
        .monitor
        .detect_slow_queries(params.database.as_deref())
        .await?;

    Ok(Json(DetectResponse {
        detected: records.len(),
        records,
    }))
}

async fn list_slow_queries(
    State(state): State<AppState>,
    Query(filter): Query<SlowQueryFilter>,
) -> Result<Json<Vec<SlowQueryRecord>>> {
    if let (Some(since), Some(until)) = (filter.since, filter.until) {
        if since > until {
            return Err(Error::InvalidInput("since must not be after until".into()));
        }
    }

    let records = db::list_slow_queries(&state.db, &filter).await?;
    Ok(Json(records))
}

async fn get_slow_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SlowQueryRecord>> {
    let record = db::get_slow_query(&state.db, id).await?;
    Ok(Json(record))
}

async fn resolve_slow_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<SlowQueryRecord>> {
    let resolution = request.resolution.trim();
    if resolution.is_empty() {
        return Err(Error::Validation("resolution is required".into()));
    }

    let record = db::resolve_slow_query(&state.db, id, resolution, state.clock.now()).await?;
    info!(id, "Slow query resolved");
    Ok(Json(record))
}

async fn analyze_query(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AiAnalysis>> {
    if request.query.trim().is_empty() {
        return Err(Error::Validation("query is required".into()));
    }

    let context = QueryContext::new(request.query, request.database_name);
    Ok(Json(state.monitor.advisor().analyze(&context).await))
}
