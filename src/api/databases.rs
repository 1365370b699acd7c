//! Database Routes
//!
//! Routes:
//! - GET /databases - User databases on the monitored server
//! - POST /databases/:database/optimize - Optimize a query with the advisor
//! - POST /databases/:database/queries/:query_id/fix - Apply and measure a fix
//! - GET /databases/:database/missing-indexes - Missing-index suggestions

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlmon_ai::{AiOptimizationResult, QueryContext};

use crate::models::{DatabaseInfo, MissingIndex, QueryFixResult};
use crate::{AppState, Error, Result};

/// Build database routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_databases))
        .route("/:database/optimize", post(optimize_query))
        .route("/:database/queries/:query_id/fix", post(apply_fix))
        .route("/:database/missing-indexes", get(missing_indexes))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct FixRequest {
    pub fix_type: String,
    /// Query to fix. Taken from the history record when empty.
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct MissingIndexResponse {
    #[serde(flatten)]
    pub index: MissingIndex,
    pub create_statement: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_databases(State(state): State<AppState>) -> Result<Json<Vec<DatabaseInfo>>> {
    Ok(Json(state.monitor.list_databases().await?))
}

async fn optimize_query(
    State(state): State<AppState>,
    Path(database): Path<String>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<AiOptimizationResult>> {
    if request.query.trim().is_empty() {
        return Err(Error::Validation("query is required".into()));
    }

    let context = QueryContext::new(request.query, database);
    Ok(Json(state.monitor.advisor().optimize(&context).await))
}

async fn apply_fix(
    State(state): State<AppState>,
    Path((database, query_id)): Path<(String, String)>,
    Json(request): Json<FixRequest>,
) -> Result<Json<QueryFixResult>> {
    if request.fix_type.trim().is_empty() {
        return Err(Error::Validation("fix_type is required".into()));
    }

    let result = state
        .monitor
        .remediator()
        .apply_fix(&database, &query_id, &request.fix_type, &request.query)
        .await?;
    Ok(Json(result))
}

async fn missing_indexes(
    State(state): State<AppState>,
    Path(database): Path<String>,
) -> Json<Vec<MissingIndexResponse>> {
    let indexes = state
        .monitor
        .missing_indexes(&database)
        .await
        .into_iter()
        .map(|index| MissingIndexResponse {
            create_statement: index.create_statement(),
            index,
        })
        .collect();

    Json(indexes)
}
