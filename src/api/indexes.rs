//! Index Routes
//!
//! Routes:
//! - POST /indexes/detect - Collect fragmented indexes with their reindex decision
//! - POST /indexes/reindex - Reindex one index
//! - GET /indexes/operations - Index operation log

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::{self, IndexOperationRecord};
use crate::models::{FragmentedIndex, IndexFragmentationObservation};
use crate::{AppState, Error, Result};

/// Build index routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/detect", post(detect_fragmented_indexes))
        .route("/reindex", post(reindex))
        .route("/operations", get(list_operations))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct DetectQuery {
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OperationsQuery {
    pub database: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

// ============================================================================
// Handlers
// ============================================================================

async fn detect_fragmented_indexes(
    State(state): State<AppState>,
    Query(params): Query<DetectQuery>,
) -> Result<Json<Vec<FragmentedIndex>>> {
    let indexes = state
        .monitor
        .detect_fragmented_indexes(params.database.as_deref())
        .await?;
    Ok(Json(indexes))
}

/// Runs the verb the reindex policy picks; the returned record says whether
/// the statement succeeded.
async fn reindex(
    State(state): State<AppState>,
    Json(index): Json<IndexFragmentationObservation>,
) -> Result<Json<IndexOperationRecord>> {
    if index.database_name.is_empty() || index.table_name.is_empty() || index.index_name.is_empty()
    {
        return Err(Error::Validation(
            "database_name, table_name and index_name are required".into(),
        ));
    }

    let record = state.monitor.remediator().reindex(&index).await?;
    Ok(Json(record))
}

async fn list_operations(
    State(state): State<AppState>,
    Query(params): Query<OperationsQuery>,
) -> Result<Json<Vec<IndexOperationRecord>>> {
    let operations =
        db::list_index_operations(&state.db, params.database.as_deref(), params.limit).await?;
    Ok(Json(operations))
}
