//! API Routes for sqlmon
//!
//! This module combines all API routes into a single router.
//! Routes are organized by domain. There is no authentication layer.

mod databases;
mod indexes;
mod monitor;
mod slow_queries;
pub mod status;

use axum::Router;

use crate::AppState;

/// Build the complete API router.
///
/// Route structure:
/// - /health - History store and advisor status
/// - /databases/* - Monitored databases, fixes, optimization, missing indexes
/// - /slow-queries/* - Detection, history, resolution, analysis
/// - /indexes/* - Fragmentation detection, reindex, operation log
/// - /monitor/* - Manual detection cycle
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/databases", databases::routes())
        .nest("/slow-queries", slow_queries::routes())
        .nest("/indexes", indexes::routes())
        .nest("/monitor", monitor::routes())
}
