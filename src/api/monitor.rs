//! Monitor Routes
//!
//! Routes:
//! - POST /monitor/run - Run one detection cycle and return its report
//! - GET /monitor/last - Report of the most recent cycle

use axum::{extract::State, routing::{get, post}, Json, Router};

use crate::services::CycleReport;
use crate::{AppState, Error, Result};

/// Build monitor routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/run", post(run_cycle))
        .route("/last", get(last_cycle))
}

/// Waits for a scheduled cycle in progress before starting.
async fn run_cycle(State(state): State<AppState>) -> Json<CycleReport> {
    Json(state.monitor.run_cycle(&state.cancel).await)
}

async fn last_cycle(State(state): State<AppState>) -> Result<Json<CycleReport>> {
    state
        .monitor
        .last_report()
        .await
        .map(Json)
        .ok_or_else(|| Error::NotFound("No detection cycle has run yet".into()))
}
