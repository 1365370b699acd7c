//! Status Routes
//!
//! Routes:
//! - GET /health - History store reachability, advisor and last cycle

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::services::{Clock, CycleReport};
use crate::AppState;

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub history_store: bool,
    pub ai_configured: bool,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

// ============================================================================
// Handlers
// ============================================================================

/// Always answers 200; a broken history store shows up as `degraded`.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let history_store = match crate::db::health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "History store health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if history_store {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now(),
        history_store,
        ai_configured: state.monitor.advisor().is_configured(),
        last_cycle: state.monitor.last_report().await,
    })
}
