//! Application state for sqlmon.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use sqlmon_ai::{AiClient, QueryAdvisor, UnconfiguredAdvisor};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db::DbPool;
use crate::services::{Clock, Monitor, MonitorOptions, SqlServerTarget, SystemClock, TargetServer};
use crate::{config, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// History store connection pool.
    pub db: DbPool,
    /// Detection cycles, detection operations and remediation.
    pub monitor: Monitor,
    /// Timestamps for resolutions and history updates.
    pub clock: Arc<dyn Clock>,
    /// Cancelled on shutdown; shared by the scheduler and the AI client.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Create a new application state, initializing all services.
    pub async fn new(cancel: CancellationToken) -> Result<Self> {
        let config = config::config();

        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        let advisor: Arc<dyn QueryAdvisor> = if config.ai.is_configured() {
            let client = AiClient::new(&config.ai.settings())?.with_cancellation(cancel.clone());
            info!(provider = ?client.provider(), "AI advisor configured");
            Arc::new(client)
        } else {
            warn!("AI_API_KEY is not set, AI analysis will be simulated");
            Arc::new(UnconfiguredAdvisor)
        };

        if config.target.connection_string.trim().is_empty() {
            warn!("SQLSERVER_CONNECTION_STRING is not set, detection will find nothing");
        }
        let target: Arc<dyn TargetServer> =
            Arc::new(SqlServerTarget::new(config.target.connection_string.clone()));

        let options = MonitorOptions {
            monitoring: config.monitoring.clone(),
            databases: config.target.databases.clone(),
            online_rebuild: config.target.online_rebuild,
        };

        Ok(Self::from_parts(db, target, advisor, Arc::new(SystemClock), options, cancel))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        db: DbPool,
        target: Arc<dyn TargetServer>,
        advisor: Arc<dyn QueryAdvisor>,
        clock: Arc<dyn Clock>,
        options: MonitorOptions,
        cancel: CancellationToken,
    ) -> Self {
        let monitor = Monitor::new(db.clone(), target, advisor, clock.clone(), options);
        Self {
            db,
            monitor,
            clock,
            cancel,
        }
    }
}
