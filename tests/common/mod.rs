//! Shared fixtures for integration tests: a scripted monitored server, a
//! hand-driven clock, a canned advisor and state assembly over in-memory
//! SQLite.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlmon::config::MonitoringConfig;
use sqlmon::db::{self, DbPool};
use sqlmon::models::{
    DatabaseInfo, IndexFragmentationObservation, MissingIndex, SlowQueryObservation,
};
use sqlmon::services::{Clock, MonitorOptions, TargetServer};
use sqlmon::{AppState, Error, Result};
use sqlmon_ai::{AiAnalysis, AiOptimizationResult, QueryAdvisor, QueryContext, UnconfiguredAdvisor};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted target
// ============================================================================

/// In-memory stand-in for SQL Server. Every view is keyed by database and
/// can be swapped between cycles.
#[derive(Default)]
pub struct FakeTarget {
    databases: Mutex<Vec<DatabaseInfo>>,
    live: Mutex<HashMap<String, Vec<SlowQueryObservation>>>,
    query_store: Mutex<HashMap<String, Vec<SlowQueryObservation>>>,
    indexes: Mutex<HashMap<String, Vec<IndexFragmentationObservation>>>,
    missing: Mutex<HashMap<String, Vec<MissingIndex>>>,
    broken: Mutex<HashSet<String>>,
    /// Statements containing the key fail with the value as error text.
    rejections: Mutex<Vec<(String, String)>>,
    executed: Mutex<Vec<(String, String)>>,
}

impl FakeTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_database(&self, name: &str, state: &str) {
        let mut dbs = self.databases.lock().unwrap();
        let id = dbs.len() as i32 + 5;
        dbs.push(DatabaseInfo {
            id,
            name: name.to_string(),
            state: state.to_string(),
        });
    }

    pub fn set_live(&self, database: &str, rows: Vec<SlowQueryObservation>) {
        self.live.lock().unwrap().insert(database.to_string(), rows);
    }

    pub fn set_query_store(&self, database: &str, rows: Vec<SlowQueryObservation>) {
        self.query_store
            .lock()
            .unwrap()
            .insert(database.to_string(), rows);
    }

    pub fn set_indexes(&self, database: &str, rows: Vec<IndexFragmentationObservation>) {
        self.indexes
            .lock()
            .unwrap()
            .insert(database.to_string(), rows);
    }

    pub fn set_missing(&self, database: &str, rows: Vec<MissingIndex>) {
        self.missing
            .lock()
            .unwrap()
            .insert(database.to_string(), rows);
    }

    /// Every read against this database fails.
    pub fn break_database(&self, database: &str) {
        self.broken.lock().unwrap().insert(database.to_string());
    }

    pub fn reject_statements_containing(&self, needle: &str, message: &str) {
        self.rejections
            .lock()
            .unwrap()
            .push((needle.to_string(), message.to_string()));
    }

    /// `(database, statement)` pairs in execution order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.lock().unwrap().clone()
    }

    fn check(&self, database: &str) -> Result<()> {
        if self.broken.lock().unwrap().contains(database) {
            Err(Error::Target(format!("Cannot open database \"{}\"", database)))
        } else {
            Ok(())
        }
    }

    fn rows<T: Clone>(map: &Mutex<HashMap<String, Vec<T>>>, database: &str) -> Vec<T> {
        map.lock()
            .unwrap()
            .get(database)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TargetServer for FakeTarget {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        Ok(self.databases.lock().unwrap().clone())
    }

    async fn live_query_stats(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> Result<Vec<SlowQueryObservation>> {
        self.check(database)?;
        Ok(Self::rows(&self.live, database)
            .into_iter()
            .filter(|q| q.average_duration_ms > threshold_ms)
            .collect())
    }

    async fn query_store_stats(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> Result<Vec<SlowQueryObservation>> {
        self.check(database)?;
        Ok(Self::rows(&self.query_store, database)
            .into_iter()
            .filter(|q| q.average_duration_ms > threshold_ms)
            .collect())
    }

    async fn index_physical_stats(
        &self,
        database: &str,
        _min_fragmentation: f64,
        _min_page_count: i64,
    ) -> Result<Vec<IndexFragmentationObservation>> {
        self.check(database)?;
        Ok(Self::rows(&self.indexes, database))
    }

    async fn missing_indexes(&self, database: &str) -> Result<Vec<MissingIndex>> {
        self.check(database)?;
        Ok(Self::rows(&self.missing, database))
    }

    async fn execute(&self, database: &str, sql: &str) -> Result<()> {
        self.check(database)?;
        self.executed
            .lock()
            .unwrap()
            .push((database.to_string(), sql.to_string()));

        let rejection = self
            .rejections
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, message)| message.clone());

        match rejection {
            Some(message) => Err(Error::Target(message)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Advisor
// ============================================================================

/// Advisor with fixed answers that counts its calls.
pub struct CannedAdvisor {
    pub optimized_query: String,
    pub explanation: String,
    pub calls: Mutex<Vec<String>>,
}

impl CannedAdvisor {
    pub fn new(optimized_query: &str, explanation: &str) -> Arc<Self> {
        Arc::new(Self {
            optimized_query: optimized_query.to_string(),
            explanation: explanation.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryAdvisor for CannedAdvisor {
    async fn optimize(&self, context: &QueryContext) -> AiOptimizationResult {
        self.calls
            .lock()
            .unwrap()
            .push(format!("optimize:{}", context.query_text));
        AiOptimizationResult {
            optimized_query: self.optimized_query.clone(),
            explanation: self.explanation.clone(),
            index_recommendations: vec!["CREATE INDEX IX_T_A ON T(A)".to_string()],
            is_simulated: false,
        }
    }

    async fn analyze(&self, context: &QueryContext) -> AiAnalysis {
        self.calls
            .lock()
            .unwrap()
            .push(format!("analyze:{}", context.query_text));
        AiAnalysis {
            explanation: self.explanation.clone(),
            is_simulated: false,
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

pub async fn memory_pool() -> DbPool {
    let pool = db::init_pool(":memory:")
        .await
        .expect("Failed to create test database");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Options monitoring the given databases with default thresholds.
pub fn options(databases: &[&str]) -> MonitorOptions {
    MonitorOptions {
        monitoring: MonitoringConfig {
            max_parallel_databases: 2,
            ..MonitoringConfig::default()
        },
        databases: databases.iter().map(|d| d.to_string()).collect(),
        online_rebuild: true,
    }
}

pub struct Harness {
    pub state: AppState,
    pub target: Arc<FakeTarget>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness_with(
    advisor: Arc<dyn QueryAdvisor>,
    options: MonitorOptions,
) -> Harness {
    let target = FakeTarget::new();
    let clock = ManualClock::new();
    let state = AppState::from_parts(
        memory_pool().await,
        target.clone(),
        advisor,
        clock.clone(),
        options,
        CancellationToken::new(),
    );

    Harness {
        state,
        target,
        clock,
    }
}

pub async fn harness(databases: &[&str]) -> Harness {
    harness_with(Arc::new(UnconfiguredAdvisor), options(databases)).await
}

pub fn slow_query(database: &str, text: &str, duration_ms: f64) -> SlowQueryObservation {
    SlowQueryObservation {
        query_text: text.to_string(),
        database_name: database.to_string(),
        average_duration_ms: duration_ms,
        execution_count: 10,
        last_execution_time: None,
        query_plan: None,
    }
}

pub fn fragmented(
    database: &str,
    table: &str,
    index: &str,
    percent: f64,
    pages: i64,
) -> IndexFragmentationObservation {
    IndexFragmentationObservation {
        database_name: database.to_string(),
        schema_name: "dbo".to_string(),
        table_name: table.to_string(),
        index_name: index.to_string(),
        fragmentation_percent: percent,
        page_count: pages,
        last_reindexed: None,
    }
}
