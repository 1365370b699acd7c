//! Detection cycle orchestration.
//!
//! One cycle walks every monitored database: collect slow queries, classify
//! and upsert them into history, ask the advisor about new Critical findings,
//! then collect fragmented indexes and optionally reindex them. Databases are
//! processed concurrently up to a configured bound, and each one reports its
//! own outcome so a failure never touches its siblings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlmon_ai::{QueryAdvisor, QueryContext};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::clock::Clock;
use super::collector::Collector;
use super::reindex_policy::decide;
use super::remediation::Remediator;
use super::severity::classify;
use super::target::TargetServer;
use crate::config::MonitoringConfig;
use crate::db::{self, DbPool, SlowQueryRecord};
use crate::models::{DatabaseInfo, FragmentedIndex, MissingIndex, ReindexType, Severity};
use crate::{Error, Result};

/// Missing-index suggestions at or above this estimated improvement are logged.
const MISSING_INDEX_REPORT_PERCENT: f64 = 50.0;

/// Database state that is eligible for monitoring.
const ONLINE_STATE: &str = "ONLINE";

/// What a monitor watches and how it reacts.
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    pub monitoring: MonitoringConfig,
    /// Explicit database list. Empty means discover online user databases.
    pub databases: Vec<String>,
    pub online_rebuild: bool,
}

/// Outcome of one database within a cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseReport {
    pub database: String,
    pub slow_queries: usize,
    pub critical: usize,
    pub analyzed: usize,
    pub fragmented_indexes: usize,
    pub reindexed: usize,
    pub reindex_failures: usize,
    pub missing_indexes: usize,
    pub error: Option<String>,
}

/// Outcome of one detection cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub error: Option<String>,
    pub databases: Vec<DatabaseReport>,
}

/// Drives detection cycles and the on-demand detection operations.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    db: DbPool,
    collector: Collector,
    remediator: Remediator,
    advisor: Arc<dyn QueryAdvisor>,
    clock: Arc<dyn Clock>,
    options: MonitorOptions,
    /// Held for the whole of a cycle so scheduled and manual runs never overlap.
    cycle_lock: Mutex<()>,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl Monitor {
    pub fn new(
        db: DbPool,
        target: Arc<dyn TargetServer>,
        advisor: Arc<dyn QueryAdvisor>,
        clock: Arc<dyn Clock>,
        options: MonitorOptions,
    ) -> Self {
        let remediator = Remediator::new(
            db.clone(),
            target.clone(),
            advisor.clone(),
            clock.clone(),
            options.monitoring.reindex,
            options.online_rebuild,
        );

        Self {
            inner: Arc::new(MonitorInner {
                db,
                collector: Collector::new(target),
                remediator,
                advisor,
                clock,
                options,
                cycle_lock: Mutex::new(()),
                last_cycle: RwLock::new(None),
            }),
        }
    }

    pub fn remediator(&self) -> &Remediator {
        &self.inner.remediator
    }

    pub fn advisor(&self) -> &Arc<dyn QueryAdvisor> {
        &self.inner.advisor
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.inner.options
    }

    /// Report of the most recent finished cycle.
    pub async fn last_report(&self) -> Option<CycleReport> {
        self.inner.last_cycle.read().await.clone()
    }

    /// All user databases on the monitored server.
    pub async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        self.inner.collector.target().list_databases().await
    }

    /// Databases a cycle visits: the configured list, or every online user
    /// database when none is configured.
    pub async fn databases(&self) -> Result<Vec<String>> {
        if !self.inner.options.databases.is_empty() {
            return Ok(self.inner.options.databases.clone());
        }

        let discovered = self.list_databases().await?;
        Ok(discovered
            .into_iter()
            .filter(|db| db.state.eq_ignore_ascii_case(ONLINE_STATE))
            .map(|db| db.name)
            .collect())
    }

    async fn scope(&self, database: Option<&str>) -> Result<Vec<String>> {
        match database {
            Some(db) => Ok(vec![db.to_string()]),
            None => self.databases().await,
        }
    }

    /// Collect, classify and record slow queries.
    ///
    /// Returns the history records touched, one per observation that was
    /// stored. An observation that fails to store is logged and skipped.
    pub async fn detect_slow_queries(&self, database: Option<&str>) -> Result<Vec<SlowQueryRecord>> {
        let mut records = Vec::new();
        for db in self.scope(database).await? {
            records.extend(self.detect_slow_queries_in(&db).await);
        }
        Ok(records)
    }

    async fn detect_slow_queries_in(&self, database: &str) -> Vec<SlowQueryRecord> {
        let inner = &self.inner;
        let monitoring = &inner.options.monitoring;
        let mut records = Vec::new();

        for observation in inner
            .collector
            .collect_slow_queries(database, monitoring.slow_query_threshold_ms)
            .await
        {
            let severity = classify(observation.average_duration_ms, &monitoring.severity);

            if severity == Severity::Critical {
                warn!(
                    database,
                    duration_ms = observation.average_duration_ms,
                    executions = observation.execution_count,
                    "Critical slow query detected"
                );
            }

            match db::upsert_slow_query(&inner.db, &observation, severity, inner.clock.now()).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(database, error = %e, "Failed to record slow query");
                }
            }
        }

        records
    }

    /// Collect fragmented indexes and attach the reindex decision to each.
    pub async fn detect_fragmented_indexes(
        &self,
        database: Option<&str>,
    ) -> Result<Vec<FragmentedIndex>> {
        let mut indexes = Vec::new();
        for db in self.scope(database).await? {
            indexes.extend(self.detect_fragmented_indexes_in(&db).await);
        }
        Ok(indexes)
    }

    async fn detect_fragmented_indexes_in(&self, database: &str) -> Vec<FragmentedIndex> {
        let monitoring = &self.inner.options.monitoring;

        self.inner
            .collector
            .collect_fragmented_indexes(
                database,
                monitoring.reindex.reorganize_above,
                monitoring.min_page_count,
            )
            .await
            .map(|observation| FragmentedIndex {
                reindex_type: decide(observation.fragmentation_percent, &monitoring.reindex),
                observation,
            })
            .collect()
    }

    pub async fn missing_indexes(&self, database: &str) -> Vec<MissingIndex> {
        self.inner.collector.collect_missing_indexes(database).await
    }

    /// Run one full detection cycle.
    ///
    /// Waits for any cycle already in flight. Cancellation is checked before
    /// each database and between the steps inside one.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let _guard = self.inner.cycle_lock.lock().await;

        let cycle_id = Uuid::new_v4();
        let span = info_span!("detection_cycle", %cycle_id);

        let report = self.run_cycle_inner(cycle_id, cancel).instrument(span).await;
        *self.inner.last_cycle.write().await = Some(report.clone());
        report
    }

    async fn run_cycle_inner(&self, cycle_id: Uuid, cancel: &CancellationToken) -> CycleReport {
        let started_at = self.inner.clock.now();
        info!("Detection cycle started");

        let (databases, error) = match self.databases().await {
            Ok(databases) => (databases, None),
            Err(e) => {
                error!(error = %e, "Failed to enumerate databases");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let parallel = self.inner.options.monitoring.max_parallel_databases.max(1);

        let reports: Vec<DatabaseReport> = stream::iter(databases)
            .map(|database| {
                let monitor = self.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(monitor.process_database(&database, &cancel).await)
                }
            })
            .buffer_unordered(parallel)
            .filter_map(|report| async move { report })
            .collect()
            .await;

        let cancelled = cancel.is_cancelled();
        info!(
            databases = reports.len(),
            cancelled,
            "Detection cycle finished"
        );

        CycleReport {
            cycle_id,
            started_at,
            finished_at: self.inner.clock.now(),
            cancelled,
            error,
            databases: reports,
        }
    }

    async fn process_database(&self, database: &str, cancel: &CancellationToken) -> DatabaseReport {
        let mut report = DatabaseReport {
            database: database.to_string(),
            ..Default::default()
        };

        if let Err(e) = self.process_database_steps(database, cancel, &mut report).await {
            match e {
                Error::Cancelled => info!(database, "Database skipped after cancellation"),
                ref other => error!(database, error = %other, "Database processing failed"),
            }
            report.error = Some(e.to_string());
        }

        report
    }

    async fn process_database_steps(
        &self,
        database: &str,
        cancel: &CancellationToken,
        report: &mut DatabaseReport,
    ) -> Result<()> {
        let monitoring = &self.inner.options.monitoring;

        let records = self.detect_slow_queries_in(database).await;
        report.slow_queries = records.len();
        report.critical = records
            .iter()
            .filter(|r| r.severity_enum() == Severity::Critical)
            .count();

        if monitoring.ai_analysis && self.inner.advisor.is_configured() {
            for record in records
                .iter()
                .filter(|r| r.severity_enum() == Severity::Critical && !r.has_suggestion())
            {
                checkpoint(cancel)?;
                match self.analyze_record(record).await {
                    Ok(true) => report.analyzed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(database, id = record.id, error = %e, "Failed to store AI analysis");
                    }
                }
            }
        }

        checkpoint(cancel)?;

        let indexes = self.detect_fragmented_indexes_in(database).await;
        report.fragmented_indexes = indexes.len();

        if monitoring.auto_reindex {
            for index in indexes.iter().filter(|ix| ix.reindex_type != ReindexType::None) {
                checkpoint(cancel)?;
                match self.inner.remediator.reindex(&index.observation).await {
                    Ok(op) if op.success => report.reindexed += 1,
                    Ok(_) => report.reindex_failures += 1,
                    Err(e) => {
                        error!(index = %index.observation.qualified_name(), error = %e, "Reindex failed");
                        report.reindex_failures += 1;
                    }
                }
            }
        }

        checkpoint(cancel)?;

        let missing = self.missing_indexes(database).await;
        report.missing_indexes = missing.len();
        for suggestion in missing
            .iter()
            .filter(|m| m.improvement_percent >= MISSING_INDEX_REPORT_PERCENT)
        {
            info!(
                database,
                improvement = suggestion.improvement_percent,
                statement = %suggestion.create_statement(),
                "Missing index suggested"
            );
        }

        Ok(())
    }

    /// Ask the advisor about one record. Returns whether a suggestion was stored.
    async fn analyze_record(&self, record: &SlowQueryRecord) -> Result<bool> {
        let context = QueryContext::new(record.query_text.clone(), record.database_name.clone())
            .with_metrics(record.average_duration_ms, record.execution_count)
            .with_plan(record.query_plan.clone());

        let analysis = self.inner.advisor.analyze(&context).await;
        if analysis.is_simulated {
            debug!(id = record.id, "Analysis unavailable: {}", analysis.explanation);
            return Ok(false);
        }

        db::set_optimization_suggestion(&self.inner.db, record.id, &analysis.explanation).await?;
        info!(id = record.id, "Stored AI analysis for critical query");
        Ok(true)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
