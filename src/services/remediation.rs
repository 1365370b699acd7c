//! On-demand remediation: query fixes and reindexing.

use std::sync::Arc;
use std::time::Instant;

use sqlmon_ai::{QueryAdvisor, QueryContext};
use tracing::{error, info, warn};

use super::clock::Clock;
use super::reindex_policy::{decide, ReindexThresholds};
use super::target::{reindex_statement, TargetServer};
use crate::db::{self, DbPool, IndexOperationRecord, NewIndexOperation, SlowQueryRecord};
use crate::models::{ExecutionSample, IndexFragmentationObservation, QueryFixResult, ReindexType};
use crate::{Error, Result};

/// Fix type that routes a query through the AI advisor.
pub const AI_FIX_TYPE: &str = "ai";

/// Percentage improvement of `after_ms` over `before_ms`, rounded to two
/// decimals. Zero when there is no positive baseline.
pub fn improvement_percent(before_ms: f64, after_ms: f64) -> f64 {
    if before_ms <= 0.0 {
        return 0.0;
    }
    ((1.0 - after_ms / before_ms) * 100.0 * 100.0).round() / 100.0
}

/// Executes fixes against the monitored server and records the outcome.
#[derive(Clone)]
pub struct Remediator {
    inner: Arc<RemediatorInner>,
}

struct RemediatorInner {
    db: DbPool,
    target: Arc<dyn TargetServer>,
    advisor: Arc<dyn QueryAdvisor>,
    clock: Arc<dyn Clock>,
    thresholds: ReindexThresholds,
    online_rebuild: bool,
}

impl Remediator {
    pub fn new(
        db: DbPool,
        target: Arc<dyn TargetServer>,
        advisor: Arc<dyn QueryAdvisor>,
        clock: Arc<dyn Clock>,
        thresholds: ReindexThresholds,
        online_rebuild: bool,
    ) -> Self {
        Self {
            inner: Arc::new(RemediatorInner {
                db,
                target,
                advisor,
                clock,
                thresholds,
                online_rebuild,
            }),
        }
    }

    /// Apply a fix to a slow query and measure its effect.
    ///
    /// `query_id` is the history record id. When `query` is empty the text
    /// is taken from that record. Only `fix_type == "ai"` consults the
    /// advisor; any other fix type runs the query unchanged.
    pub async fn apply_fix(
        &self,
        database: &str,
        query_id: &str,
        fix_type: &str,
        query: &str,
    ) -> Result<QueryFixResult> {
        let inner = &self.inner;

        let record = self.history_record(query_id).await?;
        let original = if query.trim().is_empty() {
            match &record {
                Some(record) => record.query_text.clone(),
                None => {
                    return Err(Error::Validation(format!(
                        "No query text supplied and no history record {}",
                        query_id
                    )))
                }
            }
        } else {
            query.to_string()
        };

        let ai_powered = fix_type.eq_ignore_ascii_case(AI_FIX_TYPE);

        let (optimized, explanation, index_recommendations, is_simulated) = if ai_powered {
            let mut context = QueryContext::new(original.clone(), database);
            if let Some(record) = &record {
                context = context
                    .with_metrics(record.average_duration_ms, record.execution_count)
                    .with_plan(record.query_plan.clone());
            }
            let result = inner.advisor.optimize(&context).await;
            (
                result.optimized_query,
                result.explanation,
                result.index_recommendations,
                result.is_simulated,
            )
        } else {
            (
                original.clone(),
                format!("{} fix applied without changes to the query", fix_type),
                Vec::new(),
                false,
            )
        };

        info!(database, query_id, fix_type, "Measuring query fix");

        let before = self.measure(database, &original).await;
        let after = if optimized.trim() != original.trim() {
            Some(self.measure(database, &optimized).await)
        } else {
            None
        };

        let optimized_query_works = after.as_ref().unwrap_or(&before).succeeded;

        let improvement = match &after {
            Some(after) if before.succeeded && after.succeeded => {
                improvement_percent(before.execution_time_ms, after.execution_time_ms)
            }
            _ => 0.0,
        };

        if let Some(record) = &record {
            if ai_powered && !is_simulated {
                let suggestion = format!("{}\n\n{}", optimized, explanation);
                if let Err(e) = db::set_optimization_suggestion(&inner.db, record.id, &suggestion).await
                {
                    warn!(id = record.id, error = %e, "Failed to store optimization suggestion");
                }
            }
        }

        let message = match (ai_powered, is_simulated, optimized_query_works) {
            (true, false, true) => "Query optimized with AI",
            (true, true, _) => "AI optimization unavailable, original query measured",
            (_, _, false) => "Optimized query failed to execute",
            _ => "Fix applied",
        };

        Ok(QueryFixResult {
            message: message.to_string(),
            original_query: original,
            optimized_query: optimized,
            explanation,
            index_recommendations,
            performance_before: before,
            performance_after: after,
            improvement_percent: improvement,
            ai_powered,
            is_simulated,
            optimized_query_works,
        })
    }

    async fn history_record(&self, query_id: &str) -> Result<Option<SlowQueryRecord>> {
        match query_id.trim().parse::<i64>() {
            Ok(id) => match db::get_slow_query(&self.inner.db, id).await {
                Ok(record) => Ok(Some(record)),
                Err(Error::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            Err(_) => Ok(None),
        }
    }

    /// Run a statement and time it. Failures are reported in the sample.
    async fn measure(&self, database: &str, sql: &str) -> ExecutionSample {
        let start = Instant::now();
        let outcome = self.inner.target.execute(database, sql).await;
        let execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(()) => ExecutionSample {
                execution_time_ms,
                succeeded: true,
                error: None,
            },
            Err(e) => {
                warn!(database, error = %e, "Query execution failed during measurement");
                ExecutionSample {
                    execution_time_ms,
                    succeeded: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Reindex one index with the verb the policy picks for it.
    ///
    /// Every attempt is appended to the operation log. A failed statement is
    /// recorded and returned as an unsuccessful record, not as an error.
    pub async fn reindex(&self, index: &IndexFragmentationObservation) -> Result<IndexOperationRecord> {
        let inner = &self.inner;
        let verb = decide(index.fragmentation_percent, &inner.thresholds);

        if verb == ReindexType::None {
            return Err(Error::Validation(format!(
                "{} is {:.2}% fragmented, below the reorganize threshold",
                index.qualified_name(),
                index.fragmentation_percent
            )));
        }

        let online = inner.online_rebuild && verb == ReindexType::Rebuild;

        info!(
            index = %index.qualified_name(),
            verb = verb.as_str(),
            fragmentation = index.fragmentation_percent,
            "Reindexing"
        );

        let record = self.run_reindex(index, verb, online).await?;

        // Editions without online index operations reject the ONLINE option
        if !record.success && online && mentions_online(record.error_message.as_deref()) {
            warn!(index = %index.qualified_name(), "Online rebuild rejected, retrying offline");
            return self.run_reindex(index, verb, false).await;
        }

        Ok(record)
    }

    async fn run_reindex(
        &self,
        index: &IndexFragmentationObservation,
        verb: ReindexType,
        online: bool,
    ) -> Result<IndexOperationRecord> {
        let inner = &self.inner;
        let statement = reindex_statement(index, verb, online)
            .ok_or_else(|| Error::Internal("no statement for reindex verb".to_string()))?;

        let start = Instant::now();
        let outcome = inner.target.execute(&index.database_name, &statement).await;
        let duration_ms = start.elapsed().as_millis() as i64;

        let error_message = match outcome {
            Ok(()) => {
                info!(index = %index.qualified_name(), duration_ms, "Reindex succeeded");
                None
            }
            Err(e) => {
                error!(index = %index.qualified_name(), error = %e, "Reindex failed");
                Some(e.to_string())
            }
        };

        db::append_index_operation(
            &inner.db,
            NewIndexOperation {
                index,
                reindex_type: verb,
                offline: verb == ReindexType::Rebuild && !online,
                operation_date: inner.clock.now(),
                duration_ms,
                error_message,
            },
        )
        .await
    }
}

fn mentions_online(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.to_lowercase().contains("online"))
}
