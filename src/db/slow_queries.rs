//! Slow query history queries.
//!
//! The dedup invariant (at most one unresolved row per query text and
//! database) is enforced by a partial unique index; [`upsert_slow_query`]
//! relies on it through a single `INSERT ... ON CONFLICT` statement, so
//! concurrent cycles can never open a second active record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;
use crate::models::{Severity, SlowQueryObservation};
use crate::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Slow query history record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SlowQueryRecord {
    pub id: i64,
    pub query_text: String,
    pub database_name: String,
    pub average_duration_ms: f64,
    pub execution_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub query_plan: Option<String>,
    pub optimization_suggestion: Option<String>,
    /// 'normal', 'warning', 'critical'
    pub severity: String,
    pub is_resolved: bool,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SlowQueryRecord {
    /// Get severity as enum.
    pub fn severity_enum(&self) -> Severity {
        Severity::from_str(&self.severity).unwrap_or_default()
    }

    pub fn has_suggestion(&self) -> bool {
        self.optimization_suggestion
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// Filters for listing history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlowQueryFilter {
    pub database: Option<String>,
    #[serde(default)]
    pub include_resolved: bool,
    /// Only records seen at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only records seen at or before this instant.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 1000;

// ============================================================================
// Queries
// ============================================================================

/// Record an observation of a slow query.
///
/// Opens a new record (`first_seen = last_seen = seen_at`) when the identity
/// has no unresolved record, otherwise refreshes metrics, severity and
/// `last_seen` on the existing one. `first_seen` is never touched on update.
pub async fn upsert_slow_query(
    pool: &DbPool,
    observation: &SlowQueryObservation,
    severity: Severity,
    seen_at: DateTime<Utc>,
) -> Result<SlowQueryRecord> {
    sqlx::query_as::<_, SlowQueryRecord>(
        r#"
        INSERT INTO slow_query_history (
            query_text, database_name, average_duration_ms, execution_count,
            first_seen, last_seen, query_plan, severity, is_resolved
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
        ON CONFLICT(query_text, database_name) WHERE is_resolved = 0 DO UPDATE SET
            average_duration_ms = excluded.average_duration_ms,
            execution_count = excluded.execution_count,
            last_seen = excluded.last_seen,
            query_plan = COALESCE(excluded.query_plan, slow_query_history.query_plan),
            severity = excluded.severity
        RETURNING *
        "#,
    )
    .bind(&observation.query_text)
    .bind(&observation.database_name)
    .bind(observation.average_duration_ms)
    .bind(observation.execution_count)
    .bind(seen_at)
    .bind(seen_at)
    .bind(&observation.query_plan)
    .bind(severity.as_str())
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a record by ID.
pub async fn get_slow_query(pool: &DbPool, id: i64) -> Result<SlowQueryRecord> {
    sqlx::query_as::<_, SlowQueryRecord>("SELECT * FROM slow_query_history WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Slow query not found: {}", id)))
}

/// Get the unresolved record for an identity, if any.
pub async fn find_active_slow_query(
    pool: &DbPool,
    query_text: &str,
    database_name: &str,
) -> Result<Option<SlowQueryRecord>> {
    sqlx::query_as::<_, SlowQueryRecord>(
        r#"
        SELECT * FROM slow_query_history
        WHERE query_text = ? AND database_name = ? AND is_resolved = 0
        "#,
    )
    .bind(query_text)
    .bind(database_name)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)
}

/// List records, most recently seen first.
pub async fn list_slow_queries(
    pool: &DbPool,
    filter: &SlowQueryFilter,
) -> Result<Vec<SlowQueryRecord>> {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    sqlx::query_as::<_, SlowQueryRecord>(
        r#"
        SELECT * FROM slow_query_history
        WHERE (?1 IS NULL OR database_name = ?1)
          AND (?2 = 1 OR is_resolved = 0)
          AND (?3 IS NULL OR last_seen >= ?3)
          AND (?4 IS NULL OR last_seen <= ?4)
        ORDER BY last_seen DESC, id DESC
        LIMIT ?5
        "#,
    )
    .bind(&filter.database)
    .bind(filter.include_resolved)
    .bind(filter.since)
    .bind(filter.until)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Mark a record resolved. A later observation of the same identity opens
/// a fresh record.
pub async fn resolve_slow_query(
    pool: &DbPool,
    id: i64,
    resolution: &str,
    resolved_at: DateTime<Utc>,
) -> Result<SlowQueryRecord> {
    let resolved = sqlx::query_as::<_, SlowQueryRecord>(
        r#"
        UPDATE slow_query_history SET
            is_resolved = 1,
            resolution = ?,
            resolved_at = ?
        WHERE id = ? AND is_resolved = 0
        RETURNING *
        "#,
    )
    .bind(resolution)
    .bind(resolved_at)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match resolved {
        Some(record) => Ok(record),
        None => {
            // Distinguish "already resolved" from "no such record"
            let existing = get_slow_query(pool, id).await?;
            Err(Error::Validation(format!(
                "Slow query {} was already resolved at {}",
                existing.id,
                existing
                    .resolved_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "an unknown time".to_string())
            )))
        }
    }
}

/// Store the AI suggestion for a record.
pub async fn set_optimization_suggestion(
    pool: &DbPool,
    id: i64,
    suggestion: &str,
) -> Result<SlowQueryRecord> {
    sqlx::query_as::<_, SlowQueryRecord>(
        r#"
        UPDATE slow_query_history SET optimization_suggestion = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(suggestion)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Slow query not found: {}", id)))
}
