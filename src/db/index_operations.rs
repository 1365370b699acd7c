//! Index operation log queries. Rows are appended, never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;
use crate::models::{IndexFragmentationObservation, ReindexType};
use crate::{Error, Result};

/// Index operation record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexOperationRecord {
    pub id: i64,
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub fragmentation_percent: f64,
    pub page_count: i64,
    /// 'REORGANIZE', 'REBUILD', 'REBUILD (OFFLINE)'
    pub operation_type: String,
    pub operation_date: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Input for appending an operation.
#[derive(Debug, Clone)]
pub struct NewIndexOperation<'a> {
    pub index: &'a IndexFragmentationObservation,
    pub reindex_type: ReindexType,
    /// Set when the statement ran without the ONLINE option.
    pub offline: bool,
    pub operation_date: DateTime<Utc>,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

impl NewIndexOperation<'_> {
    fn operation_label(&self) -> String {
        if self.offline && self.reindex_type == ReindexType::Rebuild {
            format!("{} (OFFLINE)", self.reindex_type.as_str())
        } else {
            self.reindex_type.as_str().to_string()
        }
    }
}

/// Append one remediation attempt to the log.
pub async fn append_index_operation(
    pool: &DbPool,
    input: NewIndexOperation<'_>,
) -> Result<IndexOperationRecord> {
    let index = input.index;

    sqlx::query_as::<_, IndexOperationRecord>(
        r#"
        INSERT INTO index_operations (
            database_name, schema_name, table_name, index_name,
            fragmentation_percent, page_count, operation_type, operation_date,
            duration_ms, success, error_message
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&index.database_name)
    .bind(&index.schema_name)
    .bind(&index.table_name)
    .bind(&index.index_name)
    .bind(index.fragmentation_percent)
    .bind(index.page_count)
    .bind(input.operation_label())
    .bind(input.operation_date)
    .bind(input.duration_ms)
    .bind(input.error_message.is_none())
    .bind(&input.error_message)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// List operations, newest first.
pub async fn list_index_operations(
    pool: &DbPool,
    database: Option<&str>,
    limit: i64,
) -> Result<Vec<IndexOperationRecord>> {
    sqlx::query_as::<_, IndexOperationRecord>(
        r#"
        SELECT * FROM index_operations
        WHERE (?1 IS NULL OR database_name = ?1)
        ORDER BY operation_date DESC, id DESC
        LIMIT ?2
        "#,
    )
    .bind(database)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}
