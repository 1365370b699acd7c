//! SQL Server implementation of [`TargetServer`] over tiberius.
//!
//! Every call opens its own TDS connection scoped to the requested database
//! and drops it when the call returns. Numeric and text columns are cast in
//! SQL to types with a single, unambiguous Rust mapping (FLOAT, BIGINT,
//! NVARCHAR, DATETIME2).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tiberius::{Client, Config, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::target::TargetServer;
use crate::models::{DatabaseInfo, IndexFragmentationObservation, MissingIndex, SlowQueryObservation};
use crate::{Error, Result};

const MASTER: &str = "master";

const LIST_DATABASES_SQL: &str = r#"
    SELECT
        CAST(database_id AS INT) AS id,
        CAST(name AS NVARCHAR(128)) AS name,
        CAST(state_desc AS NVARCHAR(60)) AS state
    FROM sys.databases
    WHERE database_id > 4
    ORDER BY name"#;

const LIVE_QUERY_STATS_SQL: &str = r#"
    SELECT TOP 50
        CAST(qt.text AS NVARCHAR(MAX)) AS query_text,
        CAST(qs.total_elapsed_time / qs.execution_count / 1000.0 AS FLOAT) AS average_duration_ms,
        CAST(qs.execution_count AS BIGINT) AS execution_count,
        CAST(qs.last_execution_time AS DATETIME2) AS last_execution_time,
        CAST(qp.query_plan AS NVARCHAR(MAX)) AS query_plan
    FROM sys.dm_exec_query_stats qs
    CROSS APPLY sys.dm_exec_sql_text(qs.sql_handle) qt
    OUTER APPLY sys.dm_exec_query_plan(qs.plan_handle) qp
    CROSS APPLY (
        SELECT CONVERT(INT, pa.value) AS dbid
        FROM sys.dm_exec_plan_attributes(qs.plan_handle) pa
        WHERE pa.attribute = 'dbid'
    ) plan_db
    WHERE plan_db.dbid = DB_ID()
      AND qs.total_elapsed_time / qs.execution_count / 1000.0 > @P1
      AND qt.text NOT LIKE '%sys.%'
    ORDER BY qs.total_elapsed_time / qs.execution_count DESC"#;

const QUERY_STORE_STATS_SQL: &str = r#"
    SELECT TOP 50
        CAST(qt.query_sql_text AS NVARCHAR(MAX)) AS query_text,
        CAST(AVG(rs.avg_duration) / 1000.0 AS FLOAT) AS average_duration_ms,
        CAST(SUM(rs.count_executions) AS BIGINT) AS execution_count,
        CAST(MAX(rs.last_execution_time) AS DATETIME2) AS last_execution_time,
        CAST(NULL AS NVARCHAR(MAX)) AS query_plan
    FROM sys.query_store_query_text qt
    JOIN sys.query_store_query q ON qt.query_text_id = q.query_text_id
    JOIN sys.query_store_plan p ON q.query_id = p.query_id
    JOIN sys.query_store_runtime_stats rs ON p.plan_id = rs.plan_id
    GROUP BY qt.query_sql_text
    HAVING AVG(rs.avg_duration) / 1000.0 > @P1
    ORDER BY AVG(rs.avg_duration) DESC"#;

const INDEX_PHYSICAL_STATS_SQL: &str = r#"
    SELECT
        CAST(SCHEMA_NAME(o.schema_id) AS NVARCHAR(128)) AS schema_name,
        CAST(o.name AS NVARCHAR(128)) AS table_name,
        CAST(i.name AS NVARCHAR(128)) AS index_name,
        CAST(ips.avg_fragmentation_in_percent AS FLOAT) AS fragmentation_percent,
        CAST(ips.page_count AS BIGINT) AS page_count,
        CAST(STATS_DATE(i.object_id, i.index_id) AS DATETIME2) AS last_reindexed
    FROM sys.dm_db_index_physical_stats(DB_ID(), NULL, NULL, NULL, 'LIMITED') ips
    JOIN sys.indexes i ON ips.object_id = i.object_id AND ips.index_id = i.index_id
    JOIN sys.objects o ON i.object_id = o.object_id
    WHERE ips.avg_fragmentation_in_percent > @P1
      AND ips.page_count > @P2
      AND o.type = 'U'
      AND i.name IS NOT NULL
    ORDER BY ips.avg_fragmentation_in_percent DESC"#;

const MISSING_INDEXES_SQL: &str = r#"
    SELECT TOP 50
        CAST(mid.statement AS NVARCHAR(MAX)) AS table_name,
        CAST(mid.equality_columns AS NVARCHAR(MAX)) AS equality_columns,
        CAST(mid.inequality_columns AS NVARCHAR(MAX)) AS inequality_columns,
        CAST(mid.included_columns AS NVARCHAR(MAX)) AS included_columns,
        CAST(migs.avg_user_impact AS FLOAT) AS improvement_percent,
        CAST(migs.user_seeks AS BIGINT) AS user_seeks
    FROM sys.dm_db_missing_index_details mid
    JOIN sys.dm_db_missing_index_groups mig ON mid.index_handle = mig.index_handle
    JOIN sys.dm_db_missing_index_group_stats migs ON mig.index_group_handle = migs.group_handle
    WHERE mid.database_id = DB_ID()
    ORDER BY migs.avg_user_impact * migs.user_seeks DESC"#;

type SqlClient = Client<Compat<TcpStream>>;

/// Connects to one SQL Server instance.
#[derive(Debug, Clone)]
pub struct SqlServerTarget {
    connection_string: String,
}

impl SqlServerTarget {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    async fn connect(&self, database: &str) -> Result<SqlClient> {
        if self.connection_string.trim().is_empty() {
            return Err(Error::Target(
                "SQLSERVER_CONNECTION_STRING is not set".to_string(),
            ));
        }

        let mut config = Config::from_ado_string(&self.connection_string)?;
        config.database(database);

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| Error::Target(format!("Failed to connect to SQL Server: {}", e)))?;
        tcp.set_nodelay(true)?;

        debug!(database, "Opened SQL Server connection");

        Ok(Client::connect(config, tcp.compat_write()).await?)
    }

    async fn fetch(&self, database: &str, query: Query<'_>) -> Result<Vec<Row>> {
        let mut client = self.connect(database).await?;
        let stream = query.query(&mut client).await?;
        Ok(stream.into_first_result().await?)
    }
}

#[async_trait]
impl TargetServer for SqlServerTarget {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let rows = self.fetch(MASTER, Query::new(LIST_DATABASES_SQL)).await?;

        rows.iter()
            .map(|row| {
                Ok(DatabaseInfo {
                    id: row.try_get::<i32, _>("id")?.unwrap_or_default(),
                    name: text(row, "name")?,
                    state: text(row, "state")?,
                })
            })
            .collect()
    }

    async fn live_query_stats(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> Result<Vec<SlowQueryObservation>> {
        let mut query = Query::new(LIVE_QUERY_STATS_SQL);
        query.bind(threshold_ms);

        let rows = self.fetch(database, query).await?;
        rows.iter().map(|row| slow_query_row(row, database)).collect()
    }

    async fn query_store_stats(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> Result<Vec<SlowQueryObservation>> {
        let mut query = Query::new(QUERY_STORE_STATS_SQL);
        query.bind(threshold_ms);

        let rows = self.fetch(database, query).await?;
        rows.iter().map(|row| slow_query_row(row, database)).collect()
    }

    async fn index_physical_stats(
        &self,
        database: &str,
        min_fragmentation: f64,
        min_page_count: i64,
    ) -> Result<Vec<IndexFragmentationObservation>> {
        let mut query = Query::new(INDEX_PHYSICAL_STATS_SQL);
        query.bind(min_fragmentation);
        query.bind(min_page_count);

        let rows = self.fetch(database, query).await?;

        rows.iter()
            .map(|row| {
                Ok(IndexFragmentationObservation {
                    database_name: database.to_string(),
                    schema_name: text(row, "schema_name")?,
                    table_name: text(row, "table_name")?,
                    index_name: text(row, "index_name")?,
                    fragmentation_percent: float(row, "fragmentation_percent")?,
                    page_count: bigint(row, "page_count")?,
                    last_reindexed: timestamp(row, "last_reindexed")?,
                })
            })
            .collect()
    }

    async fn missing_indexes(&self, database: &str) -> Result<Vec<MissingIndex>> {
        let rows = self.fetch(database, Query::new(MISSING_INDEXES_SQL)).await?;

        rows.iter()
            .map(|row| {
                Ok(MissingIndex {
                    database_name: database.to_string(),
                    table: text(row, "table_name")?,
                    equality_columns: optional_text(row, "equality_columns")?,
                    inequality_columns: optional_text(row, "inequality_columns")?,
                    included_columns: optional_text(row, "included_columns")?,
                    improvement_percent: float(row, "improvement_percent")?,
                    user_seeks: bigint(row, "user_seeks")?,
                })
            })
            .collect()
    }

    async fn execute(&self, database: &str, sql: &str) -> Result<()> {
        let mut client = self.connect(database).await?;
        client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

fn slow_query_row(row: &Row, database: &str) -> Result<SlowQueryObservation> {
    Ok(SlowQueryObservation {
        query_text: text(row, "query_text")?,
        database_name: database.to_string(),
        average_duration_ms: float(row, "average_duration_ms")?,
        execution_count: bigint(row, "execution_count")?,
        last_execution_time: timestamp(row, "last_execution_time")?,
        query_plan: optional_text(row, "query_plan")?,
    })
}

fn text(row: &Row, column: &str) -> Result<String> {
    Ok(optional_text(row, column)?.unwrap_or_default())
}

fn optional_text(row: &Row, column: &str) -> Result<Option<String>> {
    Ok(row.try_get::<&str, _>(column)?.map(str::to_string))
}

fn float(row: &Row, column: &str) -> Result<f64> {
    Ok(row.try_get::<f64, _>(column)?.unwrap_or_default())
}

fn bigint(row: &Row, column: &str) -> Result<i64> {
    Ok(row.try_get::<i64, _>(column)?.unwrap_or_default())
}

fn timestamp(row: &Row, column: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(row
        .try_get::<NaiveDateTime, _>(column)?
        .map(|value| value.and_utc()))
}
