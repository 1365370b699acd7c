//! The monitored server, as seen by the collectors and remediation.
//!
//! Everything the core needs from SQL Server goes through [`TargetServer`]:
//! read-only diagnostic views plus a plain "execute this statement" call.
//! Implementations open a connection per call and release it before
//! returning, on every path.

use async_trait::async_trait;

use crate::models::{
    DatabaseInfo, IndexFragmentationObservation, MissingIndex, ReindexType, SlowQueryObservation,
};
use crate::Result;

#[async_trait]
pub trait TargetServer: Send + Sync {
    /// User databases on the server.
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Slow statements from the live execution-statistics view.
    async fn live_query_stats(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> Result<Vec<SlowQueryObservation>>;

    /// Slow statements from the persisted Query Store.
    async fn query_store_stats(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> Result<Vec<SlowQueryObservation>>;

    /// Indexes above the fragmentation threshold with more than
    /// `min_page_count` pages.
    async fn index_physical_stats(
        &self,
        database: &str,
        min_fragmentation: f64,
        min_page_count: i64,
    ) -> Result<Vec<IndexFragmentationObservation>>;

    async fn missing_indexes(&self, database: &str) -> Result<Vec<MissingIndex>>;

    /// Run a statement to completion, discarding any result sets.
    async fn execute(&self, database: &str, sql: &str) -> Result<()>;
}

/// Bracket-quote an identifier, escaping `]`.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// The `ALTER INDEX` statement for a remediation verb, or `None` for
/// [`ReindexType::None`].
pub fn reindex_statement(
    index: &IndexFragmentationObservation,
    verb: ReindexType,
    online: bool,
) -> Option<String> {
    let target = format!(
        "ALTER INDEX {} ON {}.{}",
        quote_identifier(&index.index_name),
        quote_identifier(&index.schema_name),
        quote_identifier(&index.table_name)
    );

    match verb {
        ReindexType::None => None,
        ReindexType::Reorganize => Some(format!("{} REORGANIZE", target)),
        ReindexType::Rebuild if online => Some(format!("{} REBUILD WITH (ONLINE = ON)", target)),
        ReindexType::Rebuild => Some(format!("{} REBUILD", target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(name: &str) -> IndexFragmentationObservation {
        IndexFragmentationObservation {
            database_name: "Sales".into(),
            schema_name: "dbo".into(),
            table_name: "Orders".into(),
            index_name: name.into(),
            fragmentation_percent: 45.0,
            page_count: 500,
            last_reindexed: None,
        }
    }

    #[test]
    fn test_quote_identifier_escapes_brackets() {
        assert_eq!(quote_identifier("Orders"), "[Orders]");
        assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
        assert_eq!(quote_identifier("x]; DROP TABLE t; --"), "[x]]; DROP TABLE t; --]");
    }

    #[test]
    fn test_reindex_statements() {
        let ix = index("IX_Orders_Date");
        assert_eq!(
            reindex_statement(&ix, ReindexType::Rebuild, true).unwrap(),
            "ALTER INDEX [IX_Orders_Date] ON [dbo].[Orders] REBUILD WITH (ONLINE = ON)"
        );
        assert_eq!(
            reindex_statement(&ix, ReindexType::Rebuild, false).unwrap(),
            "ALTER INDEX [IX_Orders_Date] ON [dbo].[Orders] REBUILD"
        );
        assert_eq!(
            reindex_statement(&ix, ReindexType::Reorganize, true).unwrap(),
            "ALTER INDEX [IX_Orders_Date] ON [dbo].[Orders] REORGANIZE"
        );
        assert!(reindex_statement(&ix, ReindexType::None, true).is_none());
    }
}
