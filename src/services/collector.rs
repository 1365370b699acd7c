//! Collectors: raw observations from the monitored server.
//!
//! A data source that fails (no permission, Query Store disabled, server
//! unreachable) degrades to an empty result and a warning. Nothing here
//! aborts a detection cycle.

use std::sync::Arc;

use tracing::{debug, warn};

use super::target::TargetServer;
use crate::models::{IndexFragmentationObservation, MissingIndex, SlowQueryObservation};

/// Which view produced a batch of slow-query observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowQuerySource {
    LiveStats,
    QueryStore,
}

/// Reads observations for one database at a time.
#[derive(Clone)]
pub struct Collector {
    target: Arc<dyn TargetServer>,
}

impl Collector {
    pub fn new(target: Arc<dyn TargetServer>) -> Self {
        Self { target }
    }

    /// Slow queries above `threshold_ms`.
    ///
    /// The live statistics view is always tried first; Query Store is read
    /// only when the live view yields nothing.
    pub async fn collect_slow_queries(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> std::vec::IntoIter<SlowQueryObservation> {
        let (observations, source) = self.slow_queries_with_source(database, threshold_ms).await;
        debug!(database, count = observations.len(), ?source, "Collected slow queries");
        observations.into_iter()
    }

    async fn slow_queries_with_source(
        &self,
        database: &str,
        threshold_ms: f64,
    ) -> (Vec<SlowQueryObservation>, SlowQuerySource) {
        let live = match self.target.live_query_stats(database, threshold_ms).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(database, error = %e, "Live query statistics unavailable");
                Vec::new()
            }
        };

        if !live.is_empty() {
            return (live, SlowQuerySource::LiveStats);
        }

        let stored = match self.target.query_store_stats(database, threshold_ms).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(database, error = %e, "Query Store unavailable");
                Vec::new()
            }
        };

        (stored, SlowQuerySource::QueryStore)
    }

    /// Indexes fragmented above `threshold_percent` with more than
    /// `min_page_count` pages.
    pub async fn collect_fragmented_indexes(
        &self,
        database: &str,
        threshold_percent: f64,
        min_page_count: i64,
    ) -> std::vec::IntoIter<IndexFragmentationObservation> {
        let rows = match self
            .target
            .index_physical_stats(database, threshold_percent, min_page_count)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(database, error = %e, "Index physical statistics unavailable");
                Vec::new()
            }
        };

        // The page floor is enforced here too; a data source may ignore it.
        rows.into_iter()
            .filter(|ix| ix.page_count > min_page_count && ix.fragmentation_percent > threshold_percent)
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub async fn collect_missing_indexes(&self, database: &str) -> Vec<MissingIndex> {
        match self.target.missing_indexes(database).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(database, error = %e, "Missing index statistics unavailable");
                Vec::new()
            }
        }
    }

    pub fn target(&self) -> &Arc<dyn TargetServer> {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseInfo;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubTarget {
        live: Option<Vec<SlowQueryObservation>>,
        stored: Option<Vec<SlowQueryObservation>>,
        indexes: Vec<IndexFragmentationObservation>,
        query_store_calls: AtomicUsize,
    }

    fn unavailable<T>() -> Result<T> {
        Err(Error::Target("permission denied".into()))
    }

    #[async_trait]
    impl TargetServer for StubTarget {
        async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
            Ok(Vec::new())
        }

        async fn live_query_stats(&self, _: &str, _: f64) -> Result<Vec<SlowQueryObservation>> {
            self.live.clone().map_or_else(unavailable, Ok)
        }

        async fn query_store_stats(&self, _: &str, _: f64) -> Result<Vec<SlowQueryObservation>> {
            self.query_store_calls.fetch_add(1, Ordering::SeqCst);
            self.stored.clone().map_or_else(unavailable, Ok)
        }

        async fn index_physical_stats(
            &self,
            _: &str,
            _: f64,
            _: i64,
        ) -> Result<Vec<IndexFragmentationObservation>> {
            Ok(self.indexes.clone())
        }

        async fn missing_indexes(&self, _: &str) -> Result<Vec<MissingIndex>> {
            unavailable()
        }

        async fn execute(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn observation(query: &str) -> SlowQueryObservation {
        SlowQueryObservation {
            query_text: query.into(),
            database_name: "db".into(),
            average_duration_ms: 1500.0,
            execution_count: 1,
            last_execution_time: None,
            query_plan: None,
        }
    }

    #[tokio::test]
    async fn test_live_results_skip_query_store() {
        let stub = Arc::new(StubTarget {
            live: Some(vec![observation("live")]),
            stored: Some(vec![observation("stored")]),
            ..Default::default()
        });
        let collector = Collector::new(stub.clone());

        let (rows, source) = collector.slow_queries_with_source("db", 1000.0).await;
        assert_eq!(source, SlowQuerySource::LiveStats);
        assert_eq!(rows[0].query_text, "live");
        assert_eq!(stub.query_store_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_live_falls_back_to_query_store() {
        let collector = Collector::new(Arc::new(StubTarget {
            live: Some(Vec::new()),
            stored: Some(vec![observation("stored")]),
            ..Default::default()
        }));

        let (rows, source) = collector.slow_queries_with_source("db", 1000.0).await;
        assert_eq!(source, SlowQuerySource::QueryStore);
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sources_degrade_to_empty() {
        let collector = Collector::new(Arc::new(StubTarget::default()));

        assert_eq!(collector.collect_slow_queries("db", 1000.0).await.count(), 0);
        assert!(collector.collect_missing_indexes("db").await.is_empty());
    }

    #[tokio::test]
    async fn test_page_floor_is_enforced() {
        let index = |pages: i64| IndexFragmentationObservation {
            database_name: "db".into(),
            schema_name: "dbo".into(),
            table_name: "T".into(),
            index_name: format!("IX_{}", pages),
            fragmentation_percent: 50.0,
            page_count: pages,
            last_reindexed: None,
        };
        let collector = Collector::new(Arc::new(StubTarget {
            indexes: vec![index(50), index(100), index(101)],
            ..Default::default()
        }));

        let names: Vec<String> = collector
            .collect_fragmented_indexes("db", 10.0, 100)
            .await
            .map(|ix| ix.index_name)
            .collect();
        assert_eq!(names, vec!["IX_101"]);
    }
}
