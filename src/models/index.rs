//! Index fragmentation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remediation verb for a fragmented index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReindexType {
    None,
    Reorganize,
    Rebuild,
}

impl ReindexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexType::None => "NONE",
            ReindexType::Reorganize => "REORGANIZE",
            ReindexType::Rebuild => "REBUILD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Some(ReindexType::None),
            "REORGANIZE" => Some(ReindexType::Reorganize),
            "REBUILD" => Some(ReindexType::Rebuild),
            _ => None,
        }
    }
}

/// One index as reported by the physical-stats view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFragmentationObservation {
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub fragmentation_percent: f64,
    pub page_count: i64,
    pub last_reindexed: Option<DateTime<Utc>>,
}

impl IndexFragmentationObservation {
    /// `database.schema.table.index`, for logs.
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.database_name, self.schema_name, self.table_name, self.index_name
        )
    }
}

/// An observation paired with the verb the policy picked for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentedIndex {
    #[serde(flatten)]
    pub observation: IndexFragmentationObservation,
    pub reindex_type: ReindexType,
}

/// A missing-index suggestion from the optimizer's DMVs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingIndex {
    pub database_name: String,
    /// Fully qualified table as reported by the server, e.g. `[Sales].[dbo].[Orders]`.
    pub table: String,
    pub equality_columns: Option<String>,
    pub inequality_columns: Option<String>,
    pub included_columns: Option<String>,
    /// Optimizer's estimate of the cost reduction, 0 to 100.
    pub improvement_percent: f64,
    pub user_seeks: i64,
}

impl MissingIndex {
    /// A `CREATE NONCLUSTERED INDEX` statement for this suggestion.
    pub fn create_statement(&self) -> String {
        let key_columns: Vec<&str> = [&self.equality_columns, &self.inequality_columns]
            .into_iter()
            .filter_map(|c| c.as_deref())
            .filter(|c| !c.trim().is_empty())
            .collect();

        let table_part = self
            .table
            .rsplit('.')
            .next()
            .unwrap_or(&self.table)
            .trim_matches(|c| c == '[' || c == ']');

        let mut statement = format!(
            "CREATE NONCLUSTERED INDEX [IX_{}_missing] ON {} ({})",
            table_part,
            self.table,
            key_columns.join(", ")
        );

        if let Some(include) = self.included_columns.as_deref().filter(|c| !c.trim().is_empty()) {
            statement.push_str(&format!(" INCLUDE ({})", include));
        }

        statement
    }
}
