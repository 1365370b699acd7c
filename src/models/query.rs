//! Slow query models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity tier of a slow query. Ordered: Normal < Warning < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Severity::Normal),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// One slow statement as reported by a collector. Never stored as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryObservation {
    pub query_text: String,
    pub database_name: String,
    pub average_duration_ms: f64,
    pub execution_count: i64,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub query_plan: Option<String>,
}

/// A user database on the monitored server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub id: i32,
    pub name: String,
    /// e.g. ONLINE, OFFLINE, RESTORING
    pub state: String,
}

/// Timing of one measured execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSample {
    pub execution_time_ms: f64,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of applying a fix to a slow query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFixResult {
    pub message: String,
    pub original_query: String,
    pub optimized_query: String,
    pub explanation: String,
    pub index_recommendations: Vec<String>,
    pub performance_before: ExecutionSample,
    /// Absent when the optimized query equals the original.
    pub performance_after: Option<ExecutionSample>,
    pub improvement_percent: f64,
    pub ai_powered: bool,
    pub is_simulated: bool,
    pub optimized_query_works: bool,
}
