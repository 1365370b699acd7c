//! Severity classification of slow queries.

use serde::{Deserialize, Serialize};

use crate::models::Severity;

/// Duration thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub warning_ms: f64,
    pub critical_ms: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            warning_ms: 2000.0,
            critical_ms: 5000.0,
        }
    }
}

/// Map an average duration to a severity tier. Both bounds are inclusive.
pub fn classify(duration_ms: f64, thresholds: &SeverityThresholds) -> Severity {
    if duration_ms >= thresholds.critical_ms {
        Severity::Critical
    } else if duration_ms >= thresholds.warning_ms {
        Severity::Warning
    } else {
        Severity::Normal
    }
}
