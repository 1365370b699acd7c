//! Choice of remediation verb for a fragmented index.

use serde::{Deserialize, Serialize};

use crate::models::ReindexType;

/// Fragmentation thresholds in percent. Each bound is exclusive, so a value
/// exactly on a threshold falls into the lower tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReindexThresholds {
    pub reorganize_above: f64,
    pub rebuild_above: f64,
}

impl Default for ReindexThresholds {
    fn default() -> Self {
        Self {
            reorganize_above: 10.0,
            rebuild_above: 30.0,
        }
    }
}

/// Decide how to remediate an index with the given fragmentation.
pub fn decide(fragmentation_percent: f64, thresholds: &ReindexThresholds) -> ReindexType {
    if fragmentation_percent > thresholds.rebuild_above {
        ReindexType::Rebuild
    } else if fragmentation_percent > thresholds.reorganize_above {
        ReindexType::Reorganize
    } else {
        ReindexType::None
    }
}
