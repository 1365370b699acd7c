//! The capability the monitoring service depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompt::QueryContext;

/// Structured outcome of an optimization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiOptimizationResult {
    /// Rewritten query, or the original when nothing could be extracted.
    pub optimized_query: String,
    pub explanation: String,
    pub index_recommendations: Vec<String>,
    /// True when no real provider call succeeded.
    pub is_simulated: bool,
}

/// Outcome of an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiAnalysis {
    /// The model's explanation, or a description of why none is available.
    pub explanation: String,
    pub is_simulated: bool,
}

impl AiAnalysis {
    pub fn simulated(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            is_simulated: true,
        }
    }
}

impl AiOptimizationResult {
    /// Result standing in for a provider answer that never arrived.
    pub fn simulated(original_query: &str, explanation: impl Into<String>) -> Self {
        Self {
            optimized_query: original_query.to_string(),
            explanation: explanation.into(),
            index_recommendations: Vec::new(),
            is_simulated: true,
        }
    }
}

/// Query optimization and analysis.
///
/// Implementations never return errors: failures become simulated results
/// whose explanation carries the error.
#[async_trait]
pub trait QueryAdvisor: Send + Sync {
    async fn optimize(&self, context: &QueryContext) -> AiOptimizationResult;

    async fn analyze(&self, context: &QueryContext) -> AiAnalysis;

    /// Whether a real provider stands behind this advisor.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Advisor used when no provider credentials are configured.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredAdvisor;

const NOT_CONFIGURED: &str =
    "AI provider is not configured. Set AI_PROVIDER and AI_API_KEY to enable query optimization.";

#[async_trait]
impl QueryAdvisor for UnconfiguredAdvisor {
    async fn optimize(&self, context: &QueryContext) -> AiOptimizationResult {
        AiOptimizationResult::simulated(&context.query_text, NOT_CONFIGURED)
    }

    async fn analyze(&self, _context: &QueryContext) -> AiAnalysis {
        AiAnalysis::simulated(NOT_CONFIGURED)
    }

    fn is_configured(&self) -> bool {
        false
    }
}
