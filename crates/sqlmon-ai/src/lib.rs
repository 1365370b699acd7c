//! AI-assisted SQL query optimization.
//!
//! Sends slow queries to a chat-completion provider (Azure OpenAI, an
//! OpenAI-compatible endpoint, or Claude) and turns the free-text answer into
//! an [`AiOptimizationResult`].
//!
//! This crate provides a standalone client that can be used independently
//! of the monitoring service. Callers depend on the [`QueryAdvisor`] trait;
//! provider failures never escape it.

mod advisor;
mod client;
mod parse;
mod prompt;
mod provider;
mod retry;

pub use advisor::{AiAnalysis, AiOptimizationResult, QueryAdvisor, UnconfiguredAdvisor};
pub use client::{AiClient, AiSettings};
pub use parse::{
    extract_explanation, extract_index_recommendations, extract_optimized_query,
    parse_optimization, unwrap_completion,
};
pub use prompt::{Prompt, QueryContext, SYSTEM_PROMPT};
pub use provider::Provider;
pub use retry::{
    parse_retry_after, RetryPolicy, RetryState, SendOutcome, Sleeper, TokioSleeper,
};

/// Error types for the AI client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Rate limited after {attempts} attempts. Last response: {body}")]
    RateLimited { attempts: u32, body: String },

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid AI configuration: {0}")]
    Config(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Result type for AI operations.
pub type Result<T> = std::result::Result<T, Error>;
