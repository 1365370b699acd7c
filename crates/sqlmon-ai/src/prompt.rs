//! Prompt construction.

use serde::{Deserialize, Serialize};

/// Fixed system role for every request.
pub const SYSTEM_PROMPT: &str = "You are an expert SQL optimizer for Microsoft SQL Server. \
Analyze the provided SQL query and suggest optimizations. When you propose a rewrite, \
put the complete optimized query in a single ```sql fenced code block and write your \
explanation after the block. Write each index suggestion as a CREATE INDEX statement \
on its own line.";

/// Everything the model is told about a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub query_text: String,
    pub database_name: String,
    pub average_duration_ms: Option<f64>,
    pub execution_count: Option<i64>,
    pub query_plan: Option<String>,
}

impl QueryContext {
    pub fn new(query_text: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            database_name: database_name.into(),
            ..Default::default()
        }
    }

    pub fn with_metrics(mut self, average_duration_ms: f64, execution_count: i64) -> Self {
        self.average_duration_ms = Some(average_duration_ms);
        self.execution_count = Some(execution_count);
        self
    }

    pub fn with_plan(mut self, query_plan: Option<String>) -> Self {
        self.query_plan = query_plan.filter(|plan| !plan.trim().is_empty());
        self
    }
}

/// A system/user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Prompt asking for a rewritten query.
    pub fn optimize(context: &QueryContext) -> Self {
        Self::build("Optimize this SQL query", context)
    }

    /// Prompt asking for an explanation of why the query is slow.
    pub fn analyze(context: &QueryContext) -> Self {
        Self::build("Analyze this SQL query", context)
    }

    fn build(instruction: &str, context: &QueryContext) -> Self {
        let mut user = format!(
            "{} for a SQL Server database:\n\n{}\n\nDatabase context: {}",
            instruction, context.query_text, context.database_name
        );

        if let Some(avg) = context.average_duration_ms {
            user.push_str(&format!("\nAverage duration: {:.2} ms", avg));
        }
        if let Some(count) = context.execution_count {
            user.push_str(&format!("\nExecution count: {}", count));
        }
        if let Some(plan) = &context.query_plan {
            user.push_str(&format!("\n\nQuery plan:\n{}", plan));
        }

        Self {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_query_and_metrics() {
        let context = QueryContext::new("SELECT * FROM Orders", "Sales")
            .with_metrics(2500.0, 42)
            .with_plan(Some("<ShowPlanXML/>".to_string()));

        let prompt = Prompt::optimize(&context);

        assert_eq!(prompt.system, SYSTEM_PROMPT);
        assert!(prompt.user.starts_with("Optimize this SQL query"));
        assert!(prompt.user.contains("SELECT * FROM Orders"));
        assert!(prompt.user.contains("Database context: Sales"));
        assert!(prompt.user.contains("Average duration: 2500.00 ms"));
        assert!(prompt.user.contains("Execution count: 42"));
        assert!(prompt.user.contains("<ShowPlanXML/>"));
    }

    #[test]
    fn test_prompt_without_optional_fields() {
        let context = QueryContext::new("SELECT 1", "master").with_plan(Some("  ".to_string()));
        let prompt = Prompt::analyze(&context);

        assert!(prompt.user.starts_with("Analyze this SQL query"));
        assert!(!prompt.user.contains("Average duration"));
        assert!(!prompt.user.contains("Query plan"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let context = QueryContext::new("SELECT 1", "db").with_metrics(1.0, 1);
        assert_eq!(Prompt::optimize(&context), Prompt::optimize(&context));
    }
}
