//! Response handling.
//!
//! Two layers: unwrapping the provider's JSON envelope into the model's text,
//! then best-effort extraction of a query, an explanation and index hints from
//! that free text. Extraction never fails; it degrades to the original query.

use serde::Deserialize;

use crate::advisor::AiOptimizationResult;
use crate::{Error, Result};

const FENCE: &str = "```";
const SQL_FENCE: &str = "```sql";

const INDEX_MARKERS: [&str; 3] = [
    "create index",
    "create nonclustered index",
    "index recommendation",
];

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    choices: Option<Vec<Choice>>,
    content: Option<Vec<ContentBlock>>, // Anthropic format
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    message: String,
}

/// Pull the completion text out of a provider response body.
///
/// Understands the chat-completion shape (`choices[0].message.content`) and
/// the Anthropic shape (`content[0].text`).
pub fn unwrap_completion(body: &str) -> Result<String> {
    let envelope: CompletionEnvelope = serde_json::from_str(body)
        .map_err(|e| Error::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = envelope.error {
        return Err(Error::InvalidResponse(error.message));
    }

    if let Some(text) = envelope
        .content
        .and_then(|blocks| blocks.into_iter().find_map(|block| block.text))
    {
        return Ok(text);
    }

    if let Some(choice) = envelope.choices.and_then(|choices| choices.into_iter().next()) {
        if let Some(content) = choice.message.and_then(|m| m.content) {
            return Ok(content);
        }
        if let Some(text) = choice.text {
            return Ok(text);
        }
    }

    Err(Error::InvalidResponse("No content in response".to_string()))
}

/// Find `needle` in `haystack` ignoring ASCII case, starting at byte `from`.
fn find_ignore_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
        .map(|i| i + from)
}

/// Extract the optimized query from a model response.
///
/// Prefers a ```sql fence, then the first generic fence. Returns `None` when
/// the response has no closed fence or the fenced block is empty.
pub fn extract_optimized_query(text: &str) -> Option<String> {
    if let Some(start) = find_ignore_case(text, SQL_FENCE, 0) {
        let start = start + SQL_FENCE.len();
        if let Some(end) = text[start..].find(FENCE) {
            return non_empty(&text[start..start + end]);
        }
    }

    let start = text.find(FENCE)? + FENCE.len();
    let end = text[start..].find(FENCE)? + start;
    let block = &text[start..end];

    // Skip a language tag on the opening line (```tsql, ```postgres, ...)
    let block = match block.split_once('\n') {
        Some((tag, rest)) if is_language_tag(tag) => rest,
        _ => block,
    };

    non_empty(block)
}

fn is_language_tag(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !line.eq_ignore_ascii_case("select")
        && !line.eq_ignore_ascii_case("with")
}

fn non_empty(block: &str) -> Option<String> {
    let block = block.trim();
    if block.is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

/// Extract the explanation: whatever follows the last fence, or the whole
/// response when there is no fence.
pub fn extract_explanation(text: &str) -> String {
    match text.rfind(FENCE) {
        Some(last) => text[last + FENCE.len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Collect every line that looks like an index suggestion.
pub fn extract_index_recommendations(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            INDEX_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .map(String::from)
        .collect()
}

/// Turn raw model text into a structured result.
pub fn parse_optimization(text: &str, original_query: &str) -> AiOptimizationResult {
    let optimized_query =
        extract_optimized_query(text).unwrap_or_else(|| original_query.to_string());

    let explanation = extract_explanation(text);
    let explanation = if explanation.is_empty() {
        "No explanation provided".to_string()
    } else {
        explanation
    };

    AiOptimizationResult {
        optimized_query,
        explanation,
        index_recommendations: extract_index_recommendations(text),
        is_simulated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_fence_and_trailing_explanation() {
        let result = parse_optimization("```sql\nSELECT 1\n```\nBecause X", "SELECT 2");

        assert_eq!(result.optimized_query, "SELECT 1");
        assert_eq!(result.explanation, "Because X");
        assert!(result.index_recommendations.is_empty());
        assert!(!result.is_simulated);
    }

    #[test]
    fn test_no_fence_falls_back_to_original() {
        let text = "The query is fine as written.\nNothing to change.";
        let result = parse_optimization(text, "SELECT * FROM T");

        assert_eq!(result.optimized_query, "SELECT * FROM T");
        assert_eq!(result.explanation, text);
    }

    #[test]
    fn test_sql_fence_is_case_insensitive_and_preferred() {
        let text = "```\nnot this\n```\nthen\n```SQL\nSELECT id FROM Orders\n```\ndone";
        assert_eq!(
            extract_optimized_query(text).as_deref(),
            Some("SELECT id FROM Orders")
        );
        assert_eq!(extract_explanation(text), "done");
    }

    #[test]
    fn test_generic_fence_with_language_tag() {
        let text = "Try:\n```tsql\nSELECT TOP 10 * FROM Orders\n```";
        assert_eq!(
            extract_optimized_query(text).as_deref(),
            Some("SELECT TOP 10 * FROM Orders")
        );
    }

    #[test]
    fn test_generic_fence_without_tag_keeps_first_line() {
        let text = "```\nSELECT\n  1\n```";
        assert_eq!(extract_optimized_query(text).as_deref(), Some("SELECT\n  1"));
    }

    #[test]
    fn test_unclosed_fence_yields_none() {
        assert!(extract_optimized_query("```sql\nSELECT 1").is_none());
        assert!(extract_optimized_query("```sql\n\n```").is_none());
    }

    #[test]
    fn test_index_recommendations() {
        let text = "Some text\n\
                    CREATE INDEX IX_Orders_Date ON dbo.Orders(OrderDate);\n\
                    create nonclustered index IX_Cust ON dbo.Customers(Name) INCLUDE (Email);\n\
                    Index Recommendation: cover CustomerId\n\
                    unrelated line";

        let recs = extract_index_recommendations(text);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0], "CREATE INDEX IX_Orders_Date ON dbo.Orders(OrderDate);");
        assert!(recs[2].starts_with("Index Recommendation"));
    }

    #[test]
    fn test_empty_explanation_after_last_fence() {
        let result = parse_optimization("```sql\nSELECT 1\n```", "q");
        assert_eq!(result.explanation, "No explanation provided");
    }

    #[test]
    fn test_unwrap_chat_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(unwrap_completion(body).unwrap(), "hello");
    }

    #[test]
    fn test_unwrap_anthropic() {
        let body = r#"{"content":[{"type":"text","text":"from claude"}]}"#;
        assert_eq!(unwrap_completion(body).unwrap(), "from claude");
    }

    #[test]
    fn test_unwrap_errors() {
        assert!(unwrap_completion("not json").is_err());
        assert!(unwrap_completion(r#"{"choices":[]}"#).is_err());
        assert!(matches!(
            unwrap_completion(r#"{"error":{"message":"bad key"}}"#),
            Err(Error::InvalidResponse(msg)) if msg == "bad key"
        ));
    }
}
