//! Provider variants.
//!
//! Each variant knows its endpoint layout, body shape and auth header. Headers
//! are attached to every request individually; the shared HTTP client carries
//! no per-provider defaults.

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::prompt::Prompt;
use crate::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A configured completion provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Azure OpenAI deployment, `api-key` header.
    AzureOpenAi {
        endpoint: String,
        deployment: String,
        api_version: String,
        api_key: String,
    },
    /// OpenAI-compatible `/chat/completions`, bearer token.
    OpenAi {
        endpoint: String,
        model: String,
        api_key: String,
    },
    /// Anthropic messages API, `x-api-key` header.
    Claude {
        endpoint: String,
        model: String,
        api_key: String,
    },
}

/// Get default endpoint for a provider
pub fn default_endpoint(name: &str) -> &'static str {
    match name {
        "claude" | "anthropic" => "https://api.anthropic.com/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Get default model for a provider
pub fn default_model(name: &str) -> &'static str {
    match name {
        "claude" | "anthropic" => "claude-3-5-haiku-20241022",
        _ => "gpt-4o-mini",
    }
}

impl Provider {
    /// Select a provider variant by its configured name.
    ///
    /// Accepts "AzureOpenAI", "OpenAI" and "Claude" (case-insensitive,
    /// "Anthropic" is an alias for Claude).
    pub fn from_name(
        name: &str,
        endpoint: &str,
        deployment: &str,
        model: &str,
        api_version: &str,
        api_key: &str,
    ) -> Result<Self> {
        let key = name.trim().to_lowercase();
        let endpoint = endpoint.trim().trim_end_matches('/');

        let pick = |fallback: &'static str, value: &str| {
            if value.trim().is_empty() {
                fallback.to_string()
            } else {
                value.trim().to_string()
            }
        };

        match key.as_str() {
            "azureopenai" | "azure" => {
                if endpoint.is_empty() {
                    return Err(Error::Config("Azure OpenAI requires an endpoint".to_string()));
                }
                if deployment.trim().is_empty() {
                    return Err(Error::Config(
                        "Azure OpenAI requires a deployment name".to_string(),
                    ));
                }
                Ok(Self::AzureOpenAi {
                    endpoint: endpoint.to_string(),
                    deployment: deployment.trim().to_string(),
                    api_version: pick("2023-05-15", api_version),
                    api_key: api_key.to_string(),
                })
            }
            "openai" => Ok(Self::OpenAi {
                endpoint: pick(default_endpoint("openai"), endpoint),
                model: pick(default_model("openai"), model),
                api_key: api_key.to_string(),
            }),
            "claude" | "anthropic" => Ok(Self::Claude {
                endpoint: pick(default_endpoint("claude"), endpoint),
                model: pick(default_model("claude"), model),
                api_key: api_key.to_string(),
            }),
            other => Err(Error::Config(format!("Unknown AI provider: {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AzureOpenAi { .. } => "AzureOpenAI",
            Self::OpenAi { .. } => "OpenAI",
            Self::Claude { .. } => "Claude",
        }
    }

    pub fn url(&self) -> String {
        match self {
            Self::AzureOpenAi {
                endpoint,
                deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, api_version
            ),
            Self::OpenAi { endpoint, .. } => format!("{}/chat/completions", endpoint),
            Self::Claude { endpoint, .. } => format!("{}/messages", endpoint),
        }
    }

    pub fn body(&self, prompt: &Prompt, max_tokens: u32, temperature: f64) -> Value {
        match self {
            Self::AzureOpenAi { .. } => json!({
                "messages": [
                    {"role": "system", "content": prompt.system},
                    {"role": "user", "content": prompt.user}
                ],
                "max_tokens": max_tokens,
                "temperature": temperature
            }),
            Self::OpenAi { model, .. } => json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": prompt.system},
                    {"role": "user", "content": prompt.user}
                ],
                "max_tokens": max_tokens,
                "temperature": temperature
            }),
            // Anthropic takes the system role as a top-level field
            Self::Claude { model, .. } => json!({
                "model": model,
                "system": prompt.system,
                "messages": [
                    {"role": "user", "content": prompt.user}
                ],
                "max_tokens": max_tokens,
                "temperature": temperature
            }),
        }
    }

    /// Build a complete POST for this provider.
    pub fn request(
        &self,
        client: &Client,
        prompt: &Prompt,
        max_tokens: u32,
        temperature: f64,
    ) -> RequestBuilder {
        let request = client
            .post(self.url())
            .header("Content-Type", "application/json")
            .json(&self.body(prompt, max_tokens, temperature));

        match self {
            Self::AzureOpenAi { api_key, .. } => request.header("api-key", api_key),
            Self::OpenAi { api_key, .. } => {
                request.header("Authorization", format!("Bearer {}", api_key))
            }
            Self::Claude { api_key, .. } => request
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }
}
