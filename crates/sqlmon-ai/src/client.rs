//! HTTP client for the configured provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::advisor::{AiAnalysis, AiOptimizationResult, QueryAdvisor};
use crate::parse::{parse_optimization, unwrap_completion};
use crate::prompt::{Prompt, QueryContext};
use crate::provider::Provider;
use crate::retry::{send_with_retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::{Error, Result};

/// Settings for [`AiClient`].
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// "AzureOpenAI", "OpenAI" or "Claude".
    pub provider: String,
    pub api_key: String,
    pub endpoint: String,
    pub deployment_name: String,
    pub model_name: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "AzureOpenAI".to_string(),
            api_key: String::new(),
            endpoint: String::new(),
            deployment_name: String::new(),
            model_name: String::new(),
            api_version: "2023-05-15".to_string(),
            max_tokens: 8000,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for one provider, shareable across tasks.
///
/// The inner `reqwest::Client` is long-lived; auth headers are built per
/// request so concurrent calls never touch shared header state.
#[derive(Clone)]
pub struct AiClient {
    inner: Arc<AiClientInner>,
}

struct AiClientInner {
    client: Client,
    provider: Provider,
    max_tokens: u32,
    temperature: f64,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl AiClient {
    /// Create a client from settings. Fails on unknown providers or
    /// incomplete provider configuration.
    pub fn new(settings: &AiSettings) -> Result<Self> {
        let provider = Provider::from_name(
            &settings.provider,
            &settings.endpoint,
            &settings.deployment_name,
            &settings.model_name,
            &settings.api_version,
            &settings.api_key,
        )?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            provider = provider.name(),
            url = %provider.url(),
            max_tokens = settings.max_tokens,
            "AI client initialized"
        );

        Ok(Self {
            inner: Arc::new(AiClientInner {
                client,
                provider,
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
                retry: settings.retry,
                sleeper: Arc::new(TokioSleeper),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Replace the sleeper used between retries.
    pub fn with_sleeper(self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.rebuild(|inner| inner.sleeper = sleeper)
    }

    /// Stop retrying once `cancel` fires. In-flight sends still complete.
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        self.rebuild(|inner| inner.cancel = cancel)
    }

    fn rebuild(self, apply: impl FnOnce(&mut AiClientInner)) -> Self {
        let mut inner = AiClientInner {
            client: self.inner.client.clone(),
            provider: self.inner.provider.clone(),
            max_tokens: self.inner.max_tokens,
            temperature: self.inner.temperature,
            retry: self.inner.retry,
            sleeper: self.inner.sleeper.clone(),
            cancel: self.inner.cancel.clone(),
        };
        apply(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.inner.provider
    }

    /// Send a prompt and return the model's text.
    pub async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let inner = &self.inner;

        let request = inner
            .provider
            .request(&inner.client, prompt, inner.max_tokens, inner.temperature)
            .build()
            .map_err(|e| Error::Request(format!("Failed to build request: {}", e)))?;

        debug!(provider = inner.provider.name(), "Calling AI provider");

        let body = send_with_retry(
            &inner.client,
            request,
            &inner.retry,
            inner.sleeper.as_ref(),
            &inner.cancel,
        )
        .await?;

        unwrap_completion(&body)
    }
}

#[async_trait]
impl QueryAdvisor for AiClient {
    async fn optimize(&self, context: &QueryContext) -> AiOptimizationResult {
        info!(database = %context.database_name, "Optimizing query with AI");

        match self.complete(&Prompt::optimize(context)).await {
            Ok(text) => parse_optimization(&text, &context.query_text),
            Err(e) => {
                error!(
                    provider = self.inner.provider.name(),
                    error = %e,
                    "Error optimizing query with AI"
                );
                AiOptimizationResult::simulated(
                    &context.query_text,
                    format!("Error optimizing query: {}", e),
                )
            }
        }
    }

    async fn analyze(&self, context: &QueryContext) -> AiAnalysis {
        info!(database = %context.database_name, "Analyzing query with AI");

        match self.complete(&Prompt::analyze(context)).await {
            Ok(text) => AiAnalysis {
                explanation: text,
                is_simulated: false,
            },
            Err(e) => {
                error!(
                    provider = self.inner.provider.name(),
                    error = %e,
                    "Error analyzing query with AI"
                );
                AiAnalysis::simulated(format!("Error analyzing query: {}", e))
            }
        }
    }
}
