//! Retry and backoff for outbound provider calls.
//!
//! Every send ends in one of four outcomes:
//! - `Success`: 2xx, the body is handed to the envelope parser
//! - `RateLimited`: 429, wait for the hinted time (or the default) and resend
//! - `TransientFailure`: network error, timeout or 5xx, exponential backoff
//! - `PermanentFailure`: any other status, no retry
//!
//! Both retry paths share one attempt budget. Requests are single-use, so every
//! resend goes out as a fresh clone carrying the original body and headers.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Request, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Default number of resends after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for transient failures (doubles each attempt).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Wait applied to a 429 whose body carries no usable hint.
pub const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;

/// Retry limits for one request sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub default_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            default_rate_limit_wait: Duration::from_secs(DEFAULT_RATE_LIMIT_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Backoff for a transient failure on the given zero-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Result of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success(String),
    RateLimited(String),
    TransientFailure(String),
    PermanentFailure { status: u16, body: String },
}

impl SendOutcome {
    /// Classify an HTTP status and its body.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_success() {
            Self::Success(body)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(body)
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            Self::TransientFailure(format!("status {}: {}", status.as_u16(), body))
        } else {
            Self::PermanentFailure {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Per-request retry bookkeeping. Lives for one call sequence only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Zero-based number of the attempt that produced the last outcome.
    pub attempt: u32,
    /// Wait computed for the next resend.
    pub wait: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the outcome of the current attempt.
    ///
    /// Returns `Ok(Some(body))` on success, `Ok(None)` when the caller should
    /// sleep `self.wait` and resend, and `Err` when the sequence is over.
    pub fn advance(&mut self, outcome: SendOutcome, policy: &RetryPolicy) -> Result<Option<String>> {
        let exhausted = self.attempt >= policy.max_retries;

        let wait = match outcome {
            SendOutcome::Success(body) => return Ok(Some(body)),
            SendOutcome::PermanentFailure { status, body } => {
                return Err(Error::Status { status, body });
            }
            SendOutcome::RateLimited(body) => {
                if exhausted {
                    return Err(Error::RateLimited {
                        attempts: self.attempt + 1,
                        body,
                    });
                }
                parse_retry_after(&body)
                    .map(Duration::from_secs)
                    .unwrap_or(policy.default_rate_limit_wait)
            }
            SendOutcome::TransientFailure(message) => {
                if exhausted {
                    return Err(Error::Request(format!(
                        "{} (after {} attempts)",
                        message,
                        self.attempt + 1
                    )));
                }
                policy.backoff(self.attempt)
            }
        };

        self.wait = wait;
        self.attempt += 1;
        Ok(None)
    }
}

/// Something that can wait. Production uses tokio's timer; tests record.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn retry_after_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)retry after (\d+) seconds?").expect("retry-after pattern is valid")
    })
}

/// Extract the "retry after N seconds" hint from a rate-limit body.
///
/// Looks at `error.message` when the body is a JSON error envelope, otherwise
/// at the raw text.
pub fn parse_retry_after(body: &str) -> Option<u64> {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message);

    let haystack = message.as_deref().unwrap_or(body);

    retry_after_pattern()
        .captures(haystack)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Send `request` until it succeeds, fails permanently, or the budget runs out.
pub(crate) async fn send_with_retry(
    client: &Client,
    request: Request,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut state = RetryState::new();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let attempt_request = request
            .try_clone()
            .ok_or_else(|| Error::Request("request body cannot be cloned".to_string()))?;

        debug!(attempt = state.attempt + 1, url = %request.url(), "Sending provider request");

        let outcome = match client.execute(attempt_request).await {
            Ok(response) => {
                let status = response.status();
                match response.text().await {
                    Ok(body) => SendOutcome::from_status(status, body),
                    Err(e) => SendOutcome::TransientFailure(format!("failed to read response: {}", e)),
                }
            }
            Err(e) => SendOutcome::TransientFailure(e.to_string()),
        };

        let rate_limited = matches!(outcome, SendOutcome::RateLimited(_));

        if let Some(body) = state.advance(outcome, policy)? {
            return Ok(body);
        }

        if rate_limited {
            warn!(
                attempt = state.attempt,
                max_retries = policy.max_retries,
                wait_secs = state.wait.as_secs(),
                "Rate limited by provider, waiting before retry"
            );
        } else {
            warn!(
                attempt = state.attempt,
                max_retries = policy.max_retries,
                wait_ms = state.wait.as_millis() as u64,
                "Provider request failed, retrying"
            );
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = sleeper.sleep(state.wait) => {}
        }
    }
}
