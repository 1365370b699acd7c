//! Configuration management for sqlmon.
//!
//! Loads configuration from environment variables (and an optional `.env`
//! file). Every value has a default, so the service starts with an empty
//! environment and simply finds nothing to monitor.

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use sqlmon_ai::{AiSettings, RetryPolicy};

use crate::services::{ReindexThresholds, SeverityThresholds};

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub target: TargetConfig,
    pub monitoring: MonitoringConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file holding slow-query history and the index operation log.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// ADO.NET-style connection string of the monitored SQL Server.
    pub connection_string: String,
    /// Databases to inspect. Empty means discover user databases each cycle.
    pub databases: Vec<String>,
    pub online_rebuild: bool,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub interval: Duration,
    pub slow_query_threshold_ms: f64,
    pub severity: SeverityThresholds,
    pub reindex: ReindexThresholds,
    /// Indexes with this many pages or fewer are never reported.
    pub min_page_count: i64,
    pub auto_reindex: bool,
    pub ai_analysis: bool,
    pub max_parallel_databases: usize,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: String,
    pub api_key: String,
    pub endpoint: String,
    pub deployment_name: String,
    pub model_name: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub rate_limit_wait: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_parse("PORT", 8080),
                json_logs: env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/sqlmon.db"),
            },
            target: TargetConfig {
                connection_string: env_or("SQLSERVER_CONNECTION_STRING", ""),
                databases: parse_list(&env_or("MONITORED_DATABASES", "")),
                online_rebuild: env_bool("ONLINE_REBUILD", true),
            },
            monitoring: MonitoringConfig {
                interval: Duration::from_secs(
                    env_parse::<u64>("MONITORING_INTERVAL_MINUTES", 15).max(1) * 60,
                ),
                slow_query_threshold_ms: env_parse("SLOW_QUERY_THRESHOLD_MS", 1000.0),
                severity: SeverityThresholds {
                    warning_ms: env_parse("SEVERITY_WARNING_MS", 2000.0),
                    critical_ms: env_parse("SEVERITY_CRITICAL_MS", 5000.0),
                },
                reindex: ReindexThresholds {
                    reorganize_above: env_parse("INDEX_REORGANIZE_THRESHOLD", 10.0),
                    rebuild_above: env_parse("INDEX_REBUILD_THRESHOLD", 30.0),
                },
                min_page_count: env_parse("INDEX_MIN_PAGE_COUNT", 100),
                auto_reindex: env_bool("AUTO_REINDEX", true),
                ai_analysis: env_bool("AI_ANALYSIS_ENABLED", true),
                max_parallel_databases: env_parse::<usize>("MAX_PARALLEL_DATABASES", 4).max(1),
            },
            ai: AiConfig {
                provider: env_or("AI_PROVIDER", "AzureOpenAI"),
                api_key: env_or("AI_API_KEY", ""),
                endpoint: env_or("AI_ENDPOINT", ""),
                deployment_name: env_or("AI_DEPLOYMENT_NAME", ""),
                model_name: env_or("AI_MODEL_NAME", ""),
                api_version: env_or("AI_API_VERSION", "2023-05-15"),
                max_tokens: env_parse("AI_MAX_TOKENS", 8000),
                temperature: env_parse("AI_TEMPERATURE", 0.0),
                timeout: Duration::from_secs(env_parse("AI_TIMEOUT_SECS", 60)),
                max_retries: env_parse("AI_MAX_RETRIES", 3),
                initial_retry_delay: Duration::from_millis(env_parse(
                    "AI_INITIAL_RETRY_DELAY_MS",
                    1000,
                )),
                rate_limit_wait: Duration::from_secs(env_parse("AI_RATE_LIMIT_WAIT_SECS", 60)),
            },
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            slow_query_threshold_ms: 1000.0,
            severity: SeverityThresholds::default(),
            reindex: ReindexThresholds::default(),
            min_page_count: 100,
            auto_reindex: true,
            ai_analysis: true,
            max_parallel_databases: 4,
        }
    }
}

impl AiConfig {
    /// Whether credentials are present for a real provider.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Settings for the AI client crate.
    pub fn settings(&self) -> AiSettings {
        AiSettings {
            provider: self.provider.clone(),
            api_key: self.api_key.clone(),
            endpoint: self.endpoint.clone(),
            deployment_name: self.deployment_name.clone(),
            model_name: self.model_name.clone(),
            api_version: self.api_version.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_delay: self.initial_retry_delay,
                default_rate_limit_wait: self.rate_limit_wait,
            },
        }
    }
}

/// Get an environment variable or a default value.
fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when it is
/// unset or malformed.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
