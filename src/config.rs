use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::limiter::{RateLimiterConfig, RefillMode};
use crate::llm::Provider;
use crate::orchestrator::OrchestratorSettings;
use crate::retry::RetryPolicy;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults; `${VAR}` references are expanded
    /// from the environment before parsing.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }
}

/// Expand `${VAR}` references from the environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnclosedVarReference);
        };
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

// ============================================================================
// LlmConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

// ============================================================================
// OrchestratorConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    /// Overall deadline for one submit, dominating lock wait, admission,
    /// and all retries.
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,
    #[serde(default)]
    pub record_usage: bool,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_instruction: default_system_instruction(),
            deadline_seconds: default_deadline(),
            record_usage: false,
            rate: RateConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Build orchestrator settings, taking model parameters from `llm`.
    #[must_use]
    pub fn to_settings(&self, llm: &LlmConfig) -> OrchestratorSettings {
        OrchestratorSettings {
            model: llm.model.clone(),
            system_instruction: self.system_instruction.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            deadline: Duration::from_secs(self.deadline_seconds),
            record_usage: self.record_usage,
        }
    }
}

// ============================================================================
// RateConfig
// ============================================================================

/// Token refill discipline for the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMode {
    Concurrent,
    Interval,
}

#[derive(Debug, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_rate_capacity")]
    pub capacity: usize,
    #[serde(default = "default_rate_mode")]
    pub mode: RateMode,
    /// One token is restored per this interval in `interval` mode.
    #[serde(default = "default_refill_interval")]
    pub refill_interval_ms: u64,
    #[serde(default = "default_admit_timeout")]
    pub admit_timeout_ms: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            mode: default_rate_mode(),
            refill_interval_ms: default_refill_interval(),
            admit_timeout_ms: default_admit_timeout(),
        }
    }
}

impl RateConfig {
    #[must_use]
    pub fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            capacity: self.capacity.max(1),
            mode: match self.mode {
                RateMode::Concurrent => RefillMode::Concurrent,
                RateMode::Interval => {
                    RefillMode::Interval(Duration::from_millis(self.refill_interval_ms.max(1)))
                }
            },
            admit_timeout: Duration::from_millis(self.admit_timeout_ms),
        }
    }
}

// ============================================================================
// RetryConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            attempt_timeout_seconds: default_attempt_timeout(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_seconds),
        }
    }
}

// ============================================================================
// SessionsConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionsConfig {
    /// Threads idle past this are evicted from memory.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// When set, conversations are persisted as JSON under this directory.
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            persist_dir: None,
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

fn default_provider() -> Provider {
    Provider::Anthropic
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_system_instruction() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_deadline() -> u64 {
    120
}

fn default_rate_capacity() -> usize {
    8
}

fn default_rate_mode() -> RateMode {
    RateMode::Concurrent
}

fn default_refill_interval() -> u64 {
    250
}

fn default_admit_timeout() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    8_000
}

fn default_attempt_timeout() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    3_600
}

fn default_sweep_interval() -> u64 {
    60
}

// ============================================================================
// Tests
// ============================================================================
