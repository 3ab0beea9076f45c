//! Dashboard configuration.
//!
//! Built explicitly and passed down; nothing here is read lazily from global
//! state.
//!
//! # Environment Variables
//!
//! | Setting | Primary Env Var | Fallback Env Var |
//! |---------|-----------------|------------------|
//! | API base URL | `LODESTONE_API_URL` | `API_URL` |
//! | Request timeout (ms) | `LODESTONE_TIMEOUT_MS` | - |
//! | Retry base delay (ms) | `LODESTONE_RETRY_BASE_MS` | - |
//! | Automatic retry | `LODESTONE_AUTO_RETRY` | - |
//! | Identity token | `LODESTONE_ID_TOKEN` | `ID_TOKEN` |

use std::env;
use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};
use crate::ConfigError;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Resolved settings for a dashboard session.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    api_base_url: String,
    request_timeout_ms: u64,
    retry: RetryPolicy,
    id_token: Option<String>,
}

impl DashboardConfig {
    /// Start a builder with defaults and no API URL.
    pub fn builder() -> DashboardConfigBuilder {
        DashboardConfigBuilder::default()
    }

    /// Read every setting from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        DashboardConfigBuilder::from_env()?.build()
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub const fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }
}

/// Builder for [`DashboardConfig`]; explicit setters override the environment.
#[derive(Debug, Clone, Default)]
pub struct DashboardConfigBuilder {
    api_base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    retry_base_ms: Option<u64>,
    auto_retry: Option<bool>,
    id_token: Option<String>,
}

impl DashboardConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: env::var("LODESTONE_API_URL")
                .or_else(|_| env::var("API_URL"))
                .ok()
                .filter(|value| !value.trim().is_empty()),
            request_timeout_ms: parse_env_u64("LODESTONE_TIMEOUT_MS")?,
            retry_base_ms: parse_env_u64("LODESTONE_RETRY_BASE_MS")?,
            auto_retry: parse_env_bool("LODESTONE_AUTO_RETRY")?,
            id_token: env::var("LODESTONE_ID_TOKEN")
                .or_else(|_| env::var("ID_TOKEN"))
                .ok()
                .filter(|value| !value.trim().is_empty()),
        })
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry_base_ms(mut self, base_ms: u64) -> Self {
        self.retry_base_ms = Some(base_ms);
        self
    }

    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = Some(enabled);
        self
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<DashboardConfig, ConfigError> {
        let api_base_url = self.api_base_url.ok_or(ConfigError::MissingApiUrl)?;
        let api_base_url = api_base_url.trim().trim_end_matches('/').to_owned();
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl {
                value: api_base_url,
            });
        }

        let request_timeout_ms = self.request_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if request_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "request timeout",
            });
        }

        let mut retry = RetryPolicy::default();
        if let Some(base_ms) = self.retry_base_ms {
            if base_ms == 0 {
                return Err(ConfigError::ZeroValue {
                    field: "retry base delay",
                });
            }
            retry.backoff = Backoff::exponential(Duration::from_millis(base_ms));
        }
        if let Some(auto_retry) = self.auto_retry {
            retry.auto_retry = auto_retry;
        }

        Ok(DashboardConfig {
            api_base_url,
            request_timeout_ms,
            retry,
            id_token: self.id_token,
        })
    }
}

fn parse_env_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn parse_env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { name, value }),
        },
        Err(_) => Ok(None),
    }
}
