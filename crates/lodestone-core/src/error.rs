use thiserror::Error;

/// Validation and contract errors exposed by `lodestone-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("entity name cannot be empty")]
    EmptyName,
    #[error("invalid source '{value}', expected one of financials, overview, metrics, news")]
    InvalidSource { value: String },
}

/// Configuration errors raised while assembling a [`crate::DashboardConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api base url is not configured (set LODESTONE_API_URL or API_URL)")]
    MissingApiUrl,
    #[error("api base url must start with http:// or https://: '{value}'")]
    InvalidApiUrl { value: String },
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}
