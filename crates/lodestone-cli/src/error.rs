use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] lodestone_core::ValidationError),

    #[error(transparent)]
    Config(#[from] lodestone_core::ConfigError),

    #[error(transparent)]
    Watchlist(#[from] lodestone_core::WatchlistError),

    #[error("partial data: failed sources {}", sources.join(", "))]
    PartialData { sources: Vec<String> },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 3,
            Self::Serialization(_) => 4,
            Self::Watchlist(_) => 5,
            Self::PartialData { .. } => 6,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_data_exits_with_six() {
        let error = CliError::PartialData {
            sources: vec![String::from("financials"), String::from("metrics")],
        };

        assert_eq!(error.exit_code(), 6);
        assert_eq!(error.to_string(), "partial data: failed sources financials, metrics");
    }

    #[test]
    fn config_errors_exit_with_three() {
        let error = CliError::from(lodestone_core::ConfigError::MissingApiUrl);
        assert_eq!(error.exit_code(), 3);
    }
}
