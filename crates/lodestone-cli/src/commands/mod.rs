mod search;
mod show;
mod watchlist;

use std::sync::Arc;

use lodestone_core::{
    DashboardConfig, DashboardConfigBuilder, HttpClient, InMemorySessionProvider,
    ReqwestHttpClient, SelectionSession, Session, SessionProvider, SourceName,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::mock;

pub struct CommandResult {
    pub command: &'static str,
    pub data: Value,
    pub warnings: Vec<String>,
    pub failed_sources: Vec<SourceName>,
}

impl CommandResult {
    pub fn ok(command: &'static str, data: Value) -> Self {
        Self {
            command,
            data,
            warnings: Vec::new(),
            failed_sources: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_failed_sources(mut self, sources: Vec<SourceName>) -> Self {
        self.failed_sources = sources;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = build_config(cli)?;

    let http: Arc<dyn HttpClient> = if cli.mock {
        Arc::new(mock::fixture_client())
    } else {
        Arc::new(ReqwestHttpClient::new())
    };

    let sessions = Arc::new(InMemorySessionProvider::new());
    if let Some(token) = config.id_token() {
        sessions.sign_in(Session::new("cli", token));
    }
    let sessions: Arc<dyn SessionProvider> = sessions;

    let session = SelectionSession::new(&config, &http, sessions);

    match &cli.command {
        Command::Search(args) => search::run(args, &session).await,
        Command::Show(args) => show::run(args, &session).await,
        Command::Watchlist(args) => watchlist::run(args, &session).await,
    }
}

/// Environment first, then command-line overrides.
fn build_config(cli: &Cli) -> Result<DashboardConfig, CliError> {
    let mut builder = DashboardConfigBuilder::from_env()?;

    if cli.mock {
        builder = builder
            .with_api_base_url(mock::MOCK_API_URL)
            .with_id_token(mock::MOCK_TOKEN);
    }
    if let Some(url) = &cli.api_url {
        builder = builder.with_api_base_url(url.as_str());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        builder = builder.with_request_timeout_ms(timeout_ms);
    }
    if cli.auto_retry {
        builder = builder.with_auto_retry(true);
    }
    if let Some(token) = &cli.token {
        builder = builder.with_id_token(token.as_str());
    }

    builder.build().map_err(CliError::from)
}
