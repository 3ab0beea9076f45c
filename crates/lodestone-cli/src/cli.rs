//! CLI argument definitions for Lodestone.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search` | Typeahead symbol search |
//! | `show` | Fetch every source for one stock, retrying failed ones |
//! | `watchlist` | List, add, or remove watchlist entries |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--api-url` | env | Dashboard API base URL |
//! | `--timeout-ms` | env or `10000` | Request timeout in ms |
//! | `--mock` | `false` | Serve demo data from an in-process fixture |
//! | `--auto-retry` | env or `false` | Retry transient failures automatically |
//! | `--token` | env | Identity token for watchlist calls |
//!
//! # Examples
//!
//! ```bash
//! lodestone --mock search abc
//! lodestone --mock show ABC --retries 2 --format table
//! lodestone --token "$ID_TOKEN" watchlist add ABC "Abc Mining"
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Lodestone - stock dashboard data from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "lodestone",
    author,
    version,
    about = "Stock dashboard data with per-source failure recovery"
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Dashboard API base URL (overrides LODESTONE_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Request timeout in milliseconds (overrides LODESTONE_TIMEOUT_MS).
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Use built-in demo data instead of the network.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Retry network and transient server failures automatically.
    #[arg(long, global = true, default_value_t = false)]
    pub auto_retry: bool,

    /// Identity token for authenticated calls (overrides LODESTONE_ID_TOKEN).
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text for terminal display.
    Table,
    /// Single JSON object output.
    Json,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for symbols by ticker or company name.
    ///
    /// # Examples
    ///
    ///   lodestone search abc
    ///   lodestone search "gold corp" --pretty
    Search(SearchArgs),

    /// Fetch financials, overview, metrics, and news for one symbol.
    ///
    /// Sources that fail are reported individually; the others are still
    /// shown. Exits with code 6 when any source is still failed.
    ///
    /// # Examples
    ///
    ///   lodestone show ABC
    ///   lodestone show ABC --retries 3
    Show(ShowArgs),

    /// Manage the signed-in user's watchlist.
    Watchlist(WatchlistArgs),
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-form search query (symbol or company name).
    pub query: String,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Symbol to show.
    pub symbol: String,

    /// Retry rounds for failed sources, each after its backoff delay.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

#[derive(Debug, Args)]
pub struct WatchlistArgs {
    #[command(subcommand)]
    pub command: WatchlistCommand,
}

#[derive(Debug, Subcommand)]
pub enum WatchlistCommand {
    /// List watchlist entries.
    List,
    /// Add a symbol.
    Add(WatchlistAddArgs),
    /// Remove a symbol.
    Remove(WatchlistRemoveArgs),
}

#[derive(Debug, Args)]
pub struct WatchlistAddArgs {
    pub symbol: String,
    /// Display name stored with the entry.
    pub name: String,
}

#[derive(Debug, Args)]
pub struct WatchlistRemoveArgs {
    pub symbol: String,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "lodestone", "show", "ABC", "--retries", "2", "--mock", "--format", "table",
        ])
        .expect("valid arguments");

        assert!(cli.mock);
        assert_eq!(cli.format, OutputFormat::Table);
        match cli.command {
            Command::Show(args) => {
                assert_eq!(args.symbol, "ABC");
                assert_eq!(args.retries, 2);
            }
            other => panic!("expected show, got {other:?}"),
        }
    }

    #[test]
    fn watchlist_add_requires_a_name() {
        let result = Cli::try_parse_from(["lodestone", "watchlist", "add", "ABC"]);
        assert!(result.is_err());
    }

    #[test]
    fn defaults_are_json_without_auto_retry() {
        let cli = Cli::try_parse_from(["lodestone", "search", "abc"]).expect("valid arguments");

        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.pretty);
        assert!(!cli.auto_retry);
        assert!(cli.token.is_none());
    }
}
