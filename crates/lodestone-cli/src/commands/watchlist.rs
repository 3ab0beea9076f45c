use serde::Serialize;

use lodestone_core::{SelectionSession, Symbol, WatchlistError, WatchlistItem};

use crate::cli::{WatchlistArgs, WatchlistCommand};
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct WatchlistResponseData {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<Symbol>,
    items: Vec<WatchlistItem>,
}

pub async fn run(args: &WatchlistArgs, session: &SelectionSession) -> Result<CommandResult, CliError> {
    if session.signed_in_user().is_none() {
        return Err(WatchlistError::Unauthenticated.into());
    }
    let watchlist = session.watchlist();
    watchlist.sync_session().await;

    let (action, symbol) = match &args.command {
        WatchlistCommand::List => ("list", None),
        WatchlistCommand::Add(add) => {
            let symbol = Symbol::parse(&add.symbol)?;
            watchlist.add(&symbol, add.name.trim()).await?;
            ("add", Some(symbol))
        }
        WatchlistCommand::Remove(remove) => {
            let symbol = Symbol::parse(&remove.symbol)?;
            let listed = watchlist.contains(&symbol);
            watchlist.remove(&symbol).await?;
            (if listed { "remove" } else { "remove_skipped" }, Some(symbol))
        }
    };

    let data = serde_json::to_value(WatchlistResponseData {
        action,
        symbol,
        items: watchlist.items(),
    })?;
    Ok(CommandResult::ok("watchlist", data))
}
