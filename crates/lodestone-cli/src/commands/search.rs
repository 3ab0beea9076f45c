use serde::Serialize;

use lodestone_core::{SearchHit, SelectionSession};

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SearchResponseData {
    query: String,
    results: Vec<SearchHit>,
}

pub async fn run(args: &SearchArgs, session: &SelectionSession) -> Result<CommandResult, CliError> {
    let query = args.query.trim();
    let results = session.search(query).await;

    let mut result = CommandResult::ok(
        "search",
        serde_json::to_value(SearchResponseData {
            query: query.to_owned(),
            results,
        })?,
    );
    if query.chars().count() < 2 {
        result = result.with_warning("queries shorter than two characters are not searched");
    }
    Ok(result)
}
