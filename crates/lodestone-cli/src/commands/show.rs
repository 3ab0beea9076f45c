use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use lodestone_core::{
    AggregateState, Entity, Financials, Phase, RetryState, SelectionSession, SourceName,
    SourcePayload, SourceResult, StateChange, Symbol, Transition,
};

use crate::cli::ShowArgs;
use crate::error::CliError;

use super::CommandResult;

const RECENT_QUARTERS: usize = 4;

#[derive(Debug, Serialize)]
struct ShowResponseData {
    entity: Option<Entity>,
    generation: u64,
    phase: Phase,
    sources: BTreeMap<SourceName, Value>,
    retries: BTreeMap<SourceName, RetryState>,
}

pub async fn run(args: &ShowArgs, session: &SelectionSession) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let entity = resolve_entity(session, &symbol).await?;

    session.select(entity);
    let state = settle_with_retries(session, args.retries).await;

    let mut warnings = Vec::new();
    let mut sources = BTreeMap::new();
    let mut retries = BTreeMap::new();
    for source in SourceName::ALL {
        let Some(result) = state.result(source) else {
            continue;
        };
        sources.insert(source, source_value(result)?);
        if let Some(error) = result.error() {
            warnings.push(format!("{source}: {}", error.display_message()));
            if let Some(hint) = error.provider_hint() {
                warnings.push(format!("{source}: {hint}"));
            }
        }
        if let Some(retry) = session.retry_state(source) {
            retries.insert(source, retry);
        }
    }

    let data = serde_json::to_value(ShowResponseData {
        entity: state.entity.clone(),
        generation: state.generation,
        phase: state.phase(),
        sources,
        retries,
    })?;

    Ok(CommandResult::ok("show", data)
        .with_warnings(warnings)
        .with_failed_sources(state.failed_sources()))
}

/// Name the entity from search results; fall back to the bare symbol.
async fn resolve_entity(session: &SelectionSession, symbol: &Symbol) -> Result<Entity, CliError> {
    let hit = session
        .search(symbol.as_str())
        .await
        .into_iter()
        .find(|hit| &hit.symbol == symbol);

    let entity = match hit {
        Some(hit) => Entity::try_from(hit)?,
        None => Entity::new(symbol.clone(), symbol.as_str(), "", None)?,
    };
    Ok(entity)
}

/// Wait for the selection to settle, then run up to `rounds` backoff-delayed
/// retry rounds over the failed sources. Failures the session will retry on
/// its own are waited for as well, even before its retry is scheduled.
async fn settle_with_retries(session: &SelectionSession, rounds: u32) -> AggregateState {
    let policy = session.retry_policy().clone();
    let mut round = 0;

    loop {
        let mut changes = session.subscribe();
        let state = session.settled().await;
        let failed = state.failed_sources();
        if failed.is_empty() {
            return state;
        }

        let manual = round < rounds;
        let mut waiting = Vec::new();
        let mut scheduled_any = false;
        for source in failed {
            let retry = session.retry_state(source);
            let attempts = retry.map_or(0, |retry| retry.attempt_count);
            let automatic = state
                .result(source)
                .and_then(SourceResult::error)
                .is_some_and(|error| policy.should_auto_retry(error, attempts));
            let scheduled = manual && !automatic && session.retry(source).is_some();
            let in_flight = session
                .retry_state(source)
                .is_some_and(|retry| retry.is_retrying);
            scheduled_any |= scheduled;
            if scheduled || in_flight || automatic {
                waiting.push(source);
            }
        }
        if waiting.is_empty() {
            return state;
        }
        if scheduled_any {
            round += 1;
            info!(round, sources = waiting.len(), "retry round scheduled");
        }

        wait_for_retry_start(&mut changes, waiting).await;
    }
}

async fn wait_for_retry_start(
    changes: &mut UnboundedReceiver<StateChange>,
    mut waiting: Vec<SourceName>,
) {
    while !waiting.is_empty() {
        match changes.recv().await {
            Some(change) if change.transition == Transition::RetryStarted => {
                waiting.retain(|source| Some(*source) != change.source);
            }
            Some(_) => {}
            None => break,
        }
    }
}

fn source_value(result: &SourceResult<SourcePayload>) -> Result<Value, CliError> {
    Ok(match result {
        SourceResult::Pending => json!({ "status": "pending" }),
        SourceResult::Success(SourcePayload::Financials(financials)) => json!({
            "status": "success",
            "data": financials,
            "recent": recent_quarters(financials),
        }),
        SourceResult::Success(payload) => {
            let mut tagged = serde_json::to_value(payload)?;
            let data = tagged.get_mut("data").map_or(Value::Null, Value::take);
            json!({ "status": "success", "data": data })
        }
        SourceResult::Failed(error) => json!({
            "status": "failed",
            "error": error,
            "message": error.display_message(),
        }),
    })
}

/// Last four quarters, oldest first, as shown on the financials panel.
fn recent_quarters(financials: &Financials) -> Value {
    let income = financials
        .recent_income(RECENT_QUARTERS)
        .into_iter()
        .map(|(period, report)| {
            json!({
                "period": period,
                "total_revenue": report.total_revenue,
                "net_income": report.net_income,
            })
        })
        .collect::<Vec<_>>();
    let balance = financials
        .recent_balance(RECENT_QUARTERS)
        .into_iter()
        .map(|(period, report)| {
            json!({
                "period": period,
                "total_assets": report.total_assets,
                "total_liabilities": report.total_liabilities,
            })
        })
        .collect::<Vec<_>>();

    json!({ "income": income, "balance": balance })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lodestone_core::{DashboardConfig, HttpClient, InMemorySessionProvider, SessionProvider};

    use super::*;
    use crate::mock;

    fn mock_session(auto_retry: bool) -> SelectionSession {
        let config = DashboardConfig::builder()
            .with_api_base_url(mock::MOCK_API_URL)
            .with_auto_retry(auto_retry)
            .build()
            .expect("valid config");
        let http: Arc<dyn HttpClient> = Arc::new(mock::fixture_client());
        let sessions: Arc<dyn SessionProvider> = Arc::new(InMemorySessionProvider::new());
        SelectionSession::new(&config, &http, sessions)
    }

    fn abc() -> Entity {
        Entity::new(Symbol::parse("ABC").expect("valid"), "Abc Mining Corp", "TSXV", None)
            .expect("valid entity")
    }

    #[tokio::test(start_paused = true)]
    async fn auto_retry_recovery_is_waited_for_without_manual_rounds() {
        let session = mock_session(true);
        session.select(abc());

        let state = settle_with_retries(&session, 0).await;

        assert!(state.failed_sources().is_empty());
        assert_eq!(
            session
                .retry_state(SourceName::Financials)
                .map(|retry| retry.attempt_count),
            Some(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn without_rounds_or_auto_retry_the_failure_is_reported() {
        let session = mock_session(false);
        session.select(abc());

        let state = settle_with_retries(&session, 0).await;

        assert_eq!(state.failed_sources(), vec![SourceName::Financials]);
    }

    #[tokio::test(start_paused = true)]
    async fn one_manual_round_recovers_and_summarizes_recent_quarters() {
        let session = mock_session(false);
        session.select(abc());

        let state = settle_with_retries(&session, 1).await;
        let financials = state
            .result(SourceName::Financials)
            .expect("financials configured");
        let value = source_value(financials).expect("serializable");

        assert_eq!(value["status"], "success");
        assert_eq!(value["recent"]["income"][0]["period"], "Q1 2026");
        assert_eq!(value["recent"]["income"][1]["period"], "Q2 2026");
        assert_eq!(value["recent"]["balance"][0]["total_assets"], 310_000_000.0);
    }
}
