//! Top-level dashboard state: the selected entity, its aggregated source
//! results, per-source retries, and the watchlist.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::auth::SessionProvider;
use crate::config::DashboardConfig;
use crate::data_source::{ApiSourceFetcher, SourceFetcher, SourceName};
use crate::http_client::HttpClient;
use crate::observe::Transition;
use crate::orchestrator::{AggregateState, FetchGeneration, FetchOrchestrator, Phase, StateChange};
use crate::retry::{RetryController, RetryPolicy, RetryState};
use crate::watchlist::{WatchlistError, WatchlistStore, WatchlistSync};
use crate::{Entity, SearchHit, ValidationError};

const MIN_SEARCH_LEN: usize = 2;

/// Outcome of [`SelectionSession::toggle_watchlist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchlistToggle {
    Added,
    Removed,
}

/// One dashboard session.
///
/// Owns the orchestrator, retry controller, and watchlist for a single user.
/// Must be created and used from within a Tokio runtime.
pub struct SelectionSession {
    api: Arc<ApiClient>,
    orchestrator: Arc<FetchOrchestrator>,
    retry: Arc<RetryController>,
    watchlist: WatchlistSync,
    sessions: Arc<dyn SessionProvider>,
    policy: RetryPolicy,
    auto_retry_task: Option<JoinHandle<()>>,
}

impl SelectionSession {
    /// Session fetching every source through the dashboard API.
    pub fn new(
        config: &DashboardConfig,
        http: &Arc<dyn HttpClient>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        let api = Arc::new(ApiClient::new(Arc::clone(http), Arc::clone(&sessions), config));
        let fetchers = ApiSourceFetcher::for_sources(&SourceName::ALL, &api);
        let store: Arc<dyn WatchlistStore> = api.clone();

        Self::from_parts(api, fetchers, store, sessions, config.retry().clone())
    }

    /// Session with explicit fetchers and watchlist store.
    pub fn from_parts(
        api: Arc<ApiClient>,
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        store: Arc<dyn WatchlistStore>,
        sessions: Arc<dyn SessionProvider>,
        policy: RetryPolicy,
    ) -> Self {
        let orchestrator = Arc::new(FetchOrchestrator::new(fetchers));
        Self::with_orchestrator(api, orchestrator, store, sessions, policy)
    }

    /// Session around a prepared orchestrator, e.g. one with a custom hook.
    pub fn with_orchestrator(
        api: Arc<ApiClient>,
        orchestrator: Arc<FetchOrchestrator>,
        store: Arc<dyn WatchlistStore>,
        sessions: Arc<dyn SessionProvider>,
        policy: RetryPolicy,
    ) -> Self {
        let retry = Arc::new(RetryController::new(Arc::clone(&orchestrator), policy.backoff));
        let auto_retry_task = policy.auto_retry.then(|| {
            tokio::spawn(auto_retry(
                orchestrator.subscribe(),
                Arc::clone(&retry),
                policy.clone(),
            ))
        });

        Self {
            api,
            orchestrator,
            retry,
            watchlist: WatchlistSync::new(store, Arc::clone(&sessions)),
            sessions,
            policy,
            auto_retry_task,
        }
    }

    pub fn select(&self, entity: Entity) -> FetchGeneration {
        let generation = self.orchestrator.select(entity);
        self.retry.reset_for(generation);
        generation
    }

    pub fn select_hit(&self, hit: SearchHit) -> Result<FetchGeneration, ValidationError> {
        let entity = Entity::try_from(hit)?;
        Ok(self.select(entity))
    }

    pub fn selected(&self) -> Option<Entity> {
        self.orchestrator.current_entity()
    }

    pub fn phase(&self) -> Phase {
        self.orchestrator.snapshot().phase()
    }

    pub fn snapshot(&self) -> AggregateState {
        self.orchestrator.snapshot()
    }

    pub async fn settled(&self) -> AggregateState {
        self.orchestrator.settled().await
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StateChange> {
        self.orchestrator.subscribe()
    }

    /// Retry `source` after its backoff delay.
    pub fn retry(&self, source: SourceName) -> Option<Duration> {
        self.retry.schedule_retry(source)
    }

    pub fn retry_now(&self, source: SourceName) -> bool {
        self.retry.retry_now(source)
    }

    pub fn retry_state(&self, source: SourceName) -> Option<RetryState> {
        self.retry.state(source)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Typeahead search; queries shorter than two characters are not sent.
    pub async fn search(&self, query: &str) -> Vec<SearchHit> {
        if query.trim().chars().count() < MIN_SEARCH_LEN {
            return Vec::new();
        }
        self.api.search_entities(query).await
    }

    pub fn watchlist(&self) -> &WatchlistSync {
        &self.watchlist
    }

    /// Add the selected entity to the watchlist, or remove it if already listed.
    pub async fn toggle_watchlist(&self) -> Result<WatchlistToggle, WatchlistError> {
        let entity = self.selected().ok_or(WatchlistError::NoSelection)?;

        if self.watchlist.contains(entity.symbol()) {
            self.watchlist.remove(entity.symbol()).await?;
            Ok(WatchlistToggle::Removed)
        } else {
            self.watchlist.add(entity.symbol(), entity.name()).await?;
            Ok(WatchlistToggle::Added)
        }
    }

    pub fn signed_in_user(&self) -> Option<String> {
        self.sessions
            .current_session()
            .map(|session| session.user().to_owned())
    }

    pub async fn sign_out(&self) {
        self.sessions.sign_out();
        self.watchlist.sync_session().await;
        info!("signed out");
    }
}

impl Drop for SelectionSession {
    fn drop(&mut self) {
        if let Some(task) = self.auto_retry_task.take() {
            task.abort();
        }
        self.retry.cancel_all();
    }
}

async fn auto_retry(
    mut changes: mpsc::UnboundedReceiver<StateChange>,
    retry: Arc<RetryController>,
    policy: RetryPolicy,
) {
    while let Some(change) = changes.recv().await {
        if change.transition != Transition::Failed {
            continue;
        }
        let Some(source) = change.source else {
            continue;
        };
        let Some(error) = change.snapshot.result(source).and_then(|result| result.error()) else {
            continue;
        };

        let attempts = retry
            .state(source)
            .map(|state| state.attempt_count)
            .unwrap_or(0);
        if !policy.should_auto_retry(error, attempts) {
            debug!(source = source.as_str(), attempts, "automatic retry not applicable");
            continue;
        }
        retry.schedule_retry_at(change.generation, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemorySessionProvider;
    use crate::http_client::{FixtureHttpClient, HttpMethod};
    use crate::Symbol;

    fn session(http: &FixtureHttpClient) -> SelectionSession {
        let config = DashboardConfig::builder()
            .with_api_base_url("https://api.example.test")
            .build()
            .expect("valid config");
        let http: Arc<dyn HttpClient> = Arc::new(http.clone());
        SelectionSession::new(&config, &http, Arc::new(InMemorySessionProvider::new()))
    }

    #[tokio::test]
    async fn short_queries_are_not_sent() {
        let http = FixtureHttpClient::new();
        let session = session(&http);

        assert!(session.search("").await.is_empty());
        assert!(session.search(" a ").await.is_empty());
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn phase_moves_from_idle_to_loaded() {
        let http = FixtureHttpClient::new()
            .with_json(HttpMethod::Get, "/metrics/ABC", "{}")
            .with_json(HttpMethod::Get, "/financials?symbol=ABC", "{}")
            .with_json(HttpMethod::Get, "/overview?symbol=ABC", "{}")
            .with_json(HttpMethod::Get, "/news?symbol=ABC", "[]");
        let session = session(&http);
        assert_eq!(session.phase(), Phase::Idle);

        let entity = Entity::new(Symbol::parse("ABC").expect("valid"), "Abc Mining", "TSXV", None)
            .expect("valid entity");
        session.select(entity);
        assert_eq!(session.phase(), Phase::Loading);

        let state = session.settled().await;
        assert_eq!(state.phase(), Phase::Loaded);
        assert_eq!(state.success_count(), 4);
    }

    #[tokio::test]
    async fn toggle_without_selection_is_rejected() {
        let session = session(&FixtureHttpClient::new());

        assert_eq!(
            session.toggle_watchlist().await,
            Err(WatchlistError::NoSelection)
        );
    }
}
