//! Concurrent multi-source fetch orchestration.
//!
//! [`FetchOrchestrator`] fans out one task per configured source whenever an
//! entity is selected and folds each completion into an [`AggregateState`].
//!
//! Every selection bumps a [`FetchGeneration`]. A completion carries the
//! generation it was launched under and is applied only if that generation is
//! still current, so a slow response for a previously selected entity can
//! never overwrite the entity on screen.
//!
//! ```text
//! select(ABC) ──▶ gen 1: financials ─┐
//!                        overview   ─┼─▶ apply if gen == 1
//!                        metrics    ─┘
//! select(XYZ) ──▶ gen 2: ...           (gen 1 completions discarded)
//! ```
//!
//! Each transition is delivered exactly once, in application order, to every
//! subscriber and to the [`TransitionHook`]. The hook runs after the state
//! lock is released, so it may read [`FetchOrchestrator::snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::data_source::{SourceFetcher, SourceName, SourcePayload};
use crate::observe::{TracingHook, Transition, TransitionEvent, TransitionHook};
use crate::taxonomy::ErrorRecord;
use crate::{Entity, Symbol};

/// Monotonic counter stamped on every selection.
pub type FetchGeneration = u64;

/// Per-source outcome for the selected entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SourceResult<T> {
    Pending,
    Success(T),
    Failed(ErrorRecord),
}

impl<T> SourceResult<T> {
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> From<Result<T, ErrorRecord>> for SourceResult<T> {
    fn from(outcome: Result<T, ErrorRecord>) -> Self {
        match outcome {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failed(error),
        }
    }
}

/// Coarse lifecycle of the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No entity selected yet.
    Idle,
    /// At least one source of the current generation is pending.
    Loading,
    /// Every source of the current generation resolved, successfully or not.
    Loaded,
}

/// Aggregated per-source results for the current selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateState {
    pub generation: FetchGeneration,
    pub entity: Option<Entity>,
    pub results: HashMap<SourceName, SourceResult<SourcePayload>>,
}

impl AggregateState {
    pub fn phase(&self) -> Phase {
        if self.entity.is_none() {
            Phase::Idle
        } else if self.is_settled() {
            Phase::Loaded
        } else {
            Phase::Loading
        }
    }

    pub fn is_settled(&self) -> bool {
        self.results.values().all(|result| !result.is_pending())
    }

    pub fn result(&self, source: SourceName) -> Option<&SourceResult<SourcePayload>> {
        self.results.get(&source)
    }

    pub fn success_count(&self) -> usize {
        self.results.values().filter(|result| result.is_success()).count()
    }

    pub fn failed_sources(&self) -> Vec<SourceName> {
        self.sources_where(SourceResult::is_failed)
    }

    pub fn pending_sources(&self) -> Vec<SourceName> {
        self.sources_where(SourceResult::is_pending)
    }

    fn sources_where(&self, predicate: fn(&SourceResult<SourcePayload>) -> bool) -> Vec<SourceName> {
        let mut sources = self
            .results
            .iter()
            .filter(|(_, result)| predicate(result))
            .map(|(source, _)| *source)
            .collect::<Vec<_>>();
        sources.sort();
        sources
    }
}

/// Notification delivered to subscribers after each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub transition: Transition,
    pub source: Option<SourceName>,
    pub generation: FetchGeneration,
    pub snapshot: AggregateState,
}

struct Inner {
    state: AggregateState,
    subscribers: Vec<mpsc::UnboundedSender<StateChange>>,
}

struct Shared {
    inner: Mutex<Inner>,
    hook: Arc<dyn TransitionHook>,
    /// Taken before the state lock is released so hook calls keep application order.
    hook_order: Mutex<()>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a transition that has already been applied to `inner.state`,
    /// then release the state lock before the hook runs.
    fn commit(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        transition: Transition,
        source: Option<SourceName>,
        error: Option<ErrorRecord>,
    ) {
        let generation = inner.state.generation;
        let event = TransitionEvent {
            transition,
            generation,
            symbol: inner.state.entity.as_ref().map(|e| e.symbol().clone()),
            source,
            error,
        };

        let change = StateChange {
            transition,
            source,
            generation,
            snapshot: inner.state.clone(),
        };
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
        self.revision.send_modify(|revision| *revision += 1);

        self.run_hook(inner, &event);
    }

    fn run_hook(&self, inner: MutexGuard<'_, Inner>, event: &TransitionEvent) {
        let order = self.hook_order.lock().unwrap_or_else(PoisonError::into_inner);
        drop(inner);
        self.hook.on_transition(event);
        drop(order);
    }

    fn apply(
        &self,
        generation: FetchGeneration,
        symbol: &Symbol,
        source: SourceName,
        outcome: Result<SourcePayload, ErrorRecord>,
    ) {
        let mut inner = self.lock();

        let current = inner.state.generation == generation
            && inner
                .state
                .results
                .get(&source)
                .is_some_and(SourceResult::is_pending);
        if !current {
            let event = TransitionEvent {
                transition: Transition::Discarded,
                generation,
                symbol: Some(symbol.clone()),
                source: Some(source),
                error: outcome.err(),
            };
            self.run_hook(inner, &event);
            return;
        }

        let (transition, error) = match &outcome {
            Ok(_) => (Transition::Resolved, None),
            Err(error) => (Transition::Failed, Some(error.clone())),
        };
        inner.state.results.insert(source, SourceResult::from(outcome));
        self.commit(inner, transition, Some(source), error);
    }
}

/// Drives every configured source concurrently for the selected entity.
pub struct FetchOrchestrator {
    fetchers: BTreeMap<SourceName, Arc<dyn SourceFetcher>>,
    shared: Arc<Shared>,
}

impl FetchOrchestrator {
    /// One fetcher per source; a later fetcher replaces an earlier one for the same source.
    pub fn new(fetchers: Vec<Arc<dyn SourceFetcher>>) -> Self {
        Self::with_hook(fetchers, Arc::new(TracingHook))
    }

    pub fn with_hook(fetchers: Vec<Arc<dyn SourceFetcher>>, hook: Arc<dyn TransitionHook>) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.source(), fetcher))
            .collect();
        let (revision, _) = watch::channel(0);

        Self {
            fetchers,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: AggregateState::default(),
                    subscribers: Vec::new(),
                }),
                hook,
                hook_order: Mutex::new(()),
                revision,
            }),
        }
    }

    pub fn sources(&self) -> Vec<SourceName> {
        self.fetchers.keys().copied().collect()
    }

    /// Select `entity` and launch every source fetch.
    ///
    /// All sources are reset to pending, and subscribers are notified, before
    /// any fetch starts.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn select(&self, entity: Entity) -> FetchGeneration {
        let generation = {
            let mut inner = self.shared.lock();
            inner.state.generation += 1;
            inner.state.entity = Some(entity.clone());
            inner.state.results = self
                .fetchers
                .keys()
                .map(|source| (*source, SourceResult::Pending))
                .collect();
            let generation = inner.state.generation;
            self.shared.commit(inner, Transition::Selected, None, None);
            generation
        };

        for fetcher in self.fetchers.values() {
            self.launch(generation, entity.symbol().clone(), Arc::clone(fetcher));
        }

        generation
    }

    /// Re-run a failed source under the current generation.
    ///
    /// Returns `false` without side effects when nothing is selected, the
    /// source is unknown, or the source is not currently failed (a pending
    /// source still has an attempt outstanding).
    pub fn retry_source(&self, source: SourceName) -> bool {
        let generation = self.current_generation();
        self.retry_source_at(generation, source)
    }

    /// Like [`retry_source`](Self::retry_source), but only while `generation`
    /// is still current.
    pub fn retry_source_at(&self, generation: FetchGeneration, source: SourceName) -> bool {
        let Some(fetcher) = self.fetchers.get(&source) else {
            return false;
        };

        let symbol = {
            let mut inner = self.shared.lock();
            if inner.state.generation != generation {
                return false;
            }
            let Some(symbol) = inner.state.entity.as_ref().map(|e| e.symbol().clone()) else {
                return false;
            };
            if !inner
                .state
                .results
                .get(&source)
                .is_some_and(SourceResult::is_failed)
            {
                return false;
            }

            inner.state.results.insert(source, SourceResult::Pending);
            self.shared
                .commit(inner, Transition::RetryStarted, Some(source), None);
            symbol
        };

        self.launch(generation, symbol, Arc::clone(fetcher));
        true
    }

    /// Receive every subsequent transition.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StateChange> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.shared.lock().subscribers.push(sender);
        receiver
    }

    pub fn snapshot(&self) -> AggregateState {
        self.shared.lock().state.clone()
    }

    pub fn current_generation(&self) -> FetchGeneration {
        self.shared.lock().state.generation
    }

    pub fn current_entity(&self) -> Option<Entity> {
        self.shared.lock().state.entity.clone()
    }

    /// Wait until no source of the current generation is pending.
    ///
    /// A re-selection while waiting extends the wait to the new generation.
    pub async fn settled(&self) -> AggregateState {
        let mut revisions = self.shared.revision.subscribe();
        loop {
            let snapshot = self.snapshot();
            if snapshot.is_settled() {
                return snapshot;
            }
            if revisions.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    fn launch(&self, generation: FetchGeneration, symbol: Symbol, fetcher: Arc<dyn SourceFetcher>) {
        let shared = Arc::clone(&self.shared);
        let source = fetcher.source();

        tokio::spawn(async move {
            let fetch_symbol = symbol.clone();
            let attempt =
                tokio::spawn(async move { fetcher.fetch(&fetch_symbol).await });
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(ErrorRecord::unknown(format!(
                    "{source} fetch aborted: {join_error}"
                ))),
            };
            shared.apply(generation, &symbol, source, outcome);
        });
    }
}
