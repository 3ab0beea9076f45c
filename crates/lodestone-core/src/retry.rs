//! Per-source retry scheduling with exponential backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::data_source::SourceName;
use crate::orchestrator::{FetchGeneration, FetchOrchestrator};
use crate::taxonomy::{ErrorKind, ErrorRecord};

/// Backoff strategy for retrying failed sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`, capped at `max`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

const DEFAULT_BASE: Duration = Duration::from_millis(1_000);
const DEFAULT_MAX: Duration = Duration::from_secs(5 * 60);

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_BASE)
    }
}

impl Backoff {
    /// Doubling backoff from `base`, capped at five minutes, without jitter.
    pub const fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max: DEFAULT_MAX,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let jitter_ms = millis / 2;
                    let offset = fastrand::u64(0..=jitter_ms.saturating_mul(2));
                    delay = Duration::from_millis((millis - jitter_ms).saturating_add(offset));
                }

                delay
            }
        }
    }
}

/// Retry settings for a dashboard session.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// The backoff strategy between retries of one source.
    pub backoff: Backoff,
    /// Schedule retries automatically when a source fails.
    pub auto_retry: bool,
    /// Upper bound on automatic retries per source and selection.
    pub max_auto_retries: u32,
    /// Server statuses worth retrying automatically.
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            auto_retry: false,
            max_auto_retries: 4,
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Whether a failure should be retried without user action, given the
    /// number of attempts already made for that source.
    pub fn should_auto_retry(&self, error: &ErrorRecord, attempts: u32) -> bool {
        if !self.auto_retry || attempts >= self.max_auto_retries {
            return false;
        }
        match error.kind() {
            ErrorKind::NetworkError => true,
            ErrorKind::ServerError { status } => self.should_retry_status(status),
            ErrorKind::RequestSetupError | ErrorKind::Unauthenticated | ErrorKind::Unknown => false,
        }
    }
}

/// Retry bookkeeping for one source of the selected entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RetryState {
    pub attempt_count: u32,
    /// A scheduled retry is waiting on its timer.
    pub is_retrying: bool,
    pub next_delay_ms: u64,
}

struct Timer {
    ticket: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RetryInner {
    generation: FetchGeneration,
    states: HashMap<SourceName, RetryState>,
    timers: HashMap<SourceName, Timer>,
    next_ticket: u64,
}

impl RetryInner {
    /// Drop every state and timer when the orchestrator has moved on.
    fn sync_generation(&mut self, generation: FetchGeneration) {
        if self.generation != generation {
            self.clear();
            self.generation = generation;
        }
    }

    fn clear(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        self.states.clear();
    }
}

/// Schedules single-source re-fetches against a [`FetchOrchestrator`].
///
/// Retry state is scoped to one generation; selecting a new entity discards
/// it. Must be used from within a Tokio runtime.
pub struct RetryController {
    orchestrator: Arc<FetchOrchestrator>,
    backoff: Backoff,
    inner: Arc<Mutex<RetryInner>>,
}

impl RetryController {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, backoff: Backoff) -> Self {
        Self {
            orchestrator,
            backoff,
            inner: Arc::new(Mutex::new(RetryInner::default())),
        }
    }

    /// Schedule a retry of `source` for the current generation.
    pub fn schedule_retry(&self, source: SourceName) -> Option<Duration> {
        let generation = self.orchestrator.current_generation();
        self.schedule_retry_at(generation, source)
    }

    /// Schedule a retry of `source` after the backoff delay for its attempt
    /// count. Returns `None` when a retry is already in flight for it, when
    /// `generation` has been superseded, or when the source is not failed.
    pub fn schedule_retry_at(
        &self,
        generation: FetchGeneration,
        source: SourceName,
    ) -> Option<Duration> {
        let mut inner = self.lock();
        let snapshot = self.orchestrator.snapshot();
        let retryable = snapshot.entity.is_some()
            && snapshot
                .result(source)
                .is_some_and(|result| result.is_failed());
        if generation != snapshot.generation || generation < inner.generation || !retryable {
            debug!(generation, source = source.as_str(), "retry not scheduled");
            return None;
        }
        inner.sync_generation(generation);

        let state = inner.states.entry(source).or_default();
        if state.is_retrying {
            return None;
        }

        let delay = self.backoff.delay(state.attempt_count);
        state.attempt_count += 1;
        state.is_retrying = true;
        state.next_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let attempt = state.attempt_count;

        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        let handle = tokio::spawn(fire_after(
            delay,
            ticket,
            generation,
            source,
            Arc::clone(&self.inner),
            Arc::clone(&self.orchestrator),
        ));
        inner.timers.insert(source, Timer { ticket, handle });

        info!(
            generation,
            source = source.as_str(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        Some(delay)
    }

    /// Retry `source` immediately, cancelling any scheduled retry for it.
    ///
    /// Returns whether the orchestrator accepted the retry.
    pub fn retry_now(&self, source: SourceName) -> bool {
        let mut inner = self.lock();
        let generation = self.orchestrator.current_generation();
        inner.sync_generation(generation);

        if let Some(timer) = inner.timers.remove(&source) {
            timer.handle.abort();
        }
        if let Some(state) = inner.states.get_mut(&source) {
            state.is_retrying = false;
        }

        let accepted = self.orchestrator.retry_source_at(generation, source);
        if accepted {
            let state = inner.states.entry(source).or_default();
            state.attempt_count += 1;
            state.next_delay_ms = 0;
        }
        accepted
    }

    /// Abort a scheduled retry of `source`; the attempt count is kept.
    pub fn cancel_pending(&self, source: SourceName) {
        let mut inner = self.lock();
        if let Some(timer) = inner.timers.remove(&source) {
            timer.handle.abort();
            debug!(source = source.as_str(), "scheduled retry cancelled");
        }
        if let Some(state) = inner.states.get_mut(&source) {
            state.is_retrying = false;
        }
    }

    /// Scope the controller to `generation`, forgetting every retry state and
    /// timer of earlier generations.
    pub fn reset_for(&self, generation: FetchGeneration) {
        let mut inner = self.lock();
        if generation > inner.generation {
            inner.sync_generation(generation);
        }
    }

    pub fn cancel_all(&self) {
        self.lock().clear();
    }

    /// Retry state of `source` for the current generation, if any retry happened.
    pub fn state(&self, source: SourceName) -> Option<RetryState> {
        let inner = self.lock();
        if inner.generation != self.orchestrator.current_generation() {
            return None;
        }
        inner.states.get(&source).copied()
    }

    fn lock(&self) -> MutexGuard<'_, RetryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RetryController {
    fn drop(&mut self) {
        self.lock().clear();
    }
}

async fn fire_after(
    delay: Duration,
    ticket: u64,
    generation: FetchGeneration,
    source: SourceName,
    inner: Arc<Mutex<RetryInner>>,
    orchestrator: Arc<FetchOrchestrator>,
) {
    tokio::time::sleep(delay).await;

    let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
    let owned = guard.generation == generation
        && guard
            .timers
            .get(&source)
            .is_some_and(|timer| timer.ticket == ticket);
    if !owned {
        return;
    }
    guard.timers.remove(&source);
    if let Some(state) = guard.states.get_mut(&source) {
        state.is_retrying = false;
    }

    if !orchestrator.retry_source_at(generation, source) {
        debug!(generation, source = source.as_str(), "scheduled retry no longer applicable");
    }
}
