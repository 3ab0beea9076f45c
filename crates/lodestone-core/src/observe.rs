//! Observability hook for orchestrator state transitions.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data_source::SourceName;
use crate::orchestrator::FetchGeneration;
use crate::taxonomy::ErrorRecord;
use crate::Symbol;

/// Kind of state transition applied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// A new entity was selected and every source reset to pending.
    Selected,
    /// A source moved from pending to success.
    Resolved,
    /// A source moved from pending to failed.
    Failed,
    /// A failed source moved back to pending for a retry.
    RetryStarted,
    /// A result arrived for a superseded generation and was dropped.
    Discarded,
}

/// Description of one transition handed to a [`TransitionHook`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub transition: Transition,
    /// Generation the transition belongs to (for `Discarded`, the stale one).
    pub generation: FetchGeneration,
    pub symbol: Option<Symbol>,
    pub source: Option<SourceName>,
    pub error: Option<ErrorRecord>,
}

/// Called once per transition, in application order, after the orchestrator
/// state lock has been released.
///
/// Implementations may read the orchestrator's snapshot but must not select
/// or retry from inside the hook.
pub trait TransitionHook: Send + Sync {
    fn on_transition(&self, event: &TransitionEvent);
}

/// Default hook: one `tracing` event per transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl TransitionHook for TracingHook {
    fn on_transition(&self, event: &TransitionEvent) {
        let symbol = event.symbol.as_ref().map(Symbol::as_str).unwrap_or("-");
        let source = event.source.map(SourceName::as_str).unwrap_or("-");

        match event.transition {
            Transition::Selected => {
                info!(generation = event.generation, symbol, "entity selected")
            }
            Transition::Resolved => {
                info!(generation = event.generation, symbol, source, "source resolved")
            }
            Transition::Failed => {
                let kind = event.error.as_ref().map(|e| e.kind().code()).unwrap_or("unknown");
                let message = event.error.as_ref().map(ErrorRecord::display_message).unwrap_or("");
                warn!(generation = event.generation, symbol, source, kind, message, "source failed")
            }
            Transition::RetryStarted => {
                info!(generation = event.generation, symbol, source, "source retry started")
            }
            Transition::Discarded => {
                debug!(generation = event.generation, symbol, source, "stale result discarded")
            }
        }
    }
}

impl<F> TransitionHook for F
where
    F: Fn(&TransitionEvent) + Send + Sync,
{
    fn on_transition(&self, event: &TransitionEvent) {
        self(event)
    }
}
