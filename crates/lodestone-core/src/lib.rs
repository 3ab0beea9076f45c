//! # Lodestone Core
//!
//! Fetch orchestration and partial-failure recovery for the stock dashboard.
//!
//! ## Overview
//!
//! Selecting a stock fans out to several independent data sources. Each source
//! resolves on its own: one failing source leaves the others usable, a failed
//! source can be retried alone, and results for a stock that is no longer
//! selected are dropped.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Typed client for the dashboard backend |
//! | [`auth`] | Session boundary (`SessionProvider`) |
//! | [`config`] | `DashboardConfig` built from the environment or a builder |
//! | [`data_source`] | `SourceFetcher` contract and API-backed fetchers |
//! | [`domain`] | Domain models (Entity, Financials, Metrics, News, ...) |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`observe`] | Transition hook for logging and metrics |
//! | [`orchestrator`] | Concurrent per-source fetches with generation checks |
//! | [`retry`] | Backoff and per-source retry scheduling |
//! | [`selection`] | `SelectionSession`, the top-level state holder |
//! | [`taxonomy`] | Classification of failed remote calls |
//! | [`watchlist`] | Confirm-then-commit watchlist sync |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lodestone_core::{
//!     DashboardConfig, Entity, HttpClient, InMemorySessionProvider, ReqwestHttpClient,
//!     SelectionSession, SourceName, Symbol,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DashboardConfig::from_env()?;
//!     let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
//!     let session = SelectionSession::new(&config, &http, Arc::new(InMemorySessionProvider::new()));
//!
//!     session.select(Entity::new(Symbol::parse("ABC")?, "Abc Mining", "TSXV", None)?);
//!     let state = session.settled().await;
//!
//!     for source in state.failed_sources() {
//!         session.retry(source);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ SelectionSession │──────────────┐
//! └────────┬─────────┘              │
//!          │ select / retry         ▼
//!          ▼                 ┌──────────────────┐
//! ┌──────────────────┐       │  WatchlistSync   │
//! │ FetchOrchestrator│◀──┐   └────────┬─────────┘
//! └────────┬─────────┘   │            │
//!          │ spawn       │ retry_at   │
//!          ▼             │            ▼
//! ┌──────────────────┐ ┌─┴────────────────┐
//! │ SourceFetcher x4 │ │ RetryController  │
//! └────────┬─────────┘ └──────────────────┘
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │    ApiClient     │────▶│   HttpClient     │
//! └──────────────────┘     │ (reqwest/fixture)│
//!                          └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Per-source failures never escape the orchestrator; they are stored as
//! classified [`ErrorRecord`]s:
//!
//! ```rust
//! use lodestone_core::{ErrorKind, ErrorRecord};
//!
//! fn describe(error: &ErrorRecord) -> &'static str {
//!     match error.kind() {
//!         ErrorKind::NetworkError => "offline?",
//!         ErrorKind::ServerError { status } if status >= 500 => "try again later",
//!         ErrorKind::Unauthenticated => "sign in",
//!         _ => "request failed",
//!     }
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod observe;
pub mod orchestrator;
pub mod retry;
pub mod selection;
pub mod taxonomy;
pub mod watchlist;

// API client
pub use api::ApiClient;

// Sessions
pub use auth::{InMemorySessionProvider, Session, SessionProvider};

// Configuration
pub use config::{DashboardConfig, DashboardConfigBuilder};

// Source fetchers
pub use data_source::{ApiSourceFetcher, FetchFuture, SourceFetcher, SourceName, SourcePayload};

// Domain models
pub use domain::{
    BalanceSheetReport, Entity, Financials, IncomeStatementReport, MetricsRecord, NewsItem,
    OverviewRecord, SearchHit, Symbol, WatchlistItem,
};

// Error types
pub use error::{ConfigError, ValidationError};

// HTTP client types
pub use http_client::{
    FixtureHttpClient, FixtureOutcome, HttpAuth, HttpClient, HttpError, HttpFailureStage, HttpMethod, HttpRequest,
    HttpResponse, ReqwestHttpClient,
};

// Observability
pub use observe::{TracingHook, Transition, TransitionEvent, TransitionHook};

// Orchestration
pub use orchestrator::{
    AggregateState, FetchGeneration, FetchOrchestrator, Phase, SourceResult, StateChange,
};

// Retry logic
pub use retry::{Backoff, RetryController, RetryPolicy, RetryState};

// Selection
pub use selection::{SelectionSession, WatchlistToggle};

// Error taxonomy
pub use taxonomy::{classify, ErrorKind, ErrorRecord, RawFailure, RequestInfo};

// Watchlist
pub use watchlist::{StoreFuture, WatchlistError, WatchlistState, WatchlistStore, WatchlistSync};
