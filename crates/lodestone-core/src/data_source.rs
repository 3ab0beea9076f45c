//! Source fetcher contract.
//!
//! Each independently fetchable fragment about an entity (financials,
//! overview, metrics, news) sits behind [`SourceFetcher`]. The orchestrator
//! only ever sees this trait, so tests can substitute scripted fetchers.
//!
//! # Sources
//!
//! | Source | Payload | Backed by |
//! |--------|---------|-----------|
//! | [`SourceName::Financials`] | [`Financials`] | [`ApiClient::get_financials`] |
//! | [`SourceName::Overview`] | [`OverviewRecord`] | [`ApiClient::get_overview`] |
//! | [`SourceName::Metrics`] | [`MetricsRecord`] | [`ApiClient::get_metrics`] |
//! | [`SourceName::News`] | `Vec<NewsItem>` | [`ApiClient::get_news`] (never fails) |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::taxonomy::ErrorRecord;
use crate::{Financials, MetricsRecord, NewsItem, OverviewRecord, Symbol, ValidationError};

/// Name of one independently fetchable data fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    Financials,
    Overview,
    Metrics,
    News,
}

impl SourceName {
    pub const ALL: [Self; 4] = [Self::Financials, Self::Overview, Self::Metrics, Self::News];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Financials => "financials",
            Self::Overview => "overview",
            Self::Metrics => "metrics",
            Self::News => "news",
        }
    }
}

impl Display for SourceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "financials" => Ok(Self::Financials),
            "overview" => Ok(Self::Overview),
            "metrics" => Ok(Self::Metrics),
            "news" => Ok(Self::News),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// Successful payload of a source fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum SourcePayload {
    Financials(Financials),
    Overview(OverviewRecord),
    Metrics(MetricsRecord),
    News(Vec<NewsItem>),
}

impl SourcePayload {
    pub const fn source(&self) -> SourceName {
        match self {
            Self::Financials(_) => SourceName::Financials,
            Self::Overview(_) => SourceName::Overview,
            Self::Metrics(_) => SourceName::Metrics,
            Self::News(_) => SourceName::News,
        }
    }
}

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SourcePayload, ErrorRecord>> + Send + 'a>>;

/// Uniform `fetch(key) -> Result<T>` contract for one remote source.
///
/// Implementations must be `Send + Sync`; the orchestrator runs each fetch on
/// its own task.
pub trait SourceFetcher: Send + Sync {
    fn source(&self) -> SourceName;

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> FetchFuture<'a>;
}

/// Fetcher backed by the dashboard API.
#[derive(Clone)]
pub struct ApiSourceFetcher {
    source: SourceName,
    api: Arc<ApiClient>,
}

impl ApiSourceFetcher {
    pub fn new(source: SourceName, api: Arc<ApiClient>) -> Self {
        Self { source, api }
    }

    /// One fetcher per entry of `sources`, all sharing `api`.
    pub fn for_sources(
        sources: &[SourceName],
        api: &Arc<ApiClient>,
    ) -> Vec<Arc<dyn SourceFetcher>> {
        sources
            .iter()
            .map(|source| Arc::new(Self::new(*source, Arc::clone(api))) as Arc<dyn SourceFetcher>)
            .collect()
    }
}

impl SourceFetcher for ApiSourceFetcher {
    fn source(&self) -> SourceName {
        self.source
    }

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> FetchFuture<'a> {
        Box::pin(async move {
            match self.source {
                SourceName::Financials => self
                    .api
                    .get_financials(symbol)
                    .await
                    .map(SourcePayload::Financials),
                SourceName::Overview => self
                    .api
                    .get_overview(symbol)
                    .await
                    .map(SourcePayload::Overview),
                SourceName::Metrics => self
                    .api
                    .get_metrics(symbol)
                    .await
                    .map(SourcePayload::Metrics),
                SourceName::News => Ok(SourcePayload::News(self.api.get_news(symbol).await)),
            }
        })
    }
}
