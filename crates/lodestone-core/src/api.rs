//! Remote data boundary.
//!
//! [`ApiClient`] speaks to the dashboard backend over an [`HttpClient`]. Every
//! failure is classified into an [`ErrorRecord`] before it leaves this module.
//!
//! | Operation | Route | On failure |
//! |-----------|-------|------------|
//! | [`search_entities`](ApiClient::search_entities) | `GET /symbols?query=` | empty list |
//! | [`get_metrics`](ApiClient::get_metrics) | `GET /metrics/{symbol}` | error |
//! | [`get_financials`](ApiClient::get_financials) | `GET /financials?symbol=` | error |
//! | [`get_overview`](ApiClient::get_overview) | `GET /overview?symbol=` | error |
//! | [`get_news`](ApiClient::get_news) | `GET /news?symbol=` | empty list |
//! | [`get_watchlist`](ApiClient::get_watchlist) | `GET /watchlist` | error |
//! | [`add_watchlist_item`](ApiClient::add_watchlist_item) | `POST /watchlist` | error |
//! | [`remove_watchlist_item`](ApiClient::remove_watchlist_item) | `DELETE /watchlist` | error |

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::SessionProvider;
use crate::config::DashboardConfig;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::taxonomy::{classify, ErrorRecord, RawFailure};
use crate::{Financials, MetricsRecord, NewsItem, OverviewRecord, SearchHit, Symbol, WatchlistItem};

/// Either a bare array or an object wrapping it under `results`/`items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Bare(Vec<Value>),
    Results { results: Vec<Value> },
    Items { items: Vec<Value> },
}

impl ListBody {
    fn into_values(self) -> Vec<Value> {
        match self {
            Self::Bare(values) | Self::Results { results: values } | Self::Items { items: values } => {
                values
            }
        }
    }
}

/// Typed client for the dashboard backend.
#[derive(Clone)]
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    sessions: Arc<dyn SessionProvider>,
    base_url: String,
    timeout_ms: u64,
}

impl ApiClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        sessions: Arc<dyn SessionProvider>,
        config: &DashboardConfig,
    ) -> Self {
        Self {
            http,
            sessions,
            base_url: config.api_base_url().to_owned(),
            timeout_ms: config.request_timeout_ms(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Typeahead search. Transport and decode failures yield an empty list.
    pub async fn search_entities(&self, query: &str) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let path = format!("/symbols?query={}", urlencoding::encode(query));
        match self.get_json::<ListBody>(&path).await {
            Ok(body) => body
                .into_values()
                .into_iter()
                .filter_map(|value| serde_json::from_value::<SearchHit>(value).ok())
                .collect(),
            Err(error) => {
                warn!(query, error = %error, "symbol search failed");
                Vec::new()
            }
        }
    }

    pub async fn get_metrics(&self, symbol: &Symbol) -> Result<MetricsRecord, ErrorRecord> {
        let path = format!("/metrics/{}", urlencoding::encode(symbol.as_str()));
        self.get_json(&path).await
    }

    pub async fn get_financials(&self, symbol: &Symbol) -> Result<Financials, ErrorRecord> {
        let path = format!("/financials?symbol={}", urlencoding::encode(symbol.as_str()));
        self.get_json(&path).await
    }

    pub async fn get_overview(&self, symbol: &Symbol) -> Result<OverviewRecord, ErrorRecord> {
        let path = format!("/overview?symbol={}", urlencoding::encode(symbol.as_str()));
        self.get_json(&path).await
    }

    /// News headlines. Failures are tolerated as an empty feed.
    pub async fn get_news(&self, symbol: &Symbol) -> Vec<NewsItem> {
        let path = format!("/news?symbol={}", urlencoding::encode(symbol.as_str()));
        match self.get_json::<ListBody>(&path).await {
            Ok(body) => body
                .into_values()
                .into_iter()
                .filter_map(|value| serde_json::from_value::<NewsItem>(value).ok())
                .collect(),
            Err(error) => {
                debug!(symbol = %symbol, error = %error, "news feed unavailable");
                Vec::new()
            }
        }
    }

    pub async fn get_watchlist(&self) -> Result<Vec<WatchlistItem>, ErrorRecord> {
        let request = self.authorized(HttpRequest::get(self.url("/watchlist")))?;
        let response = self.send(request).await?;
        let body = decode::<ListBody>(&response)?;
        Ok(body
            .into_values()
            .into_iter()
            .filter_map(|value| serde_json::from_value::<WatchlistItem>(value).ok())
            .collect())
    }

    pub async fn add_watchlist_item(&self, symbol: &Symbol, name: &str) -> Result<(), ErrorRecord> {
        let body = json!({ "symbol": symbol.as_str(), "name": name }).to_string();
        let request =
            self.authorized(HttpRequest::post(self.url("/watchlist")).with_json_body(body))?;
        self.send(request).await.map(|_| ())
    }

    pub async fn remove_watchlist_item(&self, symbol: &Symbol) -> Result<(), ErrorRecord> {
        let body = json!({ "symbol": symbol.as_str() }).to_string();
        let request =
            self.authorized(HttpRequest::delete(self.url("/watchlist")).with_json_body(body))?;
        self.send(request).await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: HttpRequest) -> Result<HttpRequest, ErrorRecord> {
        let session = self
            .sessions
            .current_session()
            .ok_or_else(ErrorRecord::unauthenticated)?;
        Ok(request.with_auth(&HttpAuth::BearerToken(session.id_token().to_owned())))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ErrorRecord> {
        let response = self.send(HttpRequest::get(self.url(path))).await?;
        decode(&response)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ErrorRecord> {
        let request = request.with_timeout_ms(self.timeout_ms);
        let method = request.method;
        let path = request.path().to_owned();
        debug!(%method, path = %path, "api request");

        match self.http.execute(request.clone()).await {
            Ok(response) if response.is_success() => {
                debug!(%method, path = %path, status = response.status, "api response");
                Ok(response)
            }
            Ok(response) => {
                let record = classify(&RawFailure::from_response(&request, response));
                warn!(%method, path = %path, error = %record, "api responded with error status");
                Err(record)
            }
            Err(error) => {
                let record = classify(&RawFailure::from_transport(&request, &error));
                warn!(%method, path = %path, error = %record, cause = %error, "api transport failure");
                Err(record)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ErrorRecord> {
    let body = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(body)
        .map_err(|e| ErrorRecord::unknown(format!("failed to decode response: {e}")))
}
