use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// HTTP method set needed by the API client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication strategy applied to outgoing HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
}

impl HttpAuth {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::BearerToken(token) => {
                headers.insert(String::from("authorization"), format!("Bearer {token}"));
            }
        }
    }
}

/// HTTP request envelope used by API transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 10_000,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_json_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.with_header("content-type", "application/json")
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Path and query portion of the URL (`/overview?symbol=ABC`).
    pub fn path(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        without_scheme
            .find('/')
            .map_or("/", |index| &without_scheme[index..])
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Where a transport call stopped before a response was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFailureStage {
    /// The request could not be built or dispatched.
    Setup,
    /// The request was sent but no response arrived (connect error, timeout, reset).
    NoResponse,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    stage: HttpFailureStage,
}

impl HttpError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: HttpFailureStage::Setup,
        }
    }

    pub fn no_response(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: HttpFailureStage::NoResponse,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn stage(&self) -> HttpFailureStage {
        self.stage
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract that supports async execution and auth-aware requests.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("lodestone/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
                HttpMethod::Delete => self.client.delete(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            builder = builder.timeout(Duration::from_millis(request.timeout_ms));

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_builder() {
                    HttpError::setup(format!("invalid request: {e}"))
                } else if e.is_timeout() {
                    HttpError::no_response(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::no_response(format!("connection failed: {e}"))
                } else {
                    HttpError::no_response(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                HttpError::no_response(format!("failed to read response body: {e}"))
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

pub type FixtureOutcome = Result<HttpResponse, HttpError>;

#[derive(Debug, Default)]
struct FixtureInner {
    routes: HashMap<(HttpMethod, String), VecDeque<FixtureOutcome>>,
    requests: Vec<HttpRequest>,
}

/// Deterministic in-memory transport for tests and the CLI's offline mode.
///
/// Routes are keyed by method and path-with-query. Each route holds a queue of
/// outcomes; the last outcome repeats once the queue is drained. Unknown routes
/// answer `404 {"message":"Not Found"}`.
#[derive(Debug, Clone, Default)]
pub struct FixtureHttpClient {
    inner: Arc<Mutex<FixtureInner>>,
}

impl FixtureHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for `method path`.
    pub fn push(&self, method: HttpMethod, path: impl Into<String>, outcome: FixtureOutcome) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .routes
            .entry((method, path.into()))
            .or_default()
            .push_back(outcome);
    }

    pub fn with_json(self, method: HttpMethod, path: impl Into<String>, body: impl Into<String>) -> Self {
        self.push(method, path, Ok(HttpResponse::ok_json(body)));
        self
    }

    pub fn with_status(
        self,
        method: HttpMethod,
        path: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.push(method, path, Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn with_error(self, method: HttpMethod, path: impl Into<String>, error: HttpError) -> Self {
        self.push(method, path, Err(error));
        self
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .clone()
    }

    pub fn request_count(&self, method: HttpMethod, path: &str) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .iter()
            .filter(|request| request.method == method && request.path() == path)
            .count()
    }

    fn next_outcome(&self, request: HttpRequest) -> FixtureOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (request.method, request.path().to_owned());
        inner.requests.push(request);

        match inner.routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, r#"{"message":"Not Found"}"#))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, r#"{"message":"Not Found"}"#))),
            None => Ok(HttpResponse::new(404, r#"{"message":"Not Found"}"#)),
        }
    }
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let outcome = self.next_outcome(request);
        Box::pin(async move { outcome })
    }
}
