//! Classification of failed remote calls.
//!
//! [`classify`] is pure: the same [`RawFailure`] always yields the same
//! [`ErrorRecord`], and nothing is logged or mutated along the way.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::http_client::{HttpError, HttpFailureStage, HttpRequest, HttpResponse};

pub const DETAIL_NETWORK_ERROR: &str = "NetworkError";
pub const DETAIL_REQUEST_SETUP_ERROR: &str = "RequestSetupError";
pub const DETAIL_ALPHA_VANTAGE_UNAVAILABLE: &str = "AlphaVantageUnavailable";

/// Error classification carried by an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request was sent but no response was received.
    NetworkError,
    /// The server answered with a non-success status.
    ServerError { status: u16 },
    /// The request could not be constructed or dispatched.
    RequestSetupError,
    /// The call needs an active session and none exists.
    Unauthenticated,
    Unknown,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::ServerError { .. } => "server_error",
            Self::RequestSetupError => "request_setup_error",
            Self::Unauthenticated => "unauthenticated",
            Self::Unknown => "unknown",
        }
    }

    pub const fn status(self) -> Option<u16> {
        match self {
            Self::ServerError { status } => Some(status),
            _ => None,
        }
    }
}

/// Immutable description of one failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail_code: Option<String>,
}

impl ErrorRecord {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        server_message: Option<String>,
        detail_code: Option<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            server_message: server_message.filter(|value| !value.is_empty()),
            detail_code: detail_code.filter(|value| !value.is_empty()),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(
            ErrorKind::Unauthenticated,
            "Sign in required",
            None,
            Some(String::from("Unauthenticated")),
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message, None, None)
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn server_message(&self) -> Option<&str> {
        self.server_message.as_deref()
    }

    pub fn detail_code(&self) -> Option<&str> {
        self.detail_code.as_deref()
    }

    /// Text shown on the failed source's panel.
    pub fn display_message(&self) -> &str {
        if let Some(server_message) = self.server_message() {
            return server_message;
        }
        if !self.message.is_empty() {
            return &self.message;
        }
        "An unknown error occurred"
    }

    /// Extra hint for detail codes the upstream API is known to emit.
    pub fn provider_hint(&self) -> Option<&'static str> {
        match self.detail_code() {
            Some(DETAIL_ALPHA_VANTAGE_UNAVAILABLE) => Some(
                "Alpha Vantage service is currently unavailable. Please try again later.",
            ),
            _ => None,
        }
    }
}

impl Display for ErrorRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_message(), self.kind.code())
    }
}

impl std::error::Error for ErrorRecord {}

/// Request side of a failed call, kept only for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
}

/// Raw, unclassified transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFailure {
    pub request: Option<RequestInfo>,
    pub response: Option<HttpResponse>,
    pub message: String,
}

impl RawFailure {
    /// A response arrived with a non-success status.
    pub fn from_response(request: &HttpRequest, response: HttpResponse) -> Self {
        Self {
            request: Some(request_info(request)),
            message: format!("status {}", response.status),
            response: Some(response),
        }
    }

    /// The transport failed; whether the request left depends on the stage.
    pub fn from_transport(request: &HttpRequest, error: &HttpError) -> Self {
        let request = match error.stage() {
            HttpFailureStage::NoResponse => Some(request_info(request)),
            HttpFailureStage::Setup => None,
        };
        Self {
            request,
            response: None,
            message: error.message().to_owned(),
        }
    }

    /// The request could not be built at all.
    pub fn setup(message: impl Into<String>) -> Self {
        Self {
            request: None,
            response: None,
            message: message.into(),
        }
    }
}

fn request_info(request: &HttpRequest) -> RequestInfo {
    RequestInfo {
        method: request.method.as_str().to_owned(),
        url: request.url.clone(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServerErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_detail: Option<String>,
}

/// Classify a raw failure.
///
/// A response implies `ServerError`, a request without a response implies
/// `NetworkError`, anything else is a `RequestSetupError`.
pub fn classify(failure: &RawFailure) -> ErrorRecord {
    if let Some(response) = &failure.response {
        let body = serde_json::from_str::<ServerErrorBody>(&response.body).unwrap_or_default();
        let server_message = body.error.or(body.message).filter(|value| !value.is_empty());
        let message = server_message
            .clone()
            .unwrap_or_else(|| format!("Server Error: {}", response.status));

        return ErrorRecord::new(
            ErrorKind::ServerError {
                status: response.status,
            },
            message,
            server_message,
            body.error_detail,
        );
    }

    if failure.request.is_some() {
        return ErrorRecord::new(
            ErrorKind::NetworkError,
            "No Response from Server",
            None,
            Some(String::from(DETAIL_NETWORK_ERROR)),
        );
    }

    ErrorRecord::new(
        ErrorKind::RequestSetupError,
        format!("Request Error: {}", failure.message),
        None,
        Some(String::from(DETAIL_REQUEST_SETUP_ERROR)),
    )
}
