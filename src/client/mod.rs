//! Network layer: retry executor, session lifecycle and the request gateway
//!
//! Everything that talks to the remote API goes through [`gateway::ApiGateway`],
//! which owns the single [`session::SessionManager`] of a run. Code that only
//! needs to issue requests depends on the [`ApiSource`] trait instead, so the
//! export pipeline can run against scripted sources in tests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::config::ExportConfig;

pub mod endpoints;
pub mod gateway;
pub mod retry;
pub mod session;

pub use endpoints::{ApiEndpoints, DEFAULT_ENDPOINTS};
pub use gateway::ApiGateway;
pub use retry::{RetryExhausted, RetryPolicy};
pub use session::{Clock, SessionManager, SystemClock};

/// Header carrying the client application version
pub const APP_VERSION_HEADER: &str = "x-app-version";

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Login rejected or login response unusable
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Access token could not be refreshed
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// The API answered 401 for an endpoint
    #[error("authorization expired for {endpoint} (401)")]
    AuthExpired {
        /// Endpoint path
        endpoint: String,
    },

    /// The API answered 429 for an endpoint
    #[error("rate limited on {endpoint} (429)")]
    RateLimited {
        /// Endpoint path
        endpoint: String,
    },

    /// The API answered 5xx for an endpoint
    #[error("server error {status} on {endpoint}")]
    Server {
        /// Endpoint path
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// A request was attempted before login
    #[error("no active session, log in first")]
    NotLoggedIn,

    /// Transport failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(String),

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl ClientError {
    /// Whether the error makes every further authenticated request impossible
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotLoggedIn | Self::TokenRefresh(_))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// One API call: method, path relative to the base URL, query and body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// GET request for `path`
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// POST request for `path` with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Add a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// `METHOD /path` label used in logs
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Anything that can answer API requests with the gateway's contract:
/// `Ok(Some)` for data, `Ok(None)` for a soft failure, `Err` for hard failures.
#[async_trait]
pub trait ApiSource: Send {
    /// Issue one request
    async fn fetch(&mut self, request: &ApiRequest) -> ClientResult<Option<Value>>;
}

/// Build the HTTP client shared by login, refresh and data requests
pub fn build_http_client(config: &ExportConfig) -> ClientResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ClientError::Setup(format!("invalid user agent: {e}")))?,
    );
    headers.insert(
        HeaderName::from_static(APP_VERSION_HEADER),
        HeaderValue::from_str(&config.app_version)
            .map_err(|e| ClientError::Setup(format!("invalid app version: {e}")))?,
    );

    Client::builder()
        .default_headers(headers)
        .connect_timeout(config.request_timeout().min(std::time::Duration::from_secs(10)))
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ClientError::Setup(e.to_string()))
}
