//! Rate-limited request gateway
//!
//! Issues one HTTP call at a time against the API:
//! - refreshes the session if needed, then attaches the bearer token
//! - waits the fixed rate-limit interval before every request
//! - retries transport failures, 429 and 5xx through [`retry::execute`]
//! - classifies the final status (2xx / 401 / 429 / 5xx / other)
//!
//! Only auth expiry, rate limiting and server errors surface as errors. Any other
//! non-2xx status, an unreadable body or an exhausted transport failure is logged
//! and returned as `Ok(None)`, which callers read as "nothing for this account".

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::endpoints::ApiEndpoints;
use super::retry::{self, RetryPolicy};
use super::session::SessionManager;
use super::{build_http_client, ApiRequest, ApiSource, ClientError, ClientResult};
use crate::config::ExportConfig;
use crate::metrics;
use crate::model::Session;

/// Gateway to the health-data API, owning the run's session
pub struct ApiGateway {
    http: Client,
    base_url: String,
    policy: RetryPolicy,
    rate_limit: Duration,
    session: SessionManager,
}

impl ApiGateway {
    /// Build a gateway and its session manager from configuration
    pub fn new(config: &ExportConfig, endpoints: &ApiEndpoints) -> ClientResult<Self> {
        let http = build_http_client(config)?;
        let session = SessionManager::new(http.clone(), config, endpoints.login);
        Ok(Self::with_session(http, config, session))
    }

    /// Assemble a gateway around an existing session manager
    pub fn with_session(http: Client, config: &ExportConfig, session: SessionManager) -> Self {
        Self {
            http,
            base_url: config.api_base().to_string(),
            policy: config.retry_policy(),
            rate_limit: config.rate_limit_interval(),
            session,
        }
    }

    /// Current session, if logged in
    pub fn session(&self) -> Option<&Session> {
        self.session.session()
    }

    /// Log in and keep the session for every later request
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<Session> {
        self.session.login(email, password).await.cloned()
    }

    /// Issue one request and classify its outcome
    pub async fn request(&mut self, request: &ApiRequest) -> ClientResult<Option<Value>> {
        let token = self.session.ensure_fresh().await?;

        if !self.rate_limit.is_zero() {
            tokio::time::sleep(self.rate_limit).await;
        }

        let url = format!("{}{}", self.base_url, request.path);
        let label = request.label();
        let http = &self.http;
        debug!(endpoint = %label, "Sending request");

        let outcome = retry::execute(&self.policy, &label, || {
            let mut builder = http
                .request(request.method.clone(), &url)
                .bearer_auth(&token)
                .query(&request.query);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
            let endpoint = request.path.clone();
            let method = request.method.clone();
            async move {
                let response = builder
                    .send()
                    .await
                    .map_err(|e| ClientError::Network(e.to_string()))?;
                let status = response.status();
                metrics::record_request(method.as_str(), status.as_u16());

                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(ClientError::RateLimited { endpoint });
                }
                if status.is_server_error() {
                    return Err(ClientError::Server {
                        endpoint,
                        status: status.as_u16(),
                    });
                }
                let body = response
                    .text()
                    .await
                    .map_err(|e| ClientError::Network(e.to_string()))?;
                Ok((status, body))
            }
        })
        .await;

        let (status, body) = match outcome {
            Ok(response) => response,
            Err(exhausted) => match exhausted.into_inner() {
                err @ (ClientError::RateLimited { .. } | ClientError::Server { .. }) => {
                    return Err(err)
                }
                err => {
                    warn!(endpoint = %label, "Request failed, treating as empty: {}", err);
                    metrics::record_soft_failure(&request.path);
                    return Ok(None);
                }
            },
        };

        classify_response(&request.path, status, &body)
    }
}

#[async_trait]
impl ApiSource for ApiGateway {
    async fn fetch(&mut self, request: &ApiRequest) -> ClientResult<Option<Value>> {
        self.request(request).await
    }
}

/// Map a final HTTP status and body to the gateway contract.
///
/// Checked in order: 2xx, 401, 429, 5xx, everything else.
pub fn classify_response(
    endpoint: &str,
    status: StatusCode,
    body: &str,
) -> ClientResult<Option<Value>> {
    if status.is_success() {
        if body.trim().is_empty() {
            debug!(endpoint, status = status.as_u16(), "Empty response body");
            return Ok(None);
        }
        return match serde_json::from_str(body) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(endpoint, "Response is not valid JSON, treating as empty: {}", e);
                metrics::record_soft_failure(endpoint);
                Ok(None)
            }
        };
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ClientError::AuthExpired {
            endpoint: endpoint.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => Err(ClientError::RateLimited {
            endpoint: endpoint.to_string(),
        }),
        s if s.is_server_error() => Err(ClientError::Server {
            endpoint: endpoint.to_string(),
            status: s.as_u16(),
        }),
        s => {
            warn!(endpoint, status = s.as_u16(), "Endpoint returned no data");
            metrics::record_soft_failure(endpoint);
            Ok(None)
        }
    }
}
