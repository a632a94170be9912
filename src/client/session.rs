//! Authentication lifecycle: login and on-demand token refresh
//!
//! There is no background timer. Every outbound API request calls
//! [`SessionManager::ensure_fresh`] first, which refreshes the access token when
//! it is inside the configured buffer before expiry. A failed refresh is fatal
//! for the run.

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::retry::{self, RetryPolicy};
use super::{ClientError, ClientResult};
use crate::config::ExportConfig;
use crate::metrics;
use crate::model::{LoginResponse, RefreshResponse, Session};

/// Token lifetime assumed when the login response omits `expiresIn`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Wall-clock source for token age
pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds
    fn now_ms(&self) -> i64;
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Owner of the single session of a run
pub struct SessionManager {
    http: Client,
    login_url: String,
    refresh_url: String,
    identity_api_key: Option<String>,
    policy: RetryPolicy,
    refresh_buffer_secs: i64,
    clock: Arc<dyn Clock>,
    session: Option<Session>,
}

impl SessionManager {
    /// Create a manager with no session
    pub fn new(http: Client, config: &ExportConfig, login_path: &str) -> Self {
        Self {
            http,
            login_url: format!("{}{}", config.api_base(), login_path),
            refresh_url: config.refresh_url.clone(),
            identity_api_key: config.identity_api_key.clone(),
            policy: config.retry_policy(),
            refresh_buffer_secs: config.token_refresh_buffer_secs,
            clock: Arc::new(SystemClock),
            session: None,
        }
    }

    /// Replace the clock used for token age
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current session, if logged in
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether a session exists
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Log in with account credentials and store the new session
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<&Session> {
        let url = self.login_url.clone();
        let body = json!({ "email": email, "password": password });
        let http = &self.http;

        let (status, text) = retry::execute(&self.policy, "POST login", || {
            let request = http.post(&url).json(&body);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ClientError::Network(e.to_string()))?;
                let status = response.status();
                metrics::record_request("POST", status.as_u16());
                if status.is_server_error() {
                    return Err(ClientError::Server {
                        endpoint: "login".to_string(),
                        status: status.as_u16(),
                    });
                }
                let text = response
                    .text()
                    .await
                    .map_err(|e| ClientError::Network(e.to_string()))?;
                Ok((status, text))
            }
        })
        .await
        .map_err(|e| ClientError::Authentication(format!("login request failed, {e}")))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Login rejected");
            return Err(ClientError::Authentication(format!(
                "login rejected with status {status}"
            )));
        }

        let parsed: LoginResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::Authentication(format!("malformed login response: {e}")))?;
        let session = session_from_login(parsed, email, self.clock.now_ms())?;

        info!(email = %session.email, "Logged in");
        debug!(expires_in_secs = session.expires_in_secs, "Session established");
        Ok(&*self.session.insert(session))
    }

    /// Refresh the access token if it is about to expire; return the bearer token.
    ///
    /// Fails with [`ClientError::NotLoggedIn`] before login and with
    /// [`ClientError::TokenRefresh`] when the refresh call does not succeed.
    pub async fn ensure_fresh(&mut self) -> ClientResult<String> {
        let now = self.clock.now_ms();
        let session = self.session.as_ref().ok_or(ClientError::NotLoggedIn)?;

        if session.needs_refresh(now, self.refresh_buffer_secs) {
            debug!(
                age_secs = session.age_secs(now),
                expires_in_secs = session.expires_in_secs,
                "Access token near expiry, refreshing"
            );
            self.refresh().await?;
        }

        self.session
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(ClientError::NotLoggedIn)
    }

    async fn refresh(&mut self) -> ClientResult<()> {
        let refresh_token = self
            .session
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(ClientError::NotLoggedIn)?;

        let url = &self.refresh_url;
        let key = self.identity_api_key.as_deref();
        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];
        let http = &self.http;

        let text = retry::execute(&self.policy, "POST token refresh", || {
            // The refresh token authenticates this call; no bearer header.
            let mut request = http.post(url).form(&form);
            if let Some(key) = key {
                request = request.query(&[("key", key)]);
            }
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ClientError::Network(e.to_string()))?;
                let status = response.status();
                metrics::record_request("POST", status.as_u16());
                if !status.is_success() {
                    return Err(ClientError::TokenRefresh(format!(
                        "identity provider answered {status}"
                    )));
                }
                response
                    .text()
                    .await
                    .map_err(|e| ClientError::Network(e.to_string()))
            }
        })
        .await
        .map_err(|e| ClientError::TokenRefresh(e.to_string()))?;

        let parsed: RefreshResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::TokenRefresh(format!("malformed refresh response: {e}")))?;
        let access_token = parsed
            .bearer()
            .ok_or_else(|| ClientError::TokenRefresh("refresh response has no token".to_string()))?
            .to_string();
        let expires_in_secs = parsed
            .expires_in
            .as_ref()
            .and_then(|e| e.seconds())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let issued_at_ms = self.clock.now_ms();

        let session = self.session.as_mut().ok_or(ClientError::NotLoggedIn)?;
        session.access_token = access_token;
        session.expires_in_secs = expires_in_secs;
        session.issued_at_ms = issued_at_ms;
        if let Some(rotated) = parsed.refresh_token.filter(|t| !t.is_empty()) {
            session.refresh_token = rotated;
        }

        metrics::record_token_refresh();
        info!(expires_in_secs, "Access token refreshed");
        Ok(())
    }
}

/// Validate a login body and turn it into a session issued at `now_ms`
pub fn session_from_login(
    response: LoginResponse,
    fallback_email: &str,
    now_ms: i64,
) -> ClientResult<Session> {
    let access_token = response.id_token.filter(|t| !t.is_empty());
    let refresh_token = response.refresh_token.filter(|t| !t.is_empty());

    let (access_token, refresh_token) = match (access_token, refresh_token) {
        (Some(access), Some(refresh)) => (access, refresh),
        _ => {
            return Err(ClientError::Authentication(
                "login response is missing the access or refresh token".to_string(),
            ))
        }
    };

    Ok(Session {
        access_token,
        refresh_token,
        expires_in_secs: response
            .expires_in
            .as_ref()
            .and_then(|e| e.seconds())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        subject_id: response.local_id.unwrap_or_default(),
        email: response
            .email
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| fallback_email.to_string()),
        issued_at_ms: now_ms,
    })
}
