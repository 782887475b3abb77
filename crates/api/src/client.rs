//! Presence REST client.
//!
//! Thin wrapper over the two presence endpoints:
//! - `GET /status/{user_id}` — fetch a user's presence snapshot
//! - `POST /status/{user_id}` — publish this device's online flag
//!
//! The client carries the session bearer token; without one, calls fail
//! fast with [`ApiError::MissingCredentials`] and never touch the
//! network. Retry is the caller's concern — this layer only classifies
//! failures (see [`ApiError::is_retryable`]).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use mingle_core::config::ApiConfig;

use crate::error::ApiError;
use crate::record::{PresenceRecord, StatusBody, StatusUpdate};

/// Fallback HTTP timeout when configuration carries none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Trait seam between the presence subsystem and the HTTP layer.
///
/// [`PresenceClient`] is the production implementation; tests substitute
/// recording fakes.
pub trait PresenceApi: Send + Sync {
    fn fetch_status(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<PresenceRecord, ApiError>> + Send;

    fn publish_status(
        &self,
        user_id: &str,
        online: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

pub struct PresenceClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PresenceClient {
    /// Create a new client.
    ///
    /// If `token` is `Some`, it will be used for `Authorization: Bearer`
    /// headers on every request.
    pub fn new(config: &ApiConfig, token: Option<String>) -> Self {
        let timeout = if config.request_timeout_secs > 0 {
            config.request_timeout()
        } else {
            DEFAULT_TIMEOUT
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mingle/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn status_url(&self, user_id: &str) -> String {
        format!("{}/status/{}", self.base_url, user_id)
    }

    /// Reject calls that cannot be authenticated before any I/O happens.
    fn check_credentials(&self, user_id: &str) -> Result<(), ApiError> {
        if self.token.is_none() || user_id.is_empty() {
            return Err(ApiError::MissingCredentials);
        }
        Ok(())
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

impl PresenceApi for PresenceClient {
    async fn fetch_status(&self, user_id: &str) -> Result<PresenceRecord, ApiError> {
        self.check_credentials(user_id)?;

        let url = self.status_url(user_id);
        debug!(user_id, "fetching presence status");

        let resp = self.request(self.http.get(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(user_id, status = %status, "presence status fetch failed");
            return Err(ApiError::Status { status });
        }

        let body: StatusBody = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
        body.into_record()
            .ok_or_else(|| ApiError::InvalidBody("empty status payload".to_string()))
    }

    async fn publish_status(&self, user_id: &str, online: bool) -> Result<(), ApiError> {
        self.check_credentials(user_id)?;

        let url = self.status_url(user_id);
        debug!(user_id, online, "publishing presence status");

        let resp = self
            .request(self.http.post(&url))
            .json(&StatusUpdate { online })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(user_id, online, status = %status, "presence status publish failed");
            return Err(ApiError::Status { status });
        }

        Ok(())
    }
}
