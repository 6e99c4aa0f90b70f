use std::time::Duration;

use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::types::{
    AnalyzeRequest, AnalyzeResponse, AuthStatus, BackendError, BulkUnsubscribeRequest,
    BulkUnsubscribeResponse, UserInfo,
};
use super::Backend;
use crate::triage::{ActivityState, RemoteChannel};
use crate::util::{validate_backend_url, UrlValidationError};

/// Name of the backend's session cookie.
const SESSION_COOKIE: &str = "session";

/// reqwest implementation of [`Backend`].
///
/// Cloning is cheap: the underlying connection pool is shared.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    session: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base", &self.base.as_str())
            .field("session", &self.session.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpBackend {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// - [`BackendError::InsecureBaseUrl`] for plain HTTP to a non-loopback host
    /// - [`BackendError::InvalidUrl`] for anything that is not an http(s) URL
    /// - [`BackendError::Network`] if the TLS backend fails to initialize
    pub fn new(
        base_url: &str,
        session: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base = validate_backend_url(base_url).map_err(|e| match e {
            UrlValidationError::InsecureScheme => {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS backend URL");
                BackendError::InsecureBaseUrl
            }
            other => BackendError::InvalidUrl(other.to_string()),
        })?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base,
            session,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))
    }

    /// Send a request with timeout and session cookie, mapping status codes.
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let mut request = request.header(ACCEPT, "application/json");
        if let Some(session) = &self.session {
            request = request.header(
                COOKIE,
                format!("{SESSION_COOKIE}={}", session.expose_secret()),
            );
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| BackendError::Timeout)??;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => Err(BackendError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Unauthorized),
            s => Err(BackendError::HttpStatus(s.as_u16())),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        let response = self.send(self.client.get(url)).await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        let response = self.send(self.client.post(url).json(body)).await?;
        Self::decode(response).await
    }
}

impl Backend for HttpBackend {
    async fn auth_status(&self) -> Result<bool, BackendError> {
        match self.get_json::<AuthStatus>("api/auth/status").await {
            Ok(status) => Ok(status.ok),
            Err(BackendError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn user_info(&self) -> Result<UserInfo, BackendError> {
        self.get_json("api/user/info").await
    }

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, BackendError> {
        let channels: Vec<RemoteChannel> = self.get_json("api/all-channels").await?;
        tracing::debug!(count = channels.len(), "Fetched channel list");
        Ok(channels)
    }

    async fn analyze_channel(&self, channel_id: &str) -> Result<ActivityState, BackendError> {
        let reply: AnalyzeResponse = self
            .post_json("api/analyze", &AnalyzeRequest { channel_id })
            .await?;
        match ActivityState::parse(&reply.last_upload_date) {
            Ok(ActivityState::Pending) => Err(BackendError::Decode(
                "analysis returned an unresolved state".to_string(),
            )),
            Ok(state) => Ok(state),
            Err(e) => Err(BackendError::Decode(e.to_string())),
        }
    }

    async fn bulk_unsubscribe(
        &self,
        subscription_ids: &[String],
    ) -> Result<BulkUnsubscribeResponse, BackendError> {
        self.post_json(
            "api/subscriptions/bulk-delete",
            &BulkUnsubscribeRequest { subscription_ids },
        )
        .await
    }
}
