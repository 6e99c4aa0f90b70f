use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors talking to the subscription backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level error (DNS, connection, TLS, body read)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx status other than 401/403/429
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// HTTP 429
    #[error("Rate limited by backend")]
    RateLimited,
    /// HTTP 401/403: session missing or expired
    #[error("Session expired or not signed in")]
    Unauthorized,
    /// Body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
    #[error("Insecure backend URL: HTTPS required except for loopback hosts")]
    InsecureBaseUrl,
}

impl BackendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthStatus {
    pub ok: bool,
}

/// Signed-in account, as shown in the status header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzeRequest<'a> {
    pub channel_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzeResponse {
    pub last_upload_date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BulkUnsubscribeRequest<'a> {
    pub subscription_ids: &'a [String],
}

/// Outcome of a bulk unsubscribe.
///
/// `succeeded` lists the subscription ids that were actually removed when the
/// backend reports them; older backends only send the two counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUnsubscribeResponse {
    #[serde(alias = "success")]
    pub success_count: usize,
    #[serde(alias = "fail")]
    pub fail_count: usize,
    #[serde(default)]
    pub succeeded: Option<Vec<String>>,
}
