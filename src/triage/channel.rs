use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cached activity keyed by channel id. Only resolved states are stored.
pub type AnalysisCache = BTreeMap<String, ActivityState>;

// ============================================================================
// Activity State
// ============================================================================

/// What is known about a channel's upload recency.
///
/// Serialized as a single string: `"pending"`, `"none"`, or an RFC 3339
/// timestamp. The same encoding is used by the backend's analyze endpoint and
/// by the local analysis cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActivityState {
    /// Not analyzed yet.
    #[default]
    Pending,
    /// Analyzed; the channel has never uploaded.
    NoUploads,
    /// Analyzed; time of the most recent upload.
    LastUploadAt(DateTime<Utc>),
}

impl ActivityState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ActivityState::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        !self.is_pending()
    }

    pub fn last_upload(&self) -> Option<DateTime<Utc>> {
        match self {
            ActivityState::LastUploadAt(at) => Some(*at),
            _ => None,
        }
    }

    /// Parse the wire encoding.
    pub fn parse(s: &str) -> Result<Self, ActivityParseError> {
        match s.trim() {
            "pending" => Ok(ActivityState::Pending),
            "none" => Ok(ActivityState::NoUploads),
            other => DateTime::parse_from_rfc3339(other)
                .map(|at| ActivityState::LastUploadAt(at.with_timezone(&Utc)))
                .map_err(|_| ActivityParseError(other.to_string())),
        }
    }

    /// Short status line shown next to a channel.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        match self {
            ActivityState::Pending => "pending".to_string(),
            ActivityState::NoUploads => "no uploads".to_string(),
            ActivityState::LastUploadAt(at) => {
                let days = (now - *at).num_days();
                match days {
                    d if d < 0 => "scheduled".to_string(),
                    0 => "today".to_string(),
                    1 => "1 day ago".to_string(),
                    d => format!("{d} days ago"),
                }
            }
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Pending => f.write_str("pending"),
            ActivityState::NoUploads => f.write_str("none"),
            ActivityState::LastUploadAt(at) => {
                f.write_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl From<ActivityState> for String {
    fn from(state: ActivityState) -> Self {
        state.to_string()
    }
}

impl TryFrom<String> for ActivityState {
    type Error = ActivityParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ActivityState::parse(&value)
    }
}

/// The value was neither a known keyword nor an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid activity state: {0:?}")]
pub struct ActivityParseError(pub String);

// ============================================================================
// Channel
// ============================================================================

fn default_subscribed() -> bool {
    true
}

/// One subscribed content source, merged from the remote roster and local state.
///
/// Serialized (camelCase) as a deletion-history snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: String,
    /// Needed to unsubscribe; distinct from `channel_id`.
    pub subscription_id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subscriber_count: u64,
    #[serde(default)]
    pub video_count: u64,
    #[serde(default = "default_subscribed")]
    pub is_subscribed: bool,
    #[serde(default)]
    pub activity_state: ActivityState,
    #[serde(default)]
    pub is_favorite: bool,
}

/// A channel record as returned by the backend's list endpoint.
///
/// Every field is optional at the wire level so that missing required fields
/// can be reported precisely by [`crate::triage::Roster::load`] instead of as
/// an opaque decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChannel {
    pub channel_id: Option<String>,
    pub subscription_id: Option<String>,
    pub title: Option<String>,
    #[serde(alias = "thumbnails")]
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    #[serde(alias = "subscribers")]
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    pub is_subscribed: Option<bool>,
}
