//! Client side of the subscription backend.
//!
//! The backend owns authentication and talks to the content platform; this
//! crate only consumes four JSON endpoints plus a user-info lookup:
//!
//! | Operation         | Method + path                      |
//! |-------------------|------------------------------------|
//! | auth check        | `GET  api/auth/status`             |
//! | user info         | `GET  api/user/info`               |
//! | list channels     | `GET  api/all-channels`            |
//! | analyze channel   | `POST api/analyze`                 |
//! | bulk unsubscribe  | `POST api/subscriptions/bulk-delete` |
//!
//! [`Backend`] is the seam the scheduler and mutation executor are written
//! against; [`HttpBackend`] is the reqwest implementation.

mod client;
mod types;

use std::future::Future;

pub use client::HttpBackend;
pub use types::{BackendError, BulkUnsubscribeResponse, UserInfo};

use crate::triage::{ActivityState, RemoteChannel};

/// Operations the triage pipeline needs from the backend.
pub trait Backend {
    /// Whether the current session is signed in.
    fn auth_status(&self) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// Display name and avatar of the signed-in account.
    fn user_info(&self) -> impl Future<Output = Result<UserInfo, BackendError>> + Send;

    /// Full subscription roster.
    fn list_channels(
        &self,
    ) -> impl Future<Output = Result<Vec<RemoteChannel>, BackendError>> + Send;

    /// Most recent upload for one channel. Never returns `Pending`.
    fn analyze_channel(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = Result<ActivityState, BackendError>> + Send;

    /// Remove all given subscriptions in a single request.
    fn bulk_unsubscribe(
        &self,
        subscription_ids: &[String],
    ) -> impl Future<Output = Result<BulkUnsubscribeResponse, BackendError>> + Send;
}
