use std::collections::HashSet;

use thiserror::Error;

use super::channel::Channel;
use super::roster::Roster;
use crate::backend::{Backend, BackendError};
use crate::storage::{KvStore, RecordStore};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("No subscriptions selected")]
    EmptySelection,

    /// The request itself failed. Nothing was changed locally; safe to retry.
    #[error("Bulk unsubscribe failed: {0}")]
    Backend(#[from] BackendError),
}

/// Result of one bulk unsubscribe.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReport {
    pub success_count: usize,
    pub fail_count: usize,
    /// Snapshots of the channels marked unsubscribed, in roster order.
    pub removed: Vec<Channel>,
    /// Deletion history after the removed channels were prepended.
    pub history: Vec<Channel>,
}

/// Unsubscribe from every subscription in `subscription_ids` with one request.
///
/// Only ids the backend reports as succeeded are marked unsubscribed. When the
/// response carries counts but no per-id list, the whole requested set is
/// treated as succeeded. Removed channels are prepended to `history` (the
/// caller's current deletion history) and evicted from the analysis cache;
/// they stay in the roster.
pub async fn execute<B: Backend, S: KvStore>(
    roster: &mut Roster,
    backend: &B,
    records: &RecordStore<S>,
    history: &[Channel],
    subscription_ids: &HashSet<String>,
) -> Result<MutationReport, MutationError> {
    if subscription_ids.is_empty() {
        return Err(MutationError::EmptySelection);
    }

    let mut request: Vec<String> = subscription_ids.iter().cloned().collect();
    request.sort();
    tracing::debug!(count = request.len(), "Sending bulk unsubscribe");

    let response = backend.bulk_unsubscribe(&request).await?;

    let succeeded: HashSet<String> = match response.succeeded {
        Some(ids) => ids
            .into_iter()
            .filter(|id| subscription_ids.contains(id))
            .collect(),
        None => {
            if response.fail_count > 0 {
                tracing::warn!(
                    fail_count = response.fail_count,
                    "Backend did not report which ids failed, treating all as removed"
                );
            }
            subscription_ids.clone()
        }
    };

    let removed = roster.mark_unsubscribed(&succeeded);
    let history = records.prepend_history(history, &removed).await;
    records
        .evict_analysis(removed.iter().map(|c| c.channel_id.as_str()))
        .await;

    tracing::info!(
        success_count = response.success_count,
        fail_count = response.fail_count,
        removed = removed.len(),
        "Bulk unsubscribe complete"
    );

    Ok(MutationReport {
        success_count: response.success_count,
        fail_count: response.fail_count,
        removed,
        history,
    })
}
