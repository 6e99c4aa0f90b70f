use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::backend::{Backend, BackendError, UserInfo};
use crate::storage::{KvStore, RecordStore};
use crate::triage::{
    self, AnalysisEvent, AnalysisOutcome, AnalyzeOptions, Channel, LoadError, MutationError,
    MutationReport, Policy, Roster, Summary, ViewState,
};

// ============================================================================
// Session
// ============================================================================

/// State for one signed-in session: the roster, the deletion history and the
/// handles used to refresh and persist them.
///
/// Every roster mutation goes through a method here, so a caller never
/// observes a partially-applied chunk or bulk delete.
pub struct Session<B, S> {
    backend: B,
    records: RecordStore<S>,
    roster: Roster,
    history: Vec<Channel>,
    options: AnalyzeOptions,
}

impl<B: Backend, S: KvStore> Session<B, S> {
    /// Check sign-in, fetch the roster and merge it with local records.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`]. No partial session is returned.
    pub async fn start(backend: B, store: S, options: AnalyzeOptions) -> Result<Self, LoadError> {
        match backend.auth_status().await {
            Ok(true) => {}
            Ok(false) | Err(BackendError::Unauthorized) => return Err(LoadError::Unauthenticated),
            Err(e) => return Err(LoadError::Backend(e)),
        }

        let remote = backend.list_channels().await.map_err(|e| match e {
            BackendError::Decode(msg) => LoadError::Malformed(msg),
            BackendError::Unauthorized => LoadError::Unauthenticated,
            other => LoadError::Backend(other),
        })?;

        let records = RecordStore::new(store);
        let cache = records.analysis_cache().await;
        let favorites = records.favorites().await;
        let history = records.history().await;

        let roster = Roster::load(remote, &cache, favorites)?;
        tracing::info!(
            channels = roster.len(),
            pending = roster.pending().len(),
            history = history.len(),
            "Session started"
        );

        Ok(Self {
            backend,
            records,
            roster,
            history,
            options,
        })
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Removed channels, most recent first.
    pub fn history(&self) -> &[Channel] {
        &self.history
    }

    /// Display name and avatar. Informational only.
    pub async fn user_info(&self) -> Result<UserInfo, BackendError> {
        self.backend.user_info().await
    }

    /// Resolve every pending channel. See [`triage::analyze`].
    pub async fn analyze(&mut self, events: Option<mpsc::Sender<AnalysisEvent>>) -> AnalysisOutcome {
        triage::analyze(
            &mut self.roster,
            &self.backend,
            &self.records,
            &self.options,
            events,
        )
        .await
    }

    /// Flip a channel's favorite flag and persist the full favorite set.
    ///
    /// Returns the new flag, or `None` for a channel not in the roster.
    pub async fn toggle_favorite(&mut self, channel_id: &str) -> Option<bool> {
        let favorites = self.roster.toggle_favorite(channel_id)?.clone();
        self.records.save_favorites(&favorites).await;
        self.roster.get(channel_id).map(|c| c.is_favorite)
    }

    /// Bulk unsubscribe. See [`triage::execute`].
    pub async fn unsubscribe(
        &mut self,
        subscription_ids: &HashSet<String>,
    ) -> Result<MutationReport, MutationError> {
        let report = triage::execute(
            &mut self.roster,
            &self.backend,
            &self.records,
            &self.history,
            subscription_ids,
        )
        .await?;
        self.history = report.history.clone();
        Ok(report)
    }

    /// Subscription ids of every current removal target.
    pub fn target_ids(&self, policy: &Policy) -> HashSet<String> {
        self.roster
            .channels()
            .iter()
            .filter(|c| policy.is_target(c))
            .map(|c| c.subscription_id.clone())
            .collect()
    }

    /// Channels to render for `view`, in display order.
    pub fn view(&self, view: &ViewState, now: DateTime<Utc>) -> Vec<&Channel> {
        triage::query(&self.roster, &self.history, view, now)
    }

    pub fn summary(&self, policy: &Policy) -> Summary {
        policy.summarize(self.roster.channels())
    }
}
