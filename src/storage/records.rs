use std::collections::{BTreeSet, HashSet};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::kv::KvStore;
use crate::triage::{AnalysisCache, Channel};

const ANALYSIS_CACHE_KEY: &str = "analysis_cache";
const FAVORITES_KEY: &str = "favorites";
const HISTORY_KEY: &str = "deletion_history";

/// Maximum number of channels kept in the deletion history.
pub const HISTORY_LIMIT: usize = 100;

/// Typed access to the three independent local records.
///
/// Each record is one JSON document under its own key. Reads never fail: a
/// missing key, an unavailable store, or a corrupt document all read as empty.
/// Writes never fail either; errors are logged and the in-memory state stays
/// authoritative for the rest of the session. Updates that merge into a stored
/// record are skipped when that record cannot be read.
pub struct RecordStore<S> {
    store: S,
}

impl<S: KvStore> RecordStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Read a record, distinguishing an unavailable store from an empty one.
    ///
    /// A missing key or a corrupt document is `Ok(T::default())`. A substrate
    /// failure is `Err`, so read-modify-write callers can skip their write
    /// instead of replacing durable state with an empty value.
    async fn try_read<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Corrupt local record, treating as empty");
                Ok(T::default())
            }
        }
    }

    async fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.try_read(key).await.unwrap_or_else(|e| {
            tracing::warn!(key = %key, error = %e, "Failed to read local record, treating as empty");
            T::default()
        })
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode local record");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &raw).await {
            tracing::warn!(key = %key, error = %e, "Failed to write local record");
        }
    }

    // ========================================================================
    // Analysis Cache
    // ========================================================================

    /// Cached activity per channel. Unresolved entries are dropped on read.
    pub async fn analysis_cache(&self) -> AnalysisCache {
        let mut cache: AnalysisCache = self.read(ANALYSIS_CACHE_KEY).await;
        cache.retain(|_, state| state.is_resolved());
        cache
    }

    /// Stored cache with unresolved entries dropped, or `None` if unreadable.
    async fn stored_analysis(&self) -> Option<AnalysisCache> {
        match self.try_read::<AnalysisCache>(ANALYSIS_CACHE_KEY).await {
            Ok(mut cache) => {
                cache.retain(|_, state| state.is_resolved());
                Some(cache)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read analysis cache, skipping update");
                None
            }
        }
    }

    /// Merge `entries` into the stored cache, keeping entries for other channels.
    ///
    /// Nothing is written when the stored cache cannot be read.
    pub async fn merge_analysis(&self, entries: &AnalysisCache) {
        if entries.is_empty() {
            return;
        }
        let Some(mut cache) = self.stored_analysis().await else {
            return;
        };
        cache.extend(
            entries
                .iter()
                .filter(|(_, state)| state.is_resolved())
                .map(|(id, state)| (id.clone(), *state)),
        );
        self.write(ANALYSIS_CACHE_KEY, &cache).await;
    }

    /// Drop cached activity for removed channels.
    pub async fn evict_analysis<'a>(&self, channel_ids: impl IntoIterator<Item = &'a str>) {
        let Some(mut cache) = self.stored_analysis().await else {
            return;
        };
        let before = cache.len();
        for id in channel_ids {
            cache.remove(id);
        }
        if cache.len() != before {
            self.write(ANALYSIS_CACHE_KEY, &cache).await;
        }
    }

    // ========================================================================
    // Favorites
    // ========================================================================

    pub async fn favorites(&self) -> HashSet<String> {
        let ids: Vec<String> = self.read(FAVORITES_KEY).await;
        ids.into_iter().collect()
    }

    /// Replace the stored favorite set. Stored sorted for stable diffs.
    pub async fn save_favorites(&self, favorites: &HashSet<String>) {
        let sorted: BTreeSet<&String> = favorites.iter().collect();
        self.write(FAVORITES_KEY, &sorted).await;
    }

    // ========================================================================
    // Deletion History
    // ========================================================================

    /// Removed channels, most recent first.
    pub async fn history(&self) -> Vec<Channel> {
        self.read(HISTORY_KEY).await
    }

    /// Put `removed` in front of `history`, trim to [`HISTORY_LIMIT`], persist,
    /// and return the new history.
    ///
    /// `history` is the caller's in-memory copy; the stored record is never
    /// re-read, so an unreadable store cannot erase earlier removals.
    pub async fn prepend_history(&self, history: &[Channel], removed: &[Channel]) -> Vec<Channel> {
        if removed.is_empty() {
            return history.to_vec();
        }
        let mut updated = Vec::with_capacity(removed.len() + history.len());
        updated.extend_from_slice(removed);
        updated.extend_from_slice(history);
        updated.truncate(HISTORY_LIMIT);
        self.write(HISTORY_KEY, &updated).await;
        updated
    }
}
