use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use super::channel::{ActivityState, AnalysisCache, Channel, RemoteChannel};
use crate::backend::BackendError;

/// Why the initial roster could not be built. Fatal to startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Not signed in to the subscription backend")]
    Unauthenticated,

    #[error("Failed to fetch channel list: {0}")]
    Backend(#[from] BackendError),

    #[error("Malformed channel list: {0}")]
    Malformed(String),

    #[error("Channel record {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("Duplicate channel id in roster: {0}")]
    DuplicateChannel(String),

    #[error("Duplicate subscription id in roster: {0}")]
    DuplicateSubscription(String),
}

/// In-memory roster of channels for the current session.
///
/// Channels keep their remote order and are never removed; unsubscribing
/// only flips `is_subscribed`. The favorite set is held here in full, including
/// ids of channels that are not (or no longer) in the remote roster.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
    favorites: HashSet<String>,
}

fn required(value: Option<String>, index: usize, field: &'static str) -> Result<String, LoadError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LoadError::MissingField { index, field }),
    }
}

impl Roster {
    /// Build the roster from the remote snapshot, cached analysis and favorites.
    ///
    /// Channels found in `cache` start with their cached state; all others start
    /// `Pending`. Cache and favorite entries for unknown channels are ignored.
    pub fn load(
        remote: Vec<RemoteChannel>,
        cache: &AnalysisCache,
        favorites: HashSet<String>,
    ) -> Result<Self, LoadError> {
        let mut channels = Vec::with_capacity(remote.len());
        let mut index = HashMap::with_capacity(remote.len());
        let mut subscriptions = HashSet::with_capacity(remote.len());

        for (i, record) in remote.into_iter().enumerate() {
            let channel_id = required(record.channel_id, i, "channelId")?;
            let subscription_id = required(record.subscription_id, i, "subscriptionId")?;
            let title = required(record.title, i, "title")?;
            let is_subscribed = record.is_subscribed.unwrap_or(true);

            if index.contains_key(&channel_id) {
                return Err(LoadError::DuplicateChannel(channel_id));
            }
            if is_subscribed && !subscriptions.insert(subscription_id.clone()) {
                return Err(LoadError::DuplicateSubscription(subscription_id));
            }

            let activity_state = cache
                .get(&channel_id)
                .copied()
                .filter(ActivityState::is_resolved)
                .unwrap_or_default();

            index.insert(channel_id.clone(), channels.len());
            channels.push(Channel {
                is_favorite: favorites.contains(&channel_id),
                channel_id,
                subscription_id,
                title,
                thumbnail_url: record.thumbnail_url.unwrap_or_default(),
                category: record.category.unwrap_or_default(),
                subscriber_count: record.subscriber_count.unwrap_or(0),
                video_count: record.video_count.unwrap_or(0),
                is_subscribed,
                activity_state,
            });
        }

        Ok(Self {
            channels,
            index,
            favorites,
        })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, channel_id: &str) -> Option<&Channel> {
        self.index.get(channel_id).map(|&i| &self.channels[i])
    }

    pub fn favorites(&self) -> &HashSet<String> {
        &self.favorites
    }

    /// Subscribed channels still awaiting analysis, in roster order.
    pub fn pending(&self) -> Vec<&Channel> {
        self.channels
            .iter()
            .filter(|c| c.is_subscribed && c.activity_state.is_pending())
            .collect()
    }

    /// Distinct non-empty categories, sorted, for building filter tabs.
    pub fn categories(&self) -> Vec<&str> {
        self.channels
            .iter()
            .map(|c| c.category.as_str())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Record an analysis result.
    ///
    /// Only `Pending → resolved` is applied. Returns `false` without changing
    /// anything when the channel is unknown, the new state is `Pending`, or the
    /// channel is already resolved.
    pub fn set_activity(&mut self, channel_id: &str, state: ActivityState) -> bool {
        let Some(&i) = self.index.get(channel_id) else {
            tracing::debug!(channel_id = %channel_id, "Ignoring activity for unknown channel");
            return false;
        };
        let channel = &mut self.channels[i];
        if state.is_pending() || channel.activity_state.is_resolved() {
            return false;
        }
        channel.activity_state = state;
        true
    }

    /// Flip a channel's favorite flag.
    ///
    /// Returns the complete favorite set to persist, or `None` if the channel
    /// is not in the roster.
    pub fn toggle_favorite(&mut self, channel_id: &str) -> Option<&HashSet<String>> {
        let &i = self.index.get(channel_id)?;
        let channel = &mut self.channels[i];
        channel.is_favorite = !channel.is_favorite;
        if channel.is_favorite {
            self.favorites.insert(channel.channel_id.clone());
        } else {
            self.favorites.remove(&channel.channel_id);
        }
        Some(&self.favorites)
    }

    /// Mark every subscribed channel whose subscription id is in `ids` as removed.
    ///
    /// Returns snapshots of the channels that changed, in roster order.
    pub fn mark_unsubscribed(&mut self, ids: &HashSet<String>) -> Vec<Channel> {
        self.channels
            .iter_mut()
            .filter(|c| c.is_subscribed && ids.contains(&c.subscription_id))
            .map(|c| {
                c.is_subscribed = false;
                c.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn remote(id: &str) -> RemoteChannel {
        RemoteChannel {
            channel_id: Some(id.to_string()),
            subscription_id: Some(format!("sub-{id}")),
            title: Some(format!("Channel {id}")),
            subscriber_count: Some(10),
            ..RemoteChannel::default()
        }
    }

    fn roster(ids: &[&str]) -> Roster {
        Roster::load(
            ids.iter().map(|id| remote(id)).collect(),
            &AnalysisCache::new(),
            HashSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_load_merges_cache_and_favorites() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut cache = AnalysisCache::new();
        cache.insert("a".to_string(), ActivityState::LastUploadAt(at));
        cache.insert("b".to_string(), ActivityState::NoUploads);
        cache.insert("gone".to_string(), ActivityState::NoUploads);
        let favorites: HashSet<String> = ["c".to_string(), "gone".to_string()].into();

        let roster =
            Roster::load(vec![remote("a"), remote("b"), remote("c")], &cache, favorites).unwrap();

        assert_eq!(roster.len(), 3);
        assert_eq!(
            roster.get("a").unwrap().activity_state,
            ActivityState::LastUploadAt(at)
        );
        assert_eq!(roster.get("b").unwrap().activity_state, ActivityState::NoUploads);
        assert_eq!(roster.get("c").unwrap().activity_state, ActivityState::Pending);
        assert!(roster.get("c").unwrap().is_favorite);
        assert!(!roster.get("a").unwrap().is_favorite);
        // Favorites for absent channels are preserved for persistence
        assert!(roster.favorites().contains("gone"));
    }

    #[test]
    fn test_load_ignores_cached_pending() {
        let mut cache = AnalysisCache::new();
        cache.insert("a".to_string(), ActivityState::Pending);
        let roster = Roster::load(vec![remote("a")], &cache, HashSet::new()).unwrap();
        assert_eq!(roster.pending().len(), 1);
    }

    #[test]
    fn test_load_missing_field() {
        let mut bad = remote("b");
        bad.subscription_id = None;
        let err = Roster::load(vec![remote("a"), bad], &AnalysisCache::new(), HashSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingField {
                index: 1,
                field: "subscriptionId"
            }
        ));
    }

    #[test]
    fn test_load_blank_channel_id_is_missing() {
        let mut bad = remote("a");
        bad.channel_id = Some("  ".to_string());
        let err = Roster::load(vec![bad], &AnalysisCache::new(), HashSet::new()).unwrap_err();
        assert!(matches!(err, LoadError::MissingField { field: "channelId", .. }));
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let err = Roster::load(
            vec![remote("a"), remote("a")],
            &AnalysisCache::new(),
            HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateChannel(id) if id == "a"));

        let mut twin = remote("b");
        twin.subscription_id = Some("sub-a".to_string());
        let err = Roster::load(vec![remote("a"), twin], &AnalysisCache::new(), HashSet::new())
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateSubscription(id) if id == "sub-a"));
    }

    #[test]
    fn test_get_unknown() {
        assert!(roster(&["a"]).get("zzz").is_none());
    }

    #[test]
    fn test_set_activity_is_monotonic() {
        let mut roster = roster(&["a"]);
        assert!(!roster.set_activity("a", ActivityState::Pending));
        assert!(roster.set_activity("a", ActivityState::NoUploads));
        // Already resolved: neither reverts nor overwrites
        assert!(!roster.set_activity("a", ActivityState::Pending));
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!roster.set_activity("a", ActivityState::LastUploadAt(at)));
        assert_eq!(roster.get("a").unwrap().activity_state, ActivityState::NoUploads);
    }

    #[test]
    fn test_set_activity_unknown_is_noop() {
        let mut roster = roster(&["a"]);
        assert!(!roster.set_activity("nope", ActivityState::NoUploads));
    }

    #[test]
    fn test_toggle_favorite_round_trip() {
        let mut roster = roster(&["a", "b"]);
        let set = roster.toggle_favorite("a").unwrap().clone();
        assert_eq!(set, HashSet::from(["a".to_string()]));
        assert!(roster.get("a").unwrap().is_favorite);

        let set = roster.toggle_favorite("a").unwrap();
        assert!(set.is_empty());
        assert!(!roster.get("a").unwrap().is_favorite);

        assert!(roster.toggle_favorite("missing").is_none());
    }

    #[test]
    fn test_mark_unsubscribed_returns_changed_only() {
        let mut roster = roster(&["a", "b", "c"]);
        let ids: HashSet<String> = ["sub-a".to_string(), "sub-c".to_string(), "sub-x".to_string()].into();

        let changed = roster.mark_unsubscribed(&ids);
        let changed_ids: Vec<_> = changed.iter().map(|c| c.channel_id.as_str()).collect();
        assert_eq!(changed_ids, vec!["a", "c"]);
        assert!(changed.iter().all(|c| !c.is_subscribed));
        assert!(roster.get("b").unwrap().is_subscribed);
        assert_eq!(roster.len(), 3);

        // Second call changes nothing
        assert!(roster.mark_unsubscribed(&ids).is_empty());
    }

    #[test]
    fn test_pending_skips_unsubscribed() {
        let mut roster = roster(&["a", "b"]);
        roster.mark_unsubscribed(&HashSet::from(["sub-a".to_string()]));
        let pending: Vec<_> = roster.pending().iter().map(|c| c.channel_id.clone()).collect();
        assert_eq!(pending, vec!["b".to_string()]);
    }

    #[test]
    fn test_categories_sorted_distinct() {
        let mut records = vec![remote("a"), remote("b"), remote("c")];
        records[0].category = Some("Music".to_string());
        records[1].category = Some("Gaming".to_string());
        records[2].category = Some("Music".to_string());
        let roster = Roster::load(records, &AnalysisCache::new(), HashSet::new()).unwrap();
        assert_eq!(roster.categories(), vec!["Gaming", "Music"]);
    }
}
