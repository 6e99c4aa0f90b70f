use chrono::{DateTime, Datelike, Utc};

use super::channel::{ActivityState, Channel};

/// Channels with at least this many subscribers are never removal targets.
///
/// Fixed policy: not user-configurable.
pub const PROTECTED_SUBSCRIBER_COUNT: u64 = 100_000;

/// Whole calendar months from `from` to `to`: `(year * 12 + month)` difference.
///
/// Day of month is ignored, so Jan 31 → Feb 1 is one month and Feb 1 → Feb 28
/// is zero. Negative when `from` is later than `to`.
pub fn months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let index = |d: DateTime<Utc>| i64::from(d.year()) * 12 + i64::from(d.month0());
    index(to) - index(from)
}

/// Derived flags for one channel under a [`Policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub old: bool,
    pub protected: bool,
    pub target: bool,
}

/// Recency threshold plus the reference time it is measured from.
///
/// Every classification is a pure function of `(channel, policy)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub threshold_months: u32,
    pub now: DateTime<Utc>,
}

impl Policy {
    pub fn new(threshold_months: u32, now: DateTime<Utc>) -> Self {
        Self {
            threshold_months,
            now,
        }
    }

    /// No uploads ever, or the last upload is at least `threshold_months` old.
    /// `Pending` is never old.
    pub fn is_old(&self, channel: &Channel) -> bool {
        match channel.activity_state {
            ActivityState::Pending => false,
            ActivityState::NoUploads => true,
            ActivityState::LastUploadAt(at) => {
                months_between(at, self.now) >= i64::from(self.threshold_months)
            }
        }
    }

    pub fn is_protected(&self, channel: &Channel) -> bool {
        channel.is_favorite || channel.subscriber_count >= PROTECTED_SUBSCRIBER_COUNT
    }

    pub fn is_target(&self, channel: &Channel) -> bool {
        channel.is_subscribed && self.is_old(channel) && !self.is_protected(channel)
    }

    pub fn classify(&self, channel: &Channel) -> Classification {
        let old = self.is_old(channel);
        let protected = self.is_protected(channel);
        Classification {
            old,
            protected,
            target: channel.is_subscribed && old && !protected,
        }
    }

    /// Dashboard counts over subscribed channels.
    pub fn summarize<'a>(&self, channels: impl IntoIterator<Item = &'a Channel>) -> Summary {
        let mut summary = Summary::default();
        for channel in channels.into_iter().filter(|c| c.is_subscribed) {
            let class = self.classify(channel);
            summary.subscribed += 1;
            summary.pending += usize::from(channel.activity_state.is_pending());
            summary.old += usize::from(class.old);
            summary.protected += usize::from(class.protected);
            summary.favorites += usize::from(channel.is_favorite);
            summary.targets += usize::from(class.target);
        }
        summary
    }
}

/// Counts shown in the status header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub subscribed: usize,
    pub pending: usize,
    pub old: usize,
    pub protected: usize,
    pub favorites: usize,
    pub targets: usize,
}
