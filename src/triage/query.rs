use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::channel::Channel;
use super::classify::Policy;
use super::roster::Roster;

/// Which subset of channels a view shows.
///
/// Parsing from a string reserves `all`, `target`, `star` and `deleted`; a
/// category with one of those names has to be built as `Tab::Category`
/// directly (the CLI's `--category` flag does this).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    All,
    /// Exact match on `Channel::category`.
    Category(String),
    Target,
    /// Favorites.
    Star,
    /// Deletion history instead of the live roster.
    Deleted,
}

impl FromStr for Tab {
    type Err = std::convert::Infallible;

    /// Reserved names map to their tab; any other string is a category.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "all" => Tab::All,
            "target" => Tab::Target,
            "star" => Tab::Star,
            "deleted" => Tab::Deleted,
            other => Tab::Category(other.to_string()),
        })
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tab::All => f.write_str("all"),
            Tab::Category(c) => f.write_str(c),
            Tab::Target => f.write_str("target"),
            Tab::Star => f.write_str("star"),
            Tab::Deleted => f.write_str("deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    SubDesc,
    SubAsc,
    DateDesc,
    DateAsc,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key {0:?} (expected sub-desc, sub-asc, date-desc or date-asc)")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sub-desc" => Ok(SortKey::SubDesc),
            "sub-asc" => Ok(SortKey::SubAsc),
            "date-desc" => Ok(SortKey::DateDesc),
            "date-asc" => Ok(SortKey::DateAsc),
            other => Err(UnknownSortKey(other.to_string())),
        }
    }
}

/// Transient UI state driving a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub tab: Tab,
    /// `None` keeps roster order.
    pub sort: Option<SortKey>,
    pub threshold_months: u32,
}

/// Upload time used for date sorting; unresolved channels sort as the epoch.
fn sort_timestamp(channel: &Channel) -> DateTime<Utc> {
    channel
        .activity_state
        .last_upload()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Produce the ordered list of channels to render for `view`.
///
/// The `deleted` tab returns `history` as-is, in its stored order, bypassing
/// classification and sorting. Every other tab filters the live roster, then
/// applies a stable sort so ties keep roster order.
pub fn query<'a>(
    roster: &'a Roster,
    history: &'a [Channel],
    view: &ViewState,
    now: DateTime<Utc>,
) -> Vec<&'a Channel> {
    if view.tab == Tab::Deleted {
        return history.iter().collect();
    }

    let policy = Policy::new(view.threshold_months, now);
    let mut rows: Vec<&Channel> = roster
        .channels()
        .iter()
        .filter(|c| match &view.tab {
            Tab::All => true,
            Tab::Category(category) => &c.category == category,
            Tab::Target => policy.is_target(c),
            Tab::Star => c.is_favorite,
            Tab::Deleted => false,
        })
        .collect();

    match view.sort {
        None => {}
        Some(SortKey::SubDesc) => rows.sort_by(|a, b| b.subscriber_count.cmp(&a.subscriber_count)),
        Some(SortKey::SubAsc) => rows.sort_by_key(|c| c.subscriber_count),
        Some(SortKey::DateDesc) => rows.sort_by(|a, b| sort_timestamp(b).cmp(&sort_timestamp(a))),
        Some(SortKey::DateAsc) => rows.sort_by_key(|c| sort_timestamp(c)),
    }

    rows
}
