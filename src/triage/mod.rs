//! Channel triage: the roster, activity analysis, classification, views and
//! bulk removal.

mod channel;
mod classify;
mod mutation;
mod query;
mod roster;
mod scheduler;

pub use channel::{ActivityParseError, ActivityState, AnalysisCache, Channel, RemoteChannel};
pub use classify::{months_between, Classification, Policy, Summary, PROTECTED_SUBSCRIBER_COUNT};
pub use mutation::{execute, MutationError, MutationReport};
pub use query::{query, SortKey, Tab, UnknownSortKey, ViewState};
pub use roster::{LoadError, Roster};
pub use scheduler::{analyze, AnalysisEvent, AnalysisOutcome, AnalyzeOptions};
