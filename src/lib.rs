//! Audit a channel subscription list and bulk-remove the inactive channels.
//!
//! The pipeline: [`app::Session::start`] seeds a [`triage::Roster`] from the
//! backend and local records, [`triage::analyze`] resolves each channel's last
//! upload, [`triage::Policy`] classifies, [`triage::query`] produces views, and
//! [`triage::execute`] performs bulk removal.

pub mod app;
pub mod backend;
pub mod config;
pub mod storage;
pub mod triage;
pub mod util;
