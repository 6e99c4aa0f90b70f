use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;

use super::channel::{ActivityState, AnalysisCache};
use super::roster::Roster;
use crate::backend::Backend;
use crate::config::Config;
use crate::storage::{KvStore, RecordStore};

/// Tuning for an analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Chunk size: the most requests ever in flight at once.
    pub concurrency: usize,
    /// Attempts per channel while the backend keeps answering 429.
    pub max_attempts: u32,
    /// Fixed delay before retrying a rate-limited request.
    pub backoff: Duration,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl AnalyzeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency(),
            max_attempts: config.max_attempts(),
            backoff: config.rate_limit_backoff(),
        }
    }
}

/// Notifications emitted while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    /// A chunk settled and its results were applied and cached.
    Progress {
        /// Zero-based chunk index.
        chunk: usize,
        completed: usize,
        total: usize,
    },
    /// A request was rate limited and will be retried after `retry_in`.
    RateLimited {
        channel_id: String,
        attempt: u32,
        retry_in: Duration,
    },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// No subscribed channel was pending.
    NothingToDo,
    Completed {
        total: usize,
        /// Channels resolved from a real backend answer.
        resolved: usize,
        /// Channels defaulted to `NoUploads` after a failure or exhausted retries.
        fallbacks: usize,
    },
    /// The session expired mid-run. Channels not yet analyzed stay `Pending`.
    Aborted { completed: usize, remaining: usize },
}

enum Verdict {
    Resolved(ActivityState),
    Fallback,
    Unauthorized,
}

async fn send_event(events: Option<&mpsc::Sender<AnalysisEvent>>, event: AnalysisEvent) {
    if let Some(tx) = events {
        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, "Analysis event channel closed (receiver dropped)");
        }
    }
}

/// Analyze one channel, retrying rate-limited attempts up to `max_attempts`.
async fn analyze_one<B: Backend>(
    backend: &B,
    channel_id: &str,
    options: &AnalyzeOptions,
    events: Option<&mpsc::Sender<AnalysisEvent>>,
) -> Verdict {
    let mut attempt = 1;
    loop {
        match backend.analyze_channel(channel_id).await {
            Ok(state) if state.is_resolved() => return Verdict::Resolved(state),
            Ok(_) => {
                tracing::warn!(channel_id = %channel_id, "Backend returned unresolved state, defaulting to no uploads");
                return Verdict::Fallback;
            }
            Err(e) if e.is_rate_limited() && attempt < options.max_attempts => {
                tracing::warn!(
                    channel_id = %channel_id,
                    attempt = attempt,
                    delay_ms = options.backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                send_event(
                    events,
                    AnalysisEvent::RateLimited {
                        channel_id: channel_id.to_string(),
                        attempt,
                        retry_in: options.backoff,
                    },
                )
                .await;
                tokio::time::sleep(options.backoff).await;
                attempt += 1;
            }
            Err(e) if e.is_unauthorized() => return Verdict::Unauthorized,
            Err(e) => {
                tracing::warn!(
                    channel_id = %channel_id,
                    attempt = attempt,
                    error = %e,
                    "Analysis failed, defaulting to no uploads"
                );
                return Verdict::Fallback;
            }
        }
    }
}

/// Resolve the activity of every subscribed `Pending` channel in the roster.
///
/// Channels are split into consecutive chunks of `options.concurrency`. A
/// chunk's requests run concurrently and the next chunk starts only after every
/// request in the current one has settled, so at most `concurrency` requests
/// are ever in flight.
///
/// After each chunk:
/// - all of its results are applied to the roster in one step
/// - they are merged into the analysis cache (write-through)
/// - an [`AnalysisEvent::Progress`] is sent
///
/// Per-channel failures never stop the run: a transport or decode error, or a
/// rate limit that persists through `max_attempts`, resolves the channel to
/// `NoUploads`. Only an expired session aborts the run.
pub async fn analyze<B: Backend, S: KvStore>(
    roster: &mut Roster,
    backend: &B,
    records: &RecordStore<S>,
    options: &AnalyzeOptions,
    events: Option<mpsc::Sender<AnalysisEvent>>,
) -> AnalysisOutcome {
    let pending: Vec<String> = roster
        .pending()
        .into_iter()
        .map(|c| c.channel_id.clone())
        .collect();

    if pending.is_empty() {
        tracing::info!("No pending channels to analyze");
        return AnalysisOutcome::NothingToDo;
    }

    let total = pending.len();
    let chunk_size = options.concurrency.max(1);
    let (mut completed, mut resolved, mut fallbacks) = (0, 0, 0);
    tracing::info!(total = total, chunk_size = chunk_size, "Starting analysis");

    for (chunk, ids) in pending.chunks(chunk_size).enumerate() {
        let verdicts = join_all(ids.iter().map(|id| {
            let events = events.as_ref();
            async move { (id, analyze_one(backend, id, options, events).await) }
        }))
        .await;

        let mut results = AnalysisCache::new();
        let mut unauthorized = false;
        for (id, verdict) in verdicts {
            let state = match verdict {
                Verdict::Resolved(state) => {
                    resolved += 1;
                    state
                }
                Verdict::Fallback => {
                    fallbacks += 1;
                    ActivityState::NoUploads
                }
                Verdict::Unauthorized => {
                    unauthorized = true;
                    continue;
                }
            };
            if roster.set_activity(id, state) {
                results.insert(id.clone(), state);
            }
        }

        completed += results.len();
        records.merge_analysis(&results).await;
        tracing::debug!(chunk = chunk, completed = completed, total = total, "Chunk settled");
        send_event(
            events.as_ref(),
            AnalysisEvent::Progress {
                chunk,
                completed,
                total,
            },
        )
        .await;

        if unauthorized {
            tracing::warn!(
                completed = completed,
                remaining = total - completed,
                "Session expired during analysis, stopping"
            );
            return AnalysisOutcome::Aborted {
                completed,
                remaining: total - completed,
            };
        }
    }

    tracing::info!(
        total = total,
        resolved = resolved,
        fallbacks = fallbacks,
        "Analysis complete"
    );
    AnalysisOutcome::Completed {
        total,
        resolved,
        fallbacks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BulkUnsubscribeResponse, UserInfo};
    use crate::storage::MemoryStore;
    use crate::triage::RemoteChannel;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Reply {
        State(ActivityState),
        RateLimited,
        Fail,
        Unauthorized,
    }

    /// Scripted analyze endpoint that tracks concurrency.
    #[derive(Default)]
    struct FakeBackend {
        script: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeBackend {
        fn script(self, channel_id: &str, replies: &[Reply]) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(channel_id.to_string(), replies.iter().copied().collect());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, channel_id: &str) -> usize {
            self.calls().iter().filter(|c| *c == channel_id).count()
        }
    }

    fn default_upload() -> ActivityState {
        ActivityState::LastUploadAt(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    impl Backend for FakeBackend {
        async fn auth_status(&self) -> Result<bool, BackendError> {
            Ok(true)
        }

        async fn user_info(&self) -> Result<UserInfo, BackendError> {
            Ok(UserInfo::default())
        }

        async fn list_channels(&self) -> Result<Vec<RemoteChannel>, BackendError> {
            Ok(Vec::new())
        }

        async fn analyze_channel(&self, channel_id: &str) -> Result<ActivityState, BackendError> {
            self.calls.lock().unwrap().push(channel_id.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let reply = self
                .script
                .lock()
                .unwrap()
                .get_mut(channel_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Reply::State(default_upload()));
            match reply {
                Reply::State(state) => Ok(state),
                Reply::RateLimited => Err(BackendError::RateLimited),
                Reply::Fail => Err(BackendError::HttpStatus(500)),
                Reply::Unauthorized => Err(BackendError::Unauthorized),
            }
        }

        async fn bulk_unsubscribe(
            &self,
            _subscription_ids: &[String],
        ) -> Result<BulkUnsubscribeResponse, BackendError> {
            Err(BackendError::HttpStatus(501))
        }
    }

    fn remote(id: &str) -> RemoteChannel {
        RemoteChannel {
            channel_id: Some(id.to_string()),
            subscription_id: Some(format!("sub-{id}")),
            title: Some(id.to_string()),
            ..RemoteChannel::default()
        }
    }

    /// `total` channels, of which the first `resolved` are already cached.
    fn roster(total: usize, resolved: usize) -> Roster {
        let mut cache = AnalysisCache::new();
        for i in 0..resolved {
            cache.insert(format!("ch{i}"), ActivityState::NoUploads);
        }
        let records = (0..total).map(|i| remote(&format!("ch{i}"))).collect();
        Roster::load(records, &cache, HashSet::new()).unwrap()
    }

    fn fast() -> AnalyzeOptions {
        AnalyzeOptions {
            backoff: Duration::from_millis(1),
            ..AnalyzeOptions::default()
        }
    }

    async fn drain(mut rx: mpsc::Receiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_two_chunks_for_seven_pending() {
        let mut roster = roster(12, 5);
        let backend = FakeBackend::default();
        let records = RecordStore::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(32);

        let outcome = analyze(&mut roster, &backend, &records, &fast(), Some(tx)).await;

        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                total: 7,
                resolved: 7,
                fallbacks: 0
            }
        );
        let progress: Vec<_> = drain(rx)
            .await
            .into_iter()
            .filter_map(|e| match e {
                AnalysisEvent::Progress { chunk, completed, total } => Some((chunk, completed, total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(0, 5, 7), (1, 7, 7)]);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 5);
        assert_eq!(backend.calls().len(), 7);
        assert!(roster.pending().is_empty());

        let cache = records.analysis_cache().await;
        let new_keys = (5..12).filter(|i| cache.contains_key(&format!("ch{i}"))).count();
        assert_eq!(new_keys, 7);
        // Channels resolved from the previous session were never re-requested
        assert_eq!(backend.calls_for("ch0"), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stop_run() {
        let mut roster = roster(7, 0);
        let backend = FakeBackend::default();
        let records = RecordStore::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = analyze(&mut roster, &backend, &records, &fast(), Some(tx)).await;

        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                total: 7,
                resolved: 7,
                fallbacks: 0
            }
        );
        assert!(roster.pending().is_empty());
        assert_eq!(records.analysis_cache().await.len(), 7);
    }

    #[tokio::test]
    async fn test_nothing_to_do() {
        let mut roster = roster(3, 3);
        let backend = FakeBackend::default();
        let records = RecordStore::new(MemoryStore::new());

        let outcome = analyze(&mut roster, &backend, &records, &fast(), None).await;
        assert_eq!(outcome, AnalysisOutcome::NothingToDo);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let mut roster = roster(10, 0);
        let backend = FakeBackend::default();
        let records = RecordStore::new(MemoryStore::new());
        let options = AnalyzeOptions {
            concurrency: 3,
            ..fast()
        };

        analyze(&mut roster, &backend, &records, &options, None).await;
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(backend.calls().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success_keeps_real_value() {
        let real = ActivityState::LastUploadAt(Utc.with_ymd_and_hms(2023, 3, 3, 0, 0, 0).unwrap());
        let mut roster = roster(1, 0);
        let backend = FakeBackend::default().script("ch0", &[Reply::RateLimited, Reply::State(real)]);
        let records = RecordStore::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(32);
        let options = AnalyzeOptions::default();

        let started = tokio::time::Instant::now();
        let outcome = analyze(&mut roster, &backend, &records, &options, Some(tx)).await;

        assert!(started.elapsed() >= options.backoff);
        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                total: 1,
                resolved: 1,
                fallbacks: 0
            }
        );
        assert_eq!(roster.get("ch0").unwrap().activity_state, real);
        assert_eq!(backend.calls_for("ch0"), 2);
        let events = drain(rx).await;
        assert!(events.contains(&AnalysisEvent::RateLimited {
            channel_id: "ch0".to_string(),
            attempt: 1,
            retry_in: options.backoff,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausted_falls_back() {
        let mut roster = roster(1, 0);
        let backend = FakeBackend::default().script(
            "ch0",
            &[Reply::RateLimited, Reply::RateLimited, Reply::RateLimited, Reply::State(default_upload())],
        );
        let records = RecordStore::new(MemoryStore::new());

        let outcome = analyze(&mut roster, &backend, &records, &AnalyzeOptions::default(), None).await;

        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                total: 1,
                resolved: 0,
                fallbacks: 1
            }
        );
        assert_eq!(backend.calls_for("ch0"), 3);
        assert_eq!(roster.get("ch0").unwrap().activity_state, ActivityState::NoUploads);
    }

    #[tokio::test]
    async fn test_failure_falls_back_without_blocking_siblings() {
        let mut roster = roster(3, 0);
        let backend = FakeBackend::default().script("ch1", &[Reply::Fail]);
        let records = RecordStore::new(MemoryStore::new());

        let outcome = analyze(&mut roster, &backend, &records, &fast(), None).await;

        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                total: 3,
                resolved: 2,
                fallbacks: 1
            }
        );
        assert_eq!(roster.get("ch1").unwrap().activity_state, ActivityState::NoUploads);
        assert_eq!(roster.get("ch0").unwrap().activity_state, default_upload());
        assert_eq!(backend.calls_for("ch1"), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_aborts_after_chunk() {
        let mut roster = roster(8, 0);
        let backend = FakeBackend::default().script("ch2", &[Reply::Unauthorized]);
        let records = RecordStore::new(MemoryStore::new());
        let options = AnalyzeOptions {
            concurrency: 4,
            ..fast()
        };

        let outcome = analyze(&mut roster, &backend, &records, &options, None).await;

        assert_eq!(
            outcome,
            AnalysisOutcome::Aborted {
                completed: 3,
                remaining: 5
            }
        );
        // Second chunk never started
        assert_eq!(backend.calls().len(), 4);
        assert!(roster.get("ch2").unwrap().activity_state.is_pending());
        assert_eq!(roster.pending().len(), 5);
        assert_eq!(records.analysis_cache().await.len(), 3);
    }

    #[tokio::test]
    async fn test_resume_after_reload_skips_cached() {
        let store = MemoryStore::new();
        let records = RecordStore::new(store);
        let backend = FakeBackend::default().script("ch3", &[Reply::Unauthorized]);
        let options = AnalyzeOptions {
            concurrency: 3,
            ..fast()
        };

        // First session: first chunk (ch0..ch2) succeeds, second chunk aborts
        let mut first = roster(6, 0);
        analyze(&mut first, &backend, &records, &options, None).await;

        // Reload from the same store and resume
        let cache = records.analysis_cache().await;
        let records_list = (0..6).map(|i| remote(&format!("ch{i}"))).collect();
        let mut second = Roster::load(records_list, &cache, HashSet::new()).unwrap();
        analyze(&mut second, &backend, &records, &options, None).await;

        for id in ["ch0", "ch1", "ch2"] {
            assert_eq!(backend.calls_for(id), 1, "{id} was re-requested");
        }
        assert!(second.pending().is_empty());
    }
}
