//! In-memory collaborators for task tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Notify, Semaphore};

use episodic_core::models::{
    AiredBefore, EpisodeRow, EpisodeScope, FlagColumn, OutboundFlagRecord, QueuedFlagRecord,
    SearchResult, ShowState, ShowStateMap,
};

use crate::events::{ChangeTopic, TaskEvent};
use crate::traits::{Connectivity, EventSink, LocalStore, OutboundQueue, TrackingAccess};
use crate::TaskError;

// ── Outbound queue ──────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeQueue {
    inner: Arc<Mutex<QueueState>>,
}

#[derive(Default)]
struct QueueState {
    records: VecDeque<QueuedFlagRecord>,
    parked: Vec<(QueuedFlagRecord, String)>,
    next_id: i64,
    fail_enqueue: bool,
}

impl FakeQueue {
    pub fn failing() -> Self {
        let queue = Self::default();
        queue.inner.lock().unwrap().fail_enqueue = true;
        queue
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<OutboundFlagRecord> {
        let state = self.inner.lock().unwrap();
        state.records.iter().map(|q| q.record.clone()).collect()
    }

    pub fn parked(&self) -> Vec<(OutboundFlagRecord, String)> {
        let state = self.inner.lock().unwrap();
        state
            .parked
            .iter()
            .map(|(q, reason)| (q.record.clone(), reason.clone()))
            .collect()
    }

    pub fn attempts(&self, id: i64) -> Option<u32> {
        let state = self.inner.lock().unwrap();
        state.records.iter().find(|q| q.id == id).map(|q| q.attempts)
    }
}

impl OutboundQueue for FakeQueue {
    async fn enqueue(&self, record: OutboundFlagRecord) -> Result<i64, TaskError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_enqueue {
            return Err(TaskError::LocalStore("disk full".into()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.records.push_back(QueuedFlagRecord {
            id,
            record,
            attempts: 0,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn peek(&self) -> Result<Option<QueuedFlagRecord>, TaskError> {
        Ok(self.inner.lock().unwrap().records.front().cloned())
    }

    async fn remove(&self, id: i64) -> Result<(), TaskError> {
        self.inner.lock().unwrap().records.retain(|q| q.id != id);
        Ok(())
    }

    async fn record_attempt(&self, id: i64) -> Result<u32, TaskError> {
        let mut state = self.inner.lock().unwrap();
        let queued = state
            .records
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| TaskError::LocalStore(format!("no record {id}")))?;
        queued.attempts += 1;
        Ok(queued.attempts)
    }

    async fn park(&self, id: i64, reason: &str) -> Result<(), TaskError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(pos) = state.records.iter().position(|q| q.id == id) {
            if let Some(queued) = state.records.remove(pos) {
                state.parked.push((queued, reason.to_string()));
            }
        }
        Ok(())
    }
}

// ── Tracking service ────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeTracking {
    inner: Arc<Mutex<TrackingState>>,
}

#[derive(Default)]
struct TrackingState {
    credentials: bool,
    prepare_error: Option<TaskError>,
    collected: Option<Result<ShowStateMap, TaskError>>,
    watched: Option<Result<ShowStateMap, TaskError>>,
    submit_script: VecDeque<Result<(), TaskError>>,
    submitted: Vec<OutboundFlagRecord>,
    fetches: Vec<&'static str>,
}

impl FakeTracking {
    pub fn with_credentials() -> Self {
        let tracking = Self::default();
        tracking.inner.lock().unwrap().credentials = true;
        tracking
    }

    pub fn without_credentials() -> Self {
        Self::default()
    }

    pub fn fail_prepare(&self, error: TaskError) {
        self.inner.lock().unwrap().prepare_error = Some(error);
    }

    pub fn set_collected(&self, result: Result<ShowStateMap, TaskError>) {
        self.inner.lock().unwrap().collected = Some(result);
    }

    pub fn set_watched(&self, result: Result<ShowStateMap, TaskError>) {
        self.inner.lock().unwrap().watched = Some(result);
    }

    /// Results of the next `submit` calls; once used up, submissions succeed.
    pub fn script_submit(&self, results: impl IntoIterator<Item = Result<(), TaskError>>) {
        self.inner.lock().unwrap().submit_script.extend(results);
    }

    /// Every record passed to `submit`, failed attempts included.
    pub fn submitted(&self) -> Vec<OutboundFlagRecord> {
        self.inner.lock().unwrap().submitted.clone()
    }

    pub fn fetches(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().fetches.clone()
    }
}

impl TrackingAccess for FakeTracking {
    async fn has_valid_credentials(&self) -> bool {
        self.inner.lock().unwrap().credentials
    }

    async fn prepare_session(&self) -> Result<(), TaskError> {
        match self.inner.lock().unwrap().prepare_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fetch_collected_shows(&self) -> Result<ShowStateMap, TaskError> {
        let mut state = self.inner.lock().unwrap();
        state.fetches.push("collected");
        state.collected.clone().unwrap_or_else(|| Ok(ShowStateMap::new()))
    }

    async fn fetch_watched_shows(&self) -> Result<ShowStateMap, TaskError> {
        let mut state = self.inner.lock().unwrap();
        state.fetches.push("watched");
        state.watched.clone().unwrap_or_else(|| Ok(ShowStateMap::new()))
    }

    async fn submit(&self, record: &OutboundFlagRecord) -> Result<(), TaskError> {
        let mut state = self.inner.lock().unwrap();
        state.submitted.push(record.clone());
        state.submit_script.pop_front().unwrap_or(Ok(()))
    }
}

// ── Local store ─────────────────────────────────────────────────

/// One `update_flag` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagUpdate {
    pub scope: EpisodeScope,
    pub column: FlagColumn,
    pub value: bool,
    pub filter: Option<AiredBefore>,
}

/// One `add_show` call.
#[derive(Debug, Clone)]
pub struct AddedShow {
    pub show_id: i64,
    pub collected: Option<ShowState>,
    pub watched: Option<ShowState>,
}

/// Holds `add_show` calls until the test releases them.
pub struct Gate {
    pub entered: Notify,
    pub release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }
}

#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<Mutex<StoreState>>,
    gate: Option<Arc<Gate>>,
}

#[derive(Default)]
struct StoreState {
    episodes: Vec<EpisodeRow>,
    fail_updates: bool,
    updates: Vec<FlagUpdate>,
    notified: Vec<ChangeTopic>,
    add_results: HashMap<i64, Result<bool, TaskError>>,
    added: Vec<AddedShow>,
    merged: Option<bool>,
    rated_resets: usize,
    index_rebuilds: usize,
}

impl FakeStore {
    pub fn with_episodes(episodes: Vec<EpisodeRow>) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().episodes = episodes;
        store
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_updates(&self) {
        self.inner.lock().unwrap().fail_updates = true;
    }

    /// Result of adding `show_id`; shows without one are added.
    pub fn set_add_result(&self, show_id: i64, result: Result<bool, TaskError>) {
        self.inner.lock().unwrap().add_results.insert(show_id, result);
    }

    pub fn updates(&self) -> Vec<FlagUpdate> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn notified(&self) -> Vec<ChangeTopic> {
        self.inner.lock().unwrap().notified.clone()
    }

    pub fn added(&self) -> Vec<AddedShow> {
        self.inner.lock().unwrap().added.clone()
    }

    pub fn merged(&self) -> Option<bool> {
        self.inner.lock().unwrap().merged
    }

    pub fn rated_resets(&self) -> usize {
        self.inner.lock().unwrap().rated_resets
    }

    pub fn index_rebuilds(&self) -> usize {
        self.inner.lock().unwrap().index_rebuilds
    }
}

fn in_scope(row: &EpisodeRow, scope: EpisodeScope) -> bool {
    match scope {
        EpisodeScope::Episode(id) => row.id == id,
        EpisodeScope::Season(id) => row.season_id == id,
        EpisodeScope::Show(id) => row.show_id == id,
    }
}

impl LocalStore for FakeStore {
    async fn query_episodes(
        &self,
        scope: EpisodeScope,
        filter: Option<AiredBefore>,
    ) -> Result<Vec<EpisodeRow>, TaskError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .episodes
            .iter()
            .filter(|row| in_scope(row, scope))
            .filter(|row| filter.map_or(true, |f| f.matches(row.first_aired_ms)))
            .cloned()
            .collect())
    }

    async fn update_flag(
        &self,
        scope: EpisodeScope,
        column: FlagColumn,
        value: bool,
        filter: Option<AiredBefore>,
    ) -> Result<usize, TaskError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_updates {
            return Err(TaskError::LocalStore("database is locked".into()));
        }
        state.updates.push(FlagUpdate {
            scope,
            column,
            value,
            filter,
        });
        let mut changed = 0;
        for row in state.episodes.iter_mut() {
            if in_scope(row, scope) && filter.map_or(true, |f| f.matches(row.first_aired_ms)) {
                match column {
                    FlagColumn::Watched => row.watched = value,
                    FlagColumn::Collected => row.collected = value,
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn notify_changed(&self, topic: ChangeTopic) {
        self.inner.lock().unwrap().notified.push(topic);
    }

    async fn add_show(
        &self,
        show: &SearchResult,
        collected: Option<&ShowState>,
        watched: Option<&ShowState>,
    ) -> Result<bool, TaskError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            if let Ok(permit) = gate.release.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.inner.lock().unwrap();
        state.added.push(AddedShow {
            show_id: show.show_id,
            collected: collected.cloned(),
            watched: watched.cloned(),
        });
        state
            .add_results
            .get(&show.show_id)
            .cloned()
            .unwrap_or(Ok(true))
    }

    async fn set_merged_shows(&self, merged: bool) -> Result<(), TaskError> {
        self.inner.lock().unwrap().merged = Some(merged);
        Ok(())
    }

    async fn reset_rated_timestamps(&self) -> Result<(), TaskError> {
        self.inner.lock().unwrap().rated_resets += 1;
        Ok(())
    }

    async fn rebuild_search_index(&self) -> Result<usize, TaskError> {
        self.inner.lock().unwrap().index_rebuilds += 1;
        Ok(0)
    }
}

// ── Events & connectivity ───────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: TaskEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Answers from a script, then keeps repeating `fallback`.
#[derive(Clone)]
pub struct FakeConnectivity {
    script: Arc<Mutex<VecDeque<bool>>>,
    fallback: bool,
}

impl FakeConnectivity {
    pub fn online() -> Self {
        Self::scripted([], true)
    }

    pub fn offline() -> Self {
        Self::scripted([], false)
    }

    pub fn scripted(script: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            fallback,
        }
    }
}

impl Connectivity for FakeConnectivity {
    async fn is_connected(&self) -> bool {
        self.script.lock().unwrap().pop_front().unwrap_or(self.fallback)
    }
}
