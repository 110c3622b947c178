//! Add-show task: drain a queue of search results into the library.
//!
//! Shows can be appended while the task drains. Once the queue runs dry the
//! task is finished and refuses more work; callers then start a new task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use episodic_core::models::{SearchResult, TraktShowStates};

use crate::events::TaskEvent;
use crate::traits::{Connectivity, EventSink, LocalStore, TrackingAccess};
use crate::TaskError;

/// Terminal result of one add-show run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AddShowsOutcome {
    /// Nothing was queued.
    QueueEmpty,
    /// No network at start; the queue is kept.
    Offline,
    /// trakt state could not be fetched; the queue is kept.
    RemoteFailed,
    Cancelled,
    Finished {
        added: usize,
        existing: usize,
        failed: usize,
        merge_completed: bool,
    },
}

/// Per-show result of the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShowResult {
    Added,
    Exists,
    Error,
}

/// Reasons a whole run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    Offline,
    TraktApi,
    TraktAuth,
}

impl Abort {
    fn message(self) -> &'static str {
        match self {
            Self::Offline => "No connection. Try again once you are online.",
            Self::TraktApi => "trakt is having trouble. Please try again later.",
            Self::TraktAuth => "trakt did not accept your credentials. Please sign in again.",
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<SearchResult>,
    finished: bool,
    silent: bool,
    merging: bool,
}

struct Inner<S, T, N, E> {
    state: Mutex<QueueState>,
    store: S,
    tracking: T,
    connectivity: N,
    events: E,
    cloud_signed_in: bool,
    cancel: CancellationToken,
}

/// Handle to one add-show task. Clones share the queue.
pub struct AddShowTask<S, T, N, E> {
    inner: Arc<Inner<S, T, N, E>>,
}

impl<S, T, N, E> Clone for AddShowTask<S, T, N, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, T, N, E> AddShowTask<S, T, N, E>
where
    S: LocalStore,
    T: TrackingAccess,
    N: Connectivity,
    E: EventSink,
{
    /// `cloud_signed_in` skips the trakt state fetch: the cloud backup provides
    /// watched and collected flags instead.
    pub fn new(store: S, tracking: T, connectivity: N, events: E, cloud_signed_in: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                store,
                tracking,
                connectivity,
                events,
                cloud_signed_in,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Queue shows. Returns `false`, leaving the queue alone, once the task has
    /// finished.
    ///
    /// `silent` replaces the previous value. `merging` sticks once set, so a
    /// cloud merge keeps its bookkeeping even if later batches are plain adds.
    pub fn add_shows(
        &self,
        shows: impl IntoIterator<Item = SearchResult>,
        silent: bool,
        merging: bool,
    ) -> bool {
        let mut state = self.state();
        if state.finished {
            tracing::debug!("Add-show task already finished, refusing shows");
            return false;
        }
        state.silent = silent;
        state.merging |= merging;
        let before = state.pending.len();
        state.pending.extend(shows);
        tracing::debug!(queued = state.pending.len() - before, "Queued shows to add");
        true
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }

    /// Stop before the next show. The show being added completes.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn spawn(&self) -> JoinHandle<AddShowsOutcome>
    where
        S: 'static,
        T: 'static,
        N: 'static,
        E: 'static,
    {
        let task = self.clone();
        tokio::spawn(async move { task.run().await })
    }

    pub async fn run(&self) -> AddShowsOutcome {
        let Some(first) = self.state().pending.front().cloned() else {
            tracing::debug!("Add-show queue empty");
            return AddShowsOutcome::QueueEmpty;
        };
        tracing::debug!(show_id = first.show_id, "Starting to add shows");

        if !self.inner.connectivity.is_connected().await {
            tracing::info!("Not adding shows, no connection");
            self.publish_abort(Abort::Offline);
            return AddShowsOutcome::Offline;
        }

        let trakt_states = if !self.inner.cloud_signed_in
            && self.inner.tracking.has_valid_credentials().await
        {
            match self.fetch_trakt_states().await {
                Ok(states) => Some(states),
                Err(outcome) => return outcome,
            }
        } else {
            if self.inner.cancel.is_cancelled() {
                return AddShowsOutcome::Cancelled;
            }
            None
        };

        self.drain(trakt_states.as_ref()).await
    }

    async fn fetch_trakt_states(&self) -> Result<TraktShowStates, AddShowsOutcome> {
        tracing::debug!("Getting watched and collected episodes from trakt");
        if self.inner.cancel.is_cancelled() {
            return Err(AddShowsOutcome::Cancelled);
        }
        let collected = self
            .inner
            .tracking
            .fetch_collected_shows()
            .await
            .map_err(|e| self.remote_failure("collection", e))?;

        if self.inner.cancel.is_cancelled() {
            return Err(AddShowsOutcome::Cancelled);
        }
        let watched = self
            .inner
            .tracking
            .fetch_watched_shows()
            .await
            .map_err(|e| self.remote_failure("watched", e))?;

        Ok(TraktShowStates { collected, watched })
    }

    fn remote_failure(&self, what: &str, error: TaskError) -> AddShowsOutcome {
        tracing::warn!(what, error = %error, "Could not get shows from trakt");
        let abort = match error {
            TaskError::RemoteAuth => Abort::TraktAuth,
            _ => Abort::TraktApi,
        };
        self.publish_abort(abort);
        AddShowsOutcome::RemoteFailed
    }

    async fn drain(&self, trakt_states: Option<&TraktShowStates>) -> AddShowsOutcome {
        let mut added = 0;
        let mut existing = 0;
        let mut failed = 0;
        let mut merge_failed = false;

        loop {
            if self.inner.cancel.is_cancelled() {
                tracing::debug!("Add-show task cancelled");
                return AddShowsOutcome::Cancelled;
            }
            let Some(show) = self.pop() else {
                break;
            };

            if !self.inner.connectivity.is_connected().await {
                tracing::info!(show_id = show.show_id, "Connection lost, dropping remaining shows");
                self.publish_abort(Abort::Offline);
                merge_failed = true;
                self.finish();
                break;
            }

            let collected = trakt_states.and_then(|s| s.collected.get(&show.show_id));
            let watched = trakt_states.and_then(|s| s.watched.get(&show.show_id));
            let result = match self.inner.store.add_show(&show, collected, watched).await {
                Ok(true) => {
                    added += 1;
                    ShowResult::Added
                }
                Ok(false) => {
                    existing += 1;
                    ShowResult::Exists
                }
                Err(e) => {
                    failed += 1;
                    // A show gone from the catalog must not fail a cloud merge.
                    let not_found = matches!(e, TaskError::RemoteItemNotFound(_));
                    if !(self.state().merging && not_found) {
                        merge_failed = true;
                    }
                    tracing::error!(show_id = show.show_id, error = %e, "Adding show failed");
                    ShowResult::Error
                }
            };
            self.publish_result(&show, result);
        }

        let merging = self.state().merging;
        let merge_completed = merging && !merge_failed && self.mark_merged().await;

        if added > 0 {
            if let Err(e) = self.inner.store.reset_rated_timestamps().await {
                tracing::error!(error = %e, "Could not reset rating timestamps");
            }
            tracing::debug!("Renewing search index");
            if let Err(e) = self.inner.store.rebuild_search_index().await {
                tracing::error!(error = %e, "Could not rebuild search index");
            }
        }

        tracing::info!(added, existing, failed, merge_completed, "Finished adding shows");
        self.inner.events.publish(TaskEvent::AddShowsFinished {
            added,
            merge_completed,
        });
        AddShowsOutcome::Finished {
            added,
            existing,
            failed,
            merge_completed,
        }
    }

    async fn mark_merged(&self) -> bool {
        match self.inner.store.set_merged_shows(true).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Could not record completed cloud merge");
                false
            }
        }
    }

    /// Next show, or `None` after marking the task finished.
    fn pop(&self) -> Option<SearchResult> {
        let mut state = self.state();
        let next = state.pending.pop_front();
        if next.is_none() {
            state.finished = true;
        }
        next
    }

    fn finish(&self) {
        let mut state = self.state();
        state.pending.clear();
        state.finished = true;
    }

    fn publish_result(&self, show: &SearchResult, result: ShowResult) {
        let (message, successful) = match result {
            ShowResult::Added => (None, true),
            ShowResult::Exists => (
                Some(format!("{} is already in your library", show.title)),
                true,
            ),
            ShowResult::Error => (Some(format!("Could not add {}", show.title)), false),
        };
        self.publish(TaskEvent::ShowAdded {
            show_id: Some(show.show_id),
            message,
            successful,
        });
    }

    fn publish_abort(&self, abort: Abort) {
        self.publish(TaskEvent::ShowAdded {
            show_id: None,
            message: Some(abort.message().to_string()),
            successful: false,
        });
    }

    fn publish(&self, event: TaskEvent) {
        if self.state().silent {
            tracing::debug!(?event, "Silent mode, not publishing progress");
            return;
        }
        self.inner.events.publish(event);
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
