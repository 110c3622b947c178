//! Flag task: mark episodes, seasons or shows watched or collected.
//!
//! The local library is always updated. When trakt credentials are stored the
//! change is also written to the outbound queue, which the replay worker sends
//! later; the task itself never talks to trakt beyond preparing a session.

use serde::Serialize;
use tokio::task::JoinHandle;

use episodic_core::config::NumberFormat;
use episodic_core::models::{
    AiredBefore, EpisodeRef, FlagAction, FlagColumn, FlagRequest, OutboundFlagRecord,
};

use crate::events::{ChangeTopic, TaskEvent};
use crate::traits::{EventSink, LocalStore, OutboundQueue, TrackingAccess};
use crate::TaskError;

/// Terminal result of one flag task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagOutcome {
    pub action: FlagAction,
    pub show_id: i64,
    pub item_id: i64,
    pub success: bool,
    /// Whether trakt was involved.
    pub remote: bool,
    /// Outbound queue id of the submitted change.
    pub queued: Option<i64>,
    /// Local rows changed.
    pub changed: usize,
}

pub struct FlagTask<S, T, Q, E> {
    store: S,
    tracking: T,
    queue: Q,
    events: E,
    number_format: NumberFormat,
}

impl<S, T, Q, E> FlagTask<S, T, Q, E>
where
    S: LocalStore,
    T: TrackingAccess,
    Q: OutboundQueue,
    E: EventSink,
{
    pub fn new(store: S, tracking: T, queue: Q, events: E) -> Self {
        Self {
            store,
            tracking,
            queue,
            events,
            number_format: NumberFormat::default(),
        }
    }

    pub fn with_number_format(mut self, number_format: NumberFormat) -> Self {
        self.number_format = number_format;
        self
    }

    /// Run on a background task.
    pub fn spawn(self, request: FlagRequest) -> JoinHandle<FlagOutcome>
    where
        S: 'static,
        T: 'static,
        Q: 'static,
        E: 'static,
    {
        tokio::spawn(async move { self.run(&request).await })
    }

    pub async fn run(&self, request: &FlagRequest) -> FlagOutcome {
        let action = request.action();
        tracing::debug!(
            show_id = request.show_id(),
            item_id = request.item_id(),
            ?action,
            flag = request.flag(),
            "Flag task started"
        );

        let remote = self.tracking.has_valid_credentials().await;
        let mut success = true;
        let mut queued = None;
        if remote {
            match self.submit(request).await {
                Ok(id) => queued = id,
                Err(e) => {
                    tracing::warn!(
                        show_id = request.show_id(),
                        ?action,
                        error = %e,
                        "Could not queue flag change for trakt"
                    );
                    success = false;
                }
            }
        }

        let changed = match self.apply_locally(request).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(
                    show_id = request.show_id(),
                    ?action,
                    error = %e,
                    "Could not update local flags"
                );
                success = false;
                0
            }
        };
        self.store.notify_changed(ChangeTopic::Episodes);

        self.events.publish(TaskEvent::FlagCompleted {
            action,
            show_id: request.show_id(),
            item_id: request.item_id(),
            success,
        });
        if remote {
            self.events.publish(TaskEvent::FlagStatus {
                message: self.status_message(request, success),
                success,
            });
        }

        FlagOutcome {
            action,
            show_id: request.show_id(),
            item_id: request.item_id(),
            success,
            remote,
            queued,
            changed,
        }
    }

    /// Prepare a trakt session and queue the change. `Ok(None)` when there is
    /// nothing to send.
    async fn submit(&self, request: &FlagRequest) -> Result<Option<i64>, TaskError> {
        self.tracking.prepare_session().await?;

        let Some(episodes) = self.resolve_episodes(request).await? else {
            return Ok(None);
        };
        let record = OutboundFlagRecord {
            show_id: request.show_id(),
            action: request.action(),
            episodes,
            flag: request.flag(),
        };
        let id = self.queue.enqueue(record).await?;
        tracing::debug!(id, show_id = request.show_id(), "Queued flag change");
        Ok(Some(id))
    }

    /// Episodes to send. Adding a season or show uses a wildcard; removals and
    /// "previous" flags list concrete episodes.
    async fn resolve_episodes(
        &self,
        request: &FlagRequest,
    ) -> Result<Option<Vec<EpisodeRef>>, TaskError> {
        let filter = match request.action() {
            FlagAction::EpisodeWatched | FlagAction::EpisodeCollected => {
                return Ok(Some(vec![EpisodeRef::new(
                    request.season(),
                    request.episode(),
                )]));
            }
            FlagAction::SeasonWatched if request.flag() => {
                return Ok(Some(vec![EpisodeRef::whole_season(request.season())]));
            }
            FlagAction::ShowWatched if request.flag() => return Ok(Some(Vec::new())),
            FlagAction::EpisodeWatchedPrevious => match previous_filter(request) {
                Some(filter) => Some(filter),
                None => return Ok(None),
            },
            FlagAction::SeasonWatched | FlagAction::ShowWatched => None,
        };

        let episodes: Vec<_> = self
            .store
            .query_episodes(request.scope(), filter)
            .await?
            .into_iter()
            .map(|row| EpisodeRef::new(row.season, row.number))
            .collect();

        // An empty removal list would read as the whole-show wildcard.
        if episodes.is_empty() {
            tracing::debug!(show_id = request.show_id(), "No episodes to send");
            return Ok(None);
        }
        Ok(Some(episodes))
    }

    async fn apply_locally(&self, request: &FlagRequest) -> Result<usize, TaskError> {
        let column = request.action().column();
        if request.action() == FlagAction::EpisodeWatchedPrevious {
            let Some(filter) = previous_filter(request) else {
                return Ok(0);
            };
            return self
                .store
                .update_flag(request.scope(), column, true, Some(filter))
                .await;
        }
        self.store
            .update_flag(request.scope(), column, request.flag(), None)
            .await
    }

    fn status_message(&self, request: &FlagRequest, success: bool) -> String {
        let subject = match request.action() {
            FlagAction::EpisodeWatched | FlagAction::EpisodeCollected => Some(
                self.number_format
                    .format(request.season(), request.episode()),
            ),
            FlagAction::SeasonWatched => Some(self.number_format.format(request.season(), -1)),
            FlagAction::EpisodeWatchedPrevious | FlagAction::ShowWatched => None,
        };
        let status = if success {
            "submitted to trakt"
        } else {
            "trakt submission failed"
        };
        match subject {
            Some(subject) => {
                let verb = match (request.action().column(), request.flag()) {
                    (FlagColumn::Watched, true) => "watched",
                    (FlagColumn::Watched, false) => "not watched",
                    (FlagColumn::Collected, true) => "collected",
                    (FlagColumn::Collected, false) => "not collected",
                };
                format!("{subject} {verb}: {status}")
            }
            None if success => "Submitted to trakt".to_string(),
            None => "trakt submission failed".to_string(),
        }
    }
}

/// Air date filter of a "previous" request; `None` when the cutoff is unknown.
fn previous_filter(request: &FlagRequest) -> Option<AiredBefore> {
    (request.first_aired_ms() > 0).then(|| AiredBefore(request.first_aired_ms()))
}
