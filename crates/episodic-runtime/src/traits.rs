//! Collaborators of the flag and add-show tasks.
//!
//! The tasks only see these traits. Production wiring lives in [`crate::store`],
//! [`crate::remote`], [`crate::outbound`], [`crate::events`] and
//! [`crate::connectivity`].

use std::future::Future;

use episodic_core::models::{
    AiredBefore, EpisodeRow, EpisodeScope, FlagColumn, OutboundFlagRecord, QueuedFlagRecord,
    SearchResult, ShowState, ShowStateMap,
};

use crate::events::{ChangeTopic, TaskEvent};
use crate::TaskError;

/// The local library.
pub trait LocalStore: Send + Sync {
    /// Episodes in scope, ordered by season and number.
    fn query_episodes(
        &self,
        scope: EpisodeScope,
        filter: Option<AiredBefore>,
    ) -> impl Future<Output = Result<Vec<EpisodeRow>, TaskError>> + Send;

    /// Set a flag column on every episode in scope. Returns the number of changed rows.
    fn update_flag(
        &self,
        scope: EpisodeScope,
        column: FlagColumn,
        value: bool,
        filter: Option<AiredBefore>,
    ) -> impl Future<Output = Result<usize, TaskError>> + Send;

    /// Tell observers that data under `topic` changed.
    fn notify_changed(&self, topic: ChangeTopic);

    /// Add a show with its episodes, prefilling watched and collected flags.
    ///
    /// `Ok(false)` when the show is already in the library. Fails with
    /// [`TaskError::RemoteItemNotFound`] when the catalog does not know the show.
    fn add_show(
        &self,
        show: &SearchResult,
        collected: Option<&ShowState>,
        watched: Option<&ShowState>,
    ) -> impl Future<Output = Result<bool, TaskError>> + Send;

    fn set_merged_shows(&self, merged: bool) -> impl Future<Output = Result<(), TaskError>> + Send;

    /// Make the next trakt sync download all ratings again.
    fn reset_rated_timestamps(&self) -> impl Future<Output = Result<(), TaskError>> + Send;

    fn rebuild_search_index(&self) -> impl Future<Output = Result<usize, TaskError>> + Send;
}

/// Access to the remote tracking service.
pub trait TrackingAccess: Send + Sync {
    /// Whether a usable access token is stored. Decides if remote work happens at all.
    fn has_valid_credentials(&self) -> impl Future<Output = bool> + Send;

    /// Get an authenticated session ready.
    fn prepare_session(&self) -> impl Future<Output = Result<(), TaskError>> + Send;

    fn fetch_collected_shows(&self)
        -> impl Future<Output = Result<ShowStateMap, TaskError>> + Send;

    fn fetch_watched_shows(&self) -> impl Future<Output = Result<ShowStateMap, TaskError>> + Send;

    /// Send one outbound record.
    fn submit(
        &self,
        record: &OutboundFlagRecord,
    ) -> impl Future<Output = Result<(), TaskError>> + Send;
}

/// Durable FIFO of remote flag changes.
pub trait OutboundQueue: Send + Sync {
    /// Persist a record without any network I/O. Returns its queue id.
    fn enqueue(
        &self,
        record: OutboundFlagRecord,
    ) -> impl Future<Output = Result<i64, TaskError>> + Send;

    /// Oldest live record, if any.
    fn peek(&self) -> impl Future<Output = Result<Option<QueuedFlagRecord>, TaskError>> + Send;

    fn remove(&self, id: i64) -> impl Future<Output = Result<(), TaskError>> + Send;

    /// Count a failed submission. Returns the new attempt count.
    fn record_attempt(&self, id: i64) -> impl Future<Output = Result<u32, TaskError>> + Send;

    /// Move a record that cannot be delivered out of the live queue. It is kept
    /// for inspection, never deleted.
    fn park(&self, id: i64, reason: &str) -> impl Future<Output = Result<(), TaskError>> + Send;
}

/// Fire-and-forget notification sink.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: TaskEvent);
}

/// Network reachability, polled.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> impl Future<Output = bool> + Send;
}
