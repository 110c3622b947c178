use std::sync::Arc;

use episodic_api::traits::ShowCatalog;
use episodic_core::models::{
    AiredBefore, EpisodeRow, EpisodeScope, FlagColumn, SearchResult, ShowState,
};

use crate::db::DbHandle;
use crate::events::{ChangeTopic, EventBus, TaskEvent};
use crate::traits::{EventSink, LocalStore};
use crate::TaskError;

/// The library database plus the catalog new shows are fetched from.
pub struct LibraryStore<C> {
    db: DbHandle,
    catalog: Arc<C>,
    events: EventBus,
}

impl<C> Clone for LibraryStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            catalog: Arc::clone(&self.catalog),
            events: self.events.clone(),
        }
    }
}

impl<C: ShowCatalog> LibraryStore<C> {
    pub fn new(db: DbHandle, catalog: Arc<C>, events: EventBus) -> Self {
        Self {
            db,
            catalog,
            events,
        }
    }
}

impl<C: ShowCatalog> LocalStore for LibraryStore<C> {
    async fn query_episodes(
        &self,
        scope: EpisodeScope,
        filter: Option<AiredBefore>,
    ) -> Result<Vec<EpisodeRow>, TaskError> {
        Ok(self.db.query_episodes(scope, filter).await?)
    }

    async fn update_flag(
        &self,
        scope: EpisodeScope,
        column: FlagColumn,
        value: bool,
        filter: Option<AiredBefore>,
    ) -> Result<usize, TaskError> {
        let changed = self.db.update_flag(scope, column, value, filter).await?;
        tracing::debug!(?scope, ?column, value, changed, "Updated episode flags");
        Ok(changed)
    }

    fn notify_changed(&self, topic: ChangeTopic) {
        self.events.publish(TaskEvent::DataChanged { topic });
    }

    async fn add_show(
        &self,
        show: &SearchResult,
        collected: Option<&ShowState>,
        watched: Option<&ShowState>,
    ) -> Result<bool, TaskError> {
        if self.db.show_exists(show.show_id).await? {
            tracing::debug!(show_id = show.show_id, "Show already in library");
            return Ok(false);
        }

        let details = self
            .catalog
            .fetch_show(show.show_id, &show.language)
            .await
            .map_err(|e| TaskError::RemoteApi(e.to_string()))?
            .ok_or(TaskError::RemoteItemNotFound(show.show_id))?;

        let episodes = details.episodes.len();
        self.db
            .insert_show(details, collected.cloned(), watched.cloned())
            .await?;
        tracing::info!(show_id = show.show_id, title = %show.title, episodes, "Added show");
        self.notify_changed(ChangeTopic::Shows);
        Ok(true)
    }

    async fn set_merged_shows(&self, merged: bool) -> Result<(), TaskError> {
        Ok(self.db.set_merged_shows(merged).await?)
    }

    async fn reset_rated_timestamps(&self) -> Result<(), TaskError> {
        Ok(self.db.reset_rated_timestamps().await?)
    }

    async fn rebuild_search_index(&self) -> Result<usize, TaskError> {
        let indexed = self.db.rebuild_search_index().await?;
        tracing::debug!(indexed, "Rebuilt episode search index");
        Ok(indexed)
    }
}
