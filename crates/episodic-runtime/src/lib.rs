pub mod add_show;
pub mod connectivity;
mod db;
pub mod events;
pub mod flag;
pub mod outbound;
pub mod remote;
pub mod store;
pub mod traits;

#[cfg(test)]
mod fakes;

use std::sync::Arc;

use chrono::{Duration, Utc};

use episodic_api::tvdb::TvdbClient;
use episodic_core::config::AppConfig;
use episodic_core::error::EpisodicError;
use episodic_core::models::{EpisodeRow, Show};

pub use add_show::{AddShowTask, AddShowsOutcome};
pub use connectivity::TcpProbe;
pub use db::DbHandle;
pub use events::{ChangeTopic, EventBus, TaskEvent};
pub use flag::{FlagOutcome, FlagTask};
pub use outbound::{OutboundReplayer, ReplaySummary, RetryPolicy};
pub use remote::TraktRemote;
pub use store::LibraryStore;

/// Errors the tasks classify and report. They never abort a task abnormally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("no network connection")]
    Offline,
    #[error("trakt credentials are missing, invalid or expired")]
    RemoteAuth,
    #[error("remote service error: {0}")]
    RemoteApi(String),
    /// Retrying cannot help (client error or malformed response).
    #[error("remote service rejected the request: {0}")]
    RemoteRejected(String),
    #[error("show {0} does not exist in the catalog")]
    RemoteItemNotFound(i64),
    #[error("local store error: {0}")]
    LocalStore(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<EpisodicError> for TaskError {
    fn from(e: EpisodicError) -> Self {
        Self::LocalStore(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Library = LibraryStore<TvdbClient>;
pub type AppFlagTask = FlagTask<Library, TraktRemote, DbHandle, EventBus>;
pub type AppAddShowTask = AddShowTask<Library, TraktRemote, TcpProbe, EventBus>;

/// Wires the database, the remote clients and the event bus together.
pub struct Runtime {
    db: DbHandle,
    config: AppConfig,
    events: EventBus,
    catalog: Arc<TvdbClient>,
}

impl Runtime {
    /// Load the user config and open the library database.
    pub fn new() -> Result<Self, RuntimeError> {
        let config = AppConfig::load().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db = DbHandle::open(&db_path).map_err(|e| RuntimeError::Database(e.to_string()))?;
        Ok(Self::with_parts(config, db))
    }

    pub fn with_parts(config: AppConfig, db: DbHandle) -> Self {
        let catalog = Arc::new(TvdbClient::new(config.tvdb.api_key.clone()));
        Self {
            db,
            config,
            events: EventBus::new(),
            catalog,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db_handle(&self) -> DbHandle {
        self.db.clone()
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn library(&self) -> Library {
        LibraryStore::new(
            self.db.clone(),
            Arc::clone(&self.catalog),
            self.events.clone(),
        )
    }

    pub fn tracking(&self) -> TraktRemote {
        TraktRemote::new(self.db.clone(), self.config.trakt.client_id.clone())
    }

    pub fn flag_task(&self) -> AppFlagTask {
        FlagTask::new(
            self.library(),
            self.tracking(),
            self.db.clone(),
            self.events.clone(),
        )
        .with_number_format(self.config.display.number_format)
    }

    pub fn add_show_task(&self) -> AppAddShowTask {
        AddShowTask::new(
            self.library(),
            self.tracking(),
            TcpProbe::from(&self.config.network),
            self.events.clone(),
            self.config.cloud.signed_in,
        )
    }

    pub fn replayer(&self) -> OutboundReplayer<TraktRemote, DbHandle> {
        OutboundReplayer::new(
            self.tracking(),
            self.db.clone(),
            RetryPolicy::from(&self.config.outbound),
        )
    }

    /// Store a trakt access token. `expires_in` is in seconds.
    pub async fn login_trakt(
        &self,
        token: String,
        expires_in: Option<i64>,
    ) -> Result<(), RuntimeError> {
        let expires_at = match expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|d| Utc::now().checked_add_signed(d))
                    .ok_or_else(|| RuntimeError::Config(format!("invalid expiry: {secs}s")))?
                    .to_rfc3339(),
            ),
            None => None,
        };
        self.db
            .save_service_token(remote::TRAKT_SERVICE, token, None, expires_at)
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        tracing::info!("Saved trakt credentials");
        Ok(())
    }

    pub async fn search(&self, query: &str) -> Result<Vec<EpisodeRow>, RuntimeError> {
        self.db
            .search_episodes(query)
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))
    }

    pub async fn show(&self, show_id: i64) -> Result<Option<Show>, RuntimeError> {
        self.db
            .get_show(show_id)
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))
    }

    pub async fn pending_outbound(&self) -> Result<usize, RuntimeError> {
        self.db
            .outbound_len()
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TrackingAccess;
    use episodic_core::models::FlagRequest;

    fn runtime() -> Runtime {
        Runtime::with_parts(AppConfig::default(), DbHandle::open_memory().unwrap())
    }

    #[tokio::test]
    async fn test_login_enables_remote() {
        let rt = runtime();
        assert!(!rt.tracking().has_valid_credentials().await);

        rt.login_trakt("token".into(), Some(3600)).await.unwrap();
        assert!(rt.tracking().has_valid_credentials().await);
    }

    #[tokio::test]
    async fn test_flag_task_queues_when_logged_in() {
        let rt = runtime();
        rt.login_trakt("token".into(), None).await.unwrap();

        let request = FlagRequest::builder(81189).flag(true).show_watched();
        let outcome = rt.flag_task().spawn(request).await.unwrap();

        assert!(outcome.success);
        assert!(outcome.queued.is_some());
        assert_eq!(rt.pending_outbound().await.unwrap(), 1);
    }

    #[test]
    fn test_store_errors_become_task_errors() {
        let err = TaskError::from(EpisodicError::Config("boom".into()));
        assert_eq!(err, TaskError::LocalStore("config error: boom".into()));
    }
}
