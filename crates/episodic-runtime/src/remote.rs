use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use episodic_api::traits::TrackingService;
use episodic_api::trakt::{TraktClient, TraktError};
use episodic_core::models::{OutboundFlagRecord, ShowStateMap};

use crate::db::DbHandle;
use crate::traits::TrackingAccess;
use crate::TaskError;

pub const TRAKT_SERVICE: &str = "trakt";

/// trakt access backed by the token stored in the database.
#[derive(Clone)]
pub struct TraktRemote {
    db: DbHandle,
    client_id: String,
    session: Arc<Mutex<Option<Arc<TraktClient>>>>,
}

impl TraktRemote {
    pub fn new(db: DbHandle, client_id: String) -> Self {
        Self {
            db,
            client_id,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Stored access token, if it has not expired.
    async fn valid_token(&self) -> Result<Option<String>, TaskError> {
        let Some((token, _refresh, expires_at)) =
            self.db.get_service_token(TRAKT_SERVICE).await?
        else {
            return Ok(None);
        };
        Ok(token_is_valid(&token, expires_at.as_deref(), Utc::now()).then_some(token))
    }

    async fn client(&self) -> Result<Arc<TraktClient>, TaskError> {
        let mut session = self.session.lock().await;
        if let Some(client) = session.as_ref() {
            return Ok(Arc::clone(client));
        }

        let token = self.valid_token().await?.ok_or(TaskError::RemoteAuth)?;
        let client = Arc::new(TraktClient::new(self.client_id.clone(), token));
        *session = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Classify, and forget the session if trakt no longer accepts it.
    async fn check<T>(&self, result: Result<T, TraktError>) -> Result<T, TaskError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let error = classify(e);
                if error == TaskError::RemoteAuth {
                    *self.session.lock().await = None;
                }
                Err(error)
            }
        }
    }
}

fn token_is_valid(token: &str, expires_at: Option<&str>, now: DateTime<Utc>) -> bool {
    if token.is_empty() {
        return false;
    }
    match expires_at {
        None => true,
        Some(expires_at) => DateTime::parse_from_rfc3339(expires_at)
            .map(|at| at.with_timezone(&Utc) > now)
            .unwrap_or(false),
    }
}

/// Map a trakt failure onto the task error taxonomy.
pub fn classify(error: TraktError) -> TaskError {
    match error {
        TraktError::Unauthorized => TaskError::RemoteAuth,
        TraktError::Http(e) if e.is_connect() || e.is_timeout() => TaskError::Offline,
        e if e.is_permanent() => TaskError::RemoteRejected(e.to_string()),
        e => TaskError::RemoteApi(e.to_string()),
    }
}

impl TrackingAccess for TraktRemote {
    async fn has_valid_credentials(&self) -> bool {
        match self.valid_token().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                tracing::error!(error = %e, "Could not read trakt credentials");
                false
            }
        }
    }

    async fn prepare_session(&self) -> Result<(), TaskError> {
        self.client().await.map(|_| ())
    }

    async fn fetch_collected_shows(&self) -> Result<ShowStateMap, TaskError> {
        let client = self.client().await?;
        let shows = self.check(client.collected_shows().await).await?;
        tracing::debug!(shows = shows.len(), "Fetched trakt collection");
        Ok(shows)
    }

    async fn fetch_watched_shows(&self) -> Result<ShowStateMap, TaskError> {
        let client = self.client().await?;
        let shows = self.check(client.watched_shows().await).await?;
        tracing::debug!(shows = shows.len(), "Fetched trakt watched shows");
        Ok(shows)
    }

    async fn submit(&self, record: &OutboundFlagRecord) -> Result<(), TaskError> {
        let client = self.client().await?;
        self.check(client.submit_flags(record).await).await
    }
}
