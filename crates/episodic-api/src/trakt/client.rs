use reqwest::{Client, Method, RequestBuilder, StatusCode};

use episodic_core::models::{FlagColumn, OutboundFlagRecord, ShowStateMap};

use super::error::TraktError;
use super::types::{build_show_state_map, BaseShow, SyncItems, SyncResponse};
use crate::traits::TrackingService;

const BASE_URL: &str = "https://api.trakt.tv";
const API_VERSION: &str = "2";

/// trakt API v2 client for the sync endpoints.
pub struct TraktClient {
    client_id: String,
    access_token: String,
    base_url: String,
    http: Client,
}

impl TraktClient {
    pub fn new(client_id: String, access_token: String) -> Self {
        Self::with_base_url(client_id, access_token, BASE_URL.to_string())
    }

    pub fn with_base_url(client_id: String, access_token: String, base_url: String) -> Self {
        Self {
            client_id,
            access_token,
            base_url,
            http: Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json")
            .header("trakt-api-version", API_VERSION)
            .header("trakt-api-key", &self.client_id)
            .bearer_auth(&self.access_token)
    }

    /// Check the HTTP response for errors and return the body text on failure.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, TraktError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("trakt rejected the access token");
            return Err(TraktError::Unauthorized);
        }
        let status = status.as_u16();
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status, "trakt API error");
        Err(TraktError::Api {
            status,
            message: body,
        })
    }

    async fn get_shows(&self, path: &str) -> Result<Vec<BaseShow>, TraktError> {
        let resp = self.request(Method::GET, path).send().await?;
        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| TraktError::Parse(e.to_string()))
    }

    /// Raw `/sync/collection/shows`.
    pub async fn collection_shows(&self) -> Result<Vec<BaseShow>, TraktError> {
        self.get_shows("/sync/collection/shows").await
    }

    /// Raw `/sync/watched/shows`.
    pub async fn watched_show_list(&self) -> Result<Vec<BaseShow>, TraktError> {
        self.get_shows("/sync/watched/shows").await
    }

    /// Add items to, or remove them from, the watched history or the collection.
    pub async fn sync(
        &self,
        column: FlagColumn,
        add: bool,
        items: &SyncItems,
    ) -> Result<SyncResponse, TraktError> {
        let resp = self
            .request(Method::POST, sync_path(column, add))
            .json(items)
            .send()
            .await?;
        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| TraktError::Parse(e.to_string()))
    }
}

/// Sync endpoint for a flag column and direction.
pub fn sync_path(column: FlagColumn, add: bool) -> &'static str {
    match (column, add) {
        (FlagColumn::Watched, true) => "/sync/history",
        (FlagColumn::Watched, false) => "/sync/history/remove",
        (FlagColumn::Collected, true) => "/sync/collection",
        (FlagColumn::Collected, false) => "/sync/collection/remove",
    }
}

impl TrackingService for TraktClient {
    type Error = TraktError;

    async fn collected_shows(&self) -> Result<ShowStateMap, TraktError> {
        Ok(build_show_state_map(self.collection_shows().await?))
    }

    async fn watched_shows(&self) -> Result<ShowStateMap, TraktError> {
        Ok(build_show_state_map(self.watched_show_list().await?))
    }

    async fn submit_flags(&self, record: &OutboundFlagRecord) -> Result<(), TraktError> {
        let items = SyncItems::from_record(record);
        let resp = self.sync(record.action.column(), record.flag, &items).await?;
        let changed = if record.flag {
            resp.added.map(|c| c.episodes)
        } else {
            resp.deleted.map(|c| c.episodes)
        };
        tracing::debug!(
            show_id = record.show_id,
            action = ?record.action,
            flag = record.flag,
            episodes = changed.unwrap_or(0),
            "Submitted flags to trakt"
        );
        Ok(())
    }
}
