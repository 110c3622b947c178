use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;

use episodic_core::models::NewShow;

use super::error::TvdbError;
use super::types::{LoginResponse, SeriesEpisodesResponse, TvdbEpisode};
use crate::traits::ShowCatalog;

const BASE_URL: &str = "https://api4.thetvdb.com/v4";

/// Guards against a series whose `next` link never runs out.
const MAX_EPISODE_PAGES: u32 = 50;

/// TVDB API v4 client. Logs in lazily and caches the bearer token.
pub struct TvdbClient {
    api_key: String,
    base_url: String,
    token: Mutex<Option<String>>,
    http: Client,
}

impl TvdbClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            token: Mutex::new(None),
            http: Client::new(),
        }
    }

    async fn token(&self) -> Result<String, TvdbError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let resp = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&serde_json::json!({ "apikey": self.api_key }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TvdbError::Auth(format!("login failed ({status}): {body}")));
        }
        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| TvdbError::Parse(e.to_string()))?;

        *guard = Some(login.data.token.clone());
        Ok(login.data.token)
    }

    /// Fetch one page of a series' episodes. `Ok(None)` on 404.
    async fn episodes_page(
        &self,
        show_id: i64,
        language: &str,
        page: u32,
    ) -> Result<Option<SeriesEpisodesResponse>, TvdbError> {
        let token = self.token().await?;
        let resp = self
            .http
            .get(format!(
                "{}/series/{show_id}/episodes/default/{language}",
                self.base_url
            ))
            .query(&[("page", page)])
            .bearer_auth(token)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED => {
                // Token expired; the next call logs in again.
                *self.token.lock().await = None;
                return Err(TvdbError::Auth("token rejected".into()));
            }
            status if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(status = status.as_u16(), show_id, "TVDB API error");
                return Err(TvdbError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }
            _ => {}
        }

        resp.json()
            .await
            .map(Some)
            .map_err(|e| TvdbError::Parse(e.to_string()))
    }
}

impl ShowCatalog for TvdbClient {
    type Error = TvdbError;

    async fn fetch_show(&self, show_id: i64, language: &str) -> Result<Option<NewShow>, TvdbError> {
        let Some(first) = self.episodes_page(show_id, language, 0).await? else {
            tracing::debug!(show_id, "TVDB does not know this show");
            return Ok(None);
        };

        let series = first.data.series;
        let mut episodes: Vec<_> = first
            .data
            .episodes
            .into_iter()
            .map(TvdbEpisode::into_new_episode)
            .collect();

        let mut has_next = first.links.and_then(|l| l.next).is_some();
        let mut page = 1;
        while has_next && page < MAX_EPISODE_PAGES {
            let Some(resp) = self.episodes_page(show_id, language, page).await? else {
                break;
            };
            episodes.extend(
                resp.data
                    .episodes
                    .into_iter()
                    .map(TvdbEpisode::into_new_episode),
            );
            has_next = resp.links.and_then(|l| l.next).is_some();
            page += 1;
        }

        tracing::debug!(show_id, episodes = episodes.len(), "Fetched show from TVDB");
        Ok(Some(NewShow {
            id: series.id,
            title: series.name,
            overview: series.overview,
            language: language.to_string(),
            episodes,
        }))
    }
}
