use chrono::NaiveDate;
use serde::Deserialize;

use episodic_core::models::NewEpisode;

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub data: LoginData,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}

/// `GET /series/{id}/episodes/default/{lang}`
#[derive(Debug, Deserialize)]
pub struct SeriesEpisodesResponse {
    pub data: SeriesEpisodes,
    pub links: Option<Links>,
}

#[derive(Debug, Deserialize)]
pub struct SeriesEpisodes {
    pub series: TvdbSeries,
    #[serde(default)]
    pub episodes: Vec<TvdbEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct TvdbSeries {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvdbEpisode {
    pub id: i64,
    pub season_number: i32,
    pub number: i32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub aired: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Links {
    pub next: Option<String>,
}

impl TvdbEpisode {
    pub fn into_new_episode(self) -> NewEpisode {
        NewEpisode {
            id: self.id,
            season: self.season_number,
            number: self.number,
            title: self.name,
            overview: self.overview,
            first_aired_ms: self.aired.as_deref().map_or(-1, aired_to_ms),
        }
    }
}

/// `YYYY-MM-DD` at midnight UTC, in ms since epoch. Unparseable dates are unknown (`-1`).
pub fn aired_to_ms(aired: &str) -> i64 {
    NaiveDate::parse_from_str(aired, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or(-1, |dt| dt.and_utc().timestamp_millis())
}
