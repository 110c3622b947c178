use serde::{Deserialize, Serialize};

use episodic_core::models::{OutboundFlagRecord, ShowState, ShowStateMap};

// ── Sync responses ──────────────────────────────────────────────

/// One show of `/sync/collection/shows` or `/sync/watched/shows`.
#[derive(Debug, Deserialize)]
pub struct BaseShow {
    pub show: TraktShow,
    #[serde(default)]
    pub seasons: Vec<BaseSeason>,
}

#[derive(Debug, Deserialize)]
pub struct TraktShow {
    pub title: Option<String>,
    pub ids: TraktIds,
}

#[derive(Debug, Deserialize)]
pub struct TraktIds {
    pub trakt: Option<u64>,
    pub tvdb: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BaseSeason {
    pub number: i32,
    #[serde(default)]
    pub episodes: Vec<BaseEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct BaseEpisode {
    pub number: i32,
}

/// Key trakt shows by their TVDB id. Shows without one can not be matched
/// to the library and are skipped.
pub fn build_show_state_map(shows: Vec<BaseShow>) -> ShowStateMap {
    let mut map = ShowStateMap::with_capacity(shows.len());
    for base in shows {
        let Some(tvdb_id) = base.show.ids.tvdb else {
            tracing::debug!(title = ?base.show.title, "Skipping trakt show without TVDB id");
            continue;
        };
        let state = map.entry(tvdb_id).or_insert_with(ShowState::default);
        for season in base.seasons {
            for episode in season.episodes {
                state.insert(season.number, episode.number);
            }
        }
    }
    map
}

#[derive(Debug, Deserialize)]
pub struct SyncResponse {
    pub added: Option<SyncCounts>,
    pub deleted: Option<SyncCounts>,
}

#[derive(Debug, Deserialize)]
pub struct SyncCounts {
    #[serde(default)]
    pub episodes: u32,
}

// ── Sync requests ───────────────────────────────────────────────

/// Body of the `/sync/history` and `/sync/collection` endpoints.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncItems {
    pub shows: Vec<SyncShow>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncShow {
    pub ids: SyncIds,
    /// Empty means the whole show.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<SyncSeason>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncIds {
    pub tvdb: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncSeason {
    pub number: i32,
    /// Empty means the whole season.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<SyncEpisode>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncEpisode {
    pub number: i32,
}

impl SyncItems {
    /// Group the record's episodes by season, keeping their order.
    pub fn from_record(record: &OutboundFlagRecord) -> Self {
        let mut seasons: Vec<SyncSeason> = Vec::new();
        for episode in &record.episodes {
            let index = match seasons.iter().position(|s| s.number == episode.season) {
                Some(index) => index,
                None => {
                    seasons.push(SyncSeason {
                        number: episode.season,
                        episodes: Vec::new(),
                    });
                    seasons.len() - 1
                }
            };
            if !episode.is_whole_season() {
                seasons[index].episodes.push(SyncEpisode {
                    number: episode.episode,
                });
            }
        }

        Self {
            shows: vec![SyncShow {
                ids: SyncIds {
                    tvdb: record.show_id,
                },
                seasons,
            }],
        }
    }
}
