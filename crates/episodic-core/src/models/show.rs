use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// A show picked from search results, waiting to be added to the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub show_id: i64,
    pub title: String,
    pub language: String,
}

/// A show in the local library.
#[derive(Debug, Clone, Serialize)]
pub struct Show {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub language: String,
}

/// An episode row in the local library.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRow {
    pub id: i64,
    pub show_id: i64,
    pub season_id: i64,
    pub season: i32,
    pub number: i32,
    pub title: Option<String>,
    /// Milliseconds since epoch, non-positive when unknown.
    pub first_aired_ms: i64,
    pub watched: bool,
    pub collected: bool,
}

/// Catalog data for a show about to be inserted.
#[derive(Debug, Clone)]
pub struct NewShow {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub language: String,
    pub episodes: Vec<NewEpisode>,
}

#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub id: i64,
    pub season: i32,
    pub number: i32,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub first_aired_ms: i64,
}

/// Episodes of one show that trakt reports as watched or collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowState {
    seasons: BTreeMap<i32, BTreeSet<i32>>,
}

impl ShowState {
    pub fn insert(&mut self, season: i32, episode: i32) {
        self.seasons.entry(season).or_default().insert(episode);
    }

    pub fn contains(&self, season: i32, episode: i32) -> bool {
        self.seasons
            .get(&season)
            .is_some_and(|episodes| episodes.contains(&episode))
    }

    pub fn is_empty(&self) -> bool {
        self.seasons.values().all(BTreeSet::is_empty)
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.values().map(BTreeSet::len).sum()
    }
}

/// Show states keyed by show id.
pub type ShowStateMap = HashMap<i64, ShowState>;

/// Collected and watched snapshots fetched once per add-show run.
#[derive(Debug, Clone, Default)]
pub struct TraktShowStates {
    pub collected: ShowStateMap,
    pub watched: ShowStateMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_state() {
        let mut state = ShowState::default();
        assert!(state.is_empty());

        state.insert(1, 1);
        state.insert(1, 2);
        state.insert(2, 1);
        state.insert(1, 2);

        assert!(state.contains(1, 2));
        assert!(!state.contains(2, 2));
        assert_eq!(state.episode_count(), 3);
        assert!(!state.is_empty());
    }
}
