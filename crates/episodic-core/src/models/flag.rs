use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a flag request changes, and at which granularity it is sent to trakt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagAction {
    EpisodeWatched,
    EpisodeCollected,
    /// Every episode that aired before a given episode.
    EpisodeWatchedPrevious,
    SeasonWatched,
    ShowWatched,
}

impl FlagAction {
    /// The episode column this action writes.
    pub fn column(self) -> FlagColumn {
        match self {
            Self::EpisodeCollected => FlagColumn::Collected,
            Self::EpisodeWatched
            | Self::EpisodeWatchedPrevious
            | Self::SeasonWatched
            | Self::ShowWatched => FlagColumn::Watched,
        }
    }

    /// Database string representation.
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::EpisodeWatched => "episode_watched",
            Self::EpisodeCollected => "episode_collected",
            Self::EpisodeWatchedPrevious => "episode_watched_previous",
            Self::SeasonWatched => "season_watched",
            Self::ShowWatched => "show_watched",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "episode_watched" => Some(Self::EpisodeWatched),
            "episode_collected" => Some(Self::EpisodeCollected),
            "episode_watched_previous" => Some(Self::EpisodeWatchedPrevious),
            "season_watched" => Some(Self::SeasonWatched),
            "show_watched" => Some(Self::ShowWatched),
            _ => None,
        }
    }
}

/// Boolean episode attribute touched by a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagColumn {
    Watched,
    Collected,
}

impl FlagColumn {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Watched => "watched",
            Self::Collected => "collected",
        }
    }
}

/// One episode in a remote submission. An episode of `-1` marks the whole season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub season: i32,
    pub episode: i32,
}

impl EpisodeRef {
    pub const fn new(season: i32, episode: i32) -> Self {
        Self { season, episode }
    }

    pub const fn whole_season(season: i32) -> Self {
        Self {
            season,
            episode: -1,
        }
    }

    pub fn is_whole_season(&self) -> bool {
        self.episode < 0
    }
}

/// Which episode rows a local query or update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeScope {
    /// A single episode row.
    Episode(i64),
    /// All episodes of a season row.
    Season(i64),
    /// All episodes of a show.
    Show(i64),
}

/// Matches episodes that aired strictly before the cutoff (ms since epoch).
/// Unknown air dates are stored as non-positive values and never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiredBefore(pub i64);

impl AiredBefore {
    pub fn matches(&self, first_aired_ms: i64) -> bool {
        first_aired_ms > 0 && first_aired_ms < self.0
    }
}

/// An immutable request to flag one item. Built with [`FlagRequest::builder`];
/// each terminal builder method picks exactly one [`FlagAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRequest {
    show_id: i64,
    item_id: i64,
    season: i32,
    episode: i32,
    first_aired_ms: i64,
    flag: bool,
    action: FlagAction,
}

impl FlagRequest {
    pub fn builder(show_id: i64) -> FlagRequestBuilder {
        FlagRequestBuilder {
            show_id,
            item_id: 0,
            flag: true,
        }
    }

    pub fn show_id(&self) -> i64 {
        self.show_id
    }

    /// Episode row id, season row id, or show id depending on the action.
    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    pub fn season(&self) -> i32 {
        self.season
    }

    pub fn episode(&self) -> i32 {
        self.episode
    }

    pub fn first_aired_ms(&self) -> i64 {
        self.first_aired_ms
    }

    /// `true` adds the flag, `false` removes it.
    pub fn flag(&self) -> bool {
        self.flag
    }

    pub fn action(&self) -> FlagAction {
        self.action
    }

    /// Local rows touched by this request.
    pub fn scope(&self) -> EpisodeScope {
        match self.action {
            FlagAction::EpisodeWatched | FlagAction::EpisodeCollected => {
                EpisodeScope::Episode(self.item_id)
            }
            FlagAction::SeasonWatched => EpisodeScope::Season(self.item_id),
            FlagAction::EpisodeWatchedPrevious | FlagAction::ShowWatched => {
                EpisodeScope::Show(self.show_id)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlagRequestBuilder {
    show_id: i64,
    item_id: i64,
    flag: bool,
}

impl FlagRequestBuilder {
    /// Set the row id of the episode or season.
    pub fn item_id(mut self, item_id: i64) -> Self {
        self.item_id = item_id;
        self
    }

    /// Whether to add or remove the flag. Ignored by
    /// [`episode_watched_previous`](Self::episode_watched_previous), which always adds.
    pub fn flag(mut self, flag: bool) -> Self {
        self.flag = flag;
        self
    }

    pub fn episode_watched(self, season: i32, episode: i32) -> FlagRequest {
        self.finish(FlagAction::EpisodeWatched, season, episode, 0)
    }

    pub fn episode_collected(self, season: i32, episode: i32) -> FlagRequest {
        self.finish(FlagAction::EpisodeCollected, season, episode, 0)
    }

    /// Flag every episode that aired before `first_aired_ms` as watched.
    pub fn episode_watched_previous(mut self, first_aired_ms: i64) -> FlagRequest {
        self.flag = true;
        self.finish(FlagAction::EpisodeWatchedPrevious, -1, -1, first_aired_ms)
    }

    pub fn season_watched(self, season: i32) -> FlagRequest {
        self.finish(FlagAction::SeasonWatched, season, -1, 0)
    }

    pub fn show_watched(mut self) -> FlagRequest {
        self.item_id = self.show_id;
        self.finish(FlagAction::ShowWatched, -1, -1, 0)
    }

    fn finish(self, action: FlagAction, season: i32, episode: i32, first_aired_ms: i64) -> FlagRequest {
        FlagRequest {
            show_id: self.show_id,
            item_id: self.item_id,
            season,
            episode,
            first_aired_ms,
            flag: self.flag,
            action,
        }
    }
}

/// A remote flag change waiting in the durable outbound queue.
///
/// An empty `episodes` list on a [`FlagAction::ShowWatched`] record flags the
/// whole show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFlagRecord {
    pub show_id: i64,
    pub action: FlagAction,
    pub episodes: Vec<EpisodeRef>,
    pub flag: bool,
}

/// A persisted [`OutboundFlagRecord`] with its queue bookkeeping.
#[derive(Debug, Clone)]
pub struct QueuedFlagRecord {
    pub id: i64,
    pub record: OutboundFlagRecord,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}
