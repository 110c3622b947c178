use clap::{Parser, Subcommand};

use episodic_core::models::{FlagRequest, SearchResult};

#[derive(Debug, Parser)]
#[command(name = "episodic", version)]
#[command(about = "Track watched and collected TV episodes, synced with trakt", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a trakt access token
    Login {
        token: String,
        /// Seconds until the token expires
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Add shows to the library by TVDB id
    Add {
        #[arg(required = true)]
        tvdb_ids: Vec<i64>,
        #[arg(long, default_value = "en")]
        language: String,
        /// Do not report per-show progress
        #[arg(long)]
        silent: bool,
        /// The shows come from the cloud backup
        #[arg(long)]
        merge: bool,
    },
    /// Mark episodes watched or collected
    Flag {
        #[command(subcommand)]
        target: FlagTarget,
    },
    /// Send queued flag changes to trakt
    Replay,
    /// Full-text search over episodes
    Search { query: String },
}

#[derive(Debug, Subcommand)]
pub enum FlagTarget {
    /// One episode
    Episode {
        show: i64,
        episode_row: i64,
        season: i32,
        number: i32,
        /// Remove the flag instead of setting it
        #[arg(long)]
        unset: bool,
        /// Flag as collected instead of watched
        #[arg(long)]
        collected: bool,
    },
    /// Every episode that aired before the given time
    Previous {
        show: i64,
        episode_row: i64,
        /// Air time of the episode, ms since epoch
        first_aired_ms: i64,
    },
    /// A whole season
    Season {
        show: i64,
        season_row: i64,
        season: i32,
        #[arg(long)]
        unset: bool,
    },
    /// A whole show
    Show {
        show: i64,
        #[arg(long)]
        unset: bool,
    },
}

impl FlagTarget {
    pub fn into_request(self) -> FlagRequest {
        match self {
            Self::Episode {
                show,
                episode_row,
                season,
                number,
                unset,
                collected,
            } => {
                let builder = FlagRequest::builder(show).item_id(episode_row).flag(!unset);
                if collected {
                    builder.episode_collected(season, number)
                } else {
                    builder.episode_watched(season, number)
                }
            }
            Self::Previous {
                show,
                episode_row,
                first_aired_ms,
            } => FlagRequest::builder(show)
                .item_id(episode_row)
                .episode_watched_previous(first_aired_ms),
            Self::Season {
                show,
                season_row,
                season,
                unset,
            } => FlagRequest::builder(show)
                .item_id(season_row)
                .flag(!unset)
                .season_watched(season),
            Self::Show { show, unset } => FlagRequest::builder(show).flag(!unset).show_watched(),
        }
    }
}

/// Search results for ids given on the command line. Titles are filled in
/// once the catalog has been asked.
pub fn search_results(tvdb_ids: &[i64], language: &str) -> Vec<SearchResult> {
    tvdb_ids
        .iter()
        .map(|&show_id| SearchResult {
            show_id,
            title: format!("TVDB {show_id}"),
            language: language.to_string(),
        })
        .collect()
}
