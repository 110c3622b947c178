mod flag;
mod show;

pub use flag::{
    AiredBefore, EpisodeRef, EpisodeScope, FlagAction, FlagColumn, FlagRequest,
    FlagRequestBuilder, OutboundFlagRecord, QueuedFlagRecord,
};
pub use show::{
    EpisodeRow, NewEpisode, NewShow, SearchResult, Show, ShowState, ShowStateMap, TraktShowStates,
};
