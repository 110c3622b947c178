use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use episodic_core::error::EpisodicError;
use episodic_core::models::{
    AiredBefore, EpisodeRow, EpisodeScope, FlagColumn, NewShow, OutboundFlagRecord,
    QueuedFlagRecord, Show, ShowState,
};
use episodic_core::storage::{Storage, TokenRecord};

type Reply<T> = oneshot::Sender<Result<T, EpisodicError>>;

/// Handle to the database actor. The connection lives on a dedicated thread;
/// every call is a message to it, so calls are serialised.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::UnboundedSender<DbCommand>,
}

enum DbCommand {
    GetShow {
        show_id: i64,
        reply: Reply<Option<Show>>,
    },
    ShowExists {
        show_id: i64,
        reply: Reply<bool>,
    },
    InsertShow {
        show: Box<NewShow>,
        collected: Option<ShowState>,
        watched: Option<ShowState>,
        reply: Reply<()>,
    },
    QueryEpisodes {
        scope: EpisodeScope,
        filter: Option<AiredBefore>,
        reply: Reply<Vec<EpisodeRow>>,
    },
    UpdateFlag {
        scope: EpisodeScope,
        column: FlagColumn,
        value: bool,
        filter: Option<AiredBefore>,
        reply: Reply<usize>,
    },
    RebuildSearchIndex {
        reply: Reply<usize>,
    },
    SearchEpisodes {
        query: String,
        reply: Reply<Vec<EpisodeRow>>,
    },
    SetMergedShows {
        merged: bool,
        reply: Reply<()>,
    },
    HasMergedShows {
        reply: Reply<bool>,
    },
    ResetRatedTimestamps {
        reply: Reply<()>,
    },
    SaveServiceToken {
        service: String,
        token: String,
        refresh: Option<String>,
        expires_at: Option<String>,
        reply: Reply<()>,
    },
    GetServiceToken {
        service: String,
        reply: Reply<Option<TokenRecord>>,
    },
    EnqueueOutbound {
        record: OutboundFlagRecord,
        reply: Reply<i64>,
    },
    PeekOutbound {
        reply: Reply<Option<QueuedFlagRecord>>,
    },
    RemoveOutbound {
        id: i64,
        reply: Reply<()>,
    },
    RecordOutboundAttempt {
        id: i64,
        reply: Reply<u32>,
    },
    ParkOutbound {
        id: i64,
        reason: String,
        reply: Reply<()>,
    },
    OutboundLen {
        reply: Reply<usize>,
    },
    ParkedOutboundLen {
        reply: Reply<usize>,
    },
}

impl DbHandle {
    /// Open the database at `path` and start the actor thread.
    pub fn open(path: &Path) -> Result<Self, EpisodicError> {
        Self::spawn(Storage::open(path)?)
    }

    /// In-memory database, for tests.
    pub fn open_memory() -> Result<Self, EpisodicError> {
        Self::spawn(Storage::open_memory()?)
    }

    fn spawn(storage: Storage) -> Result<Self, EpisodicError> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("db-actor".into())
            .spawn(move || actor_loop(storage, rx))?;

        Ok(Self { tx })
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> DbCommand) -> Result<T, EpisodicError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(make(reply));
        rx.await
            .unwrap_or_else(|_| Err(EpisodicError::Config("DB actor closed".into())))
    }

    pub async fn get_show(&self, show_id: i64) -> Result<Option<Show>, EpisodicError> {
        self.call(|reply| DbCommand::GetShow { show_id, reply }).await
    }

    pub async fn show_exists(&self, show_id: i64) -> Result<bool, EpisodicError> {
        self.call(|reply| DbCommand::ShowExists { show_id, reply }).await
    }

    pub async fn insert_show(
        &self,
        show: NewShow,
        collected: Option<ShowState>,
        watched: Option<ShowState>,
    ) -> Result<(), EpisodicError> {
        self.call(|reply| DbCommand::InsertShow {
            show: Box::new(show),
            collected,
            watched,
            reply,
        })
        .await
    }

    pub async fn query_episodes(
        &self,
        scope: EpisodeScope,
        filter: Option<AiredBefore>,
    ) -> Result<Vec<EpisodeRow>, EpisodicError> {
        self.call(|reply| DbCommand::QueryEpisodes {
            scope,
            filter,
            reply,
        })
        .await
    }

    pub async fn update_flag(
        &self,
        scope: EpisodeScope,
        column: FlagColumn,
        value: bool,
        filter: Option<AiredBefore>,
    ) -> Result<usize, EpisodicError> {
        self.call(|reply| DbCommand::UpdateFlag {
            scope,
            column,
            value,
            filter,
            reply,
        })
        .await
    }

    pub async fn rebuild_search_index(&self) -> Result<usize, EpisodicError> {
        self.call(|reply| DbCommand::RebuildSearchIndex { reply }).await
    }

    pub async fn search_episodes(
        &self,
        query: impl Into<String>,
    ) -> Result<Vec<EpisodeRow>, EpisodicError> {
        let query = query.into();
        self.call(|reply| DbCommand::SearchEpisodes { query, reply }).await
    }

    pub async fn set_merged_shows(&self, merged: bool) -> Result<(), EpisodicError> {
        self.call(|reply| DbCommand::SetMergedShows { merged, reply }).await
    }

    pub async fn has_merged_shows(&self) -> Result<bool, EpisodicError> {
        self.call(|reply| DbCommand::HasMergedShows { reply }).await
    }

    pub async fn reset_rated_timestamps(&self) -> Result<(), EpisodicError> {
        self.call(|reply| DbCommand::ResetRatedTimestamps { reply }).await
    }

    pub async fn save_service_token(
        &self,
        service: impl Into<String>,
        token: String,
        refresh: Option<String>,
        expires_at: Option<String>,
    ) -> Result<(), EpisodicError> {
        let service = service.into();
        self.call(|reply| DbCommand::SaveServiceToken {
            service,
            token,
            refresh,
            expires_at,
            reply,
        })
        .await
    }

    pub async fn get_service_token(
        &self,
        service: impl Into<String>,
    ) -> Result<Option<TokenRecord>, EpisodicError> {
        let service = service.into();
        self.call(|reply| DbCommand::GetServiceToken { service, reply }).await
    }

    pub async fn enqueue_outbound(&self, record: OutboundFlagRecord) -> Result<i64, EpisodicError> {
        self.call(|reply| DbCommand::EnqueueOutbound { record, reply }).await
    }

    pub async fn peek_outbound(&self) -> Result<Option<QueuedFlagRecord>, EpisodicError> {
        self.call(|reply| DbCommand::PeekOutbound { reply }).await
    }

    pub async fn remove_outbound(&self, id: i64) -> Result<(), EpisodicError> {
        self.call(|reply| DbCommand::RemoveOutbound { id, reply }).await
    }

    pub async fn record_outbound_attempt(&self, id: i64) -> Result<u32, EpisodicError> {
        self.call(|reply| DbCommand::RecordOutboundAttempt { id, reply }).await
    }

    pub async fn park_outbound(
        &self,
        id: i64,
        reason: impl Into<String>,
    ) -> Result<(), EpisodicError> {
        let reason = reason.into();
        self.call(|reply| DbCommand::ParkOutbound { id, reason, reply }).await
    }

    pub async fn outbound_len(&self) -> Result<usize, EpisodicError> {
        self.call(|reply| DbCommand::OutboundLen { reply }).await
    }

    pub async fn parked_outbound_len(&self) -> Result<usize, EpisodicError> {
        self.call(|reply| DbCommand::ParkedOutboundLen { reply }).await
    }
}

fn actor_loop(storage: Storage, mut rx: mpsc::UnboundedReceiver<DbCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DbCommand::GetShow { show_id, reply } => {
                let _ = reply.send(storage.get_show(show_id));
            }
            DbCommand::ShowExists { show_id, reply } => {
                let _ = reply.send(storage.show_exists(show_id));
            }
            DbCommand::InsertShow {
                show,
                collected,
                watched,
                reply,
            } => {
                let _ = reply.send(storage.insert_show(
                    &show,
                    collected.as_ref(),
                    watched.as_ref(),
                ));
            }
            DbCommand::QueryEpisodes {
                scope,
                filter,
                reply,
            } => {
                let _ = reply.send(storage.query_episodes(scope, filter));
            }
            DbCommand::UpdateFlag {
                scope,
                column,
                value,
                filter,
                reply,
            } => {
                let _ = reply.send(storage.update_flag(scope, column, value, filter));
            }
            DbCommand::RebuildSearchIndex { reply } => {
                let _ = reply.send(storage.rebuild_search_index());
            }
            DbCommand::SearchEpisodes { query, reply } => {
                let _ = reply.send(storage.search_episodes(&query));
            }
            DbCommand::SetMergedShows { merged, reply } => {
                let _ = reply.send(storage.set_merged_shows(merged));
            }
            DbCommand::HasMergedShows { reply } => {
                let _ = reply.send(storage.has_merged_shows());
            }
            DbCommand::ResetRatedTimestamps { reply } => {
                let _ = reply.send(storage.reset_rated_timestamps());
            }
            DbCommand::SaveServiceToken {
                service,
                token,
                refresh,
                expires_at,
                reply,
            } => {
                let _ = reply.send(storage.save_token(
                    &service,
                    &token,
                    refresh.as_deref(),
                    expires_at.as_deref(),
                ));
            }
            DbCommand::GetServiceToken { service, reply } => {
                let _ = reply.send(storage.get_token_full(&service));
            }
            DbCommand::EnqueueOutbound { record, reply } => {
                let _ = reply.send(storage.enqueue_outbound(&record));
            }
            DbCommand::PeekOutbound { reply } => {
                let _ = reply.send(storage.peek_outbound());
            }
            DbCommand::RemoveOutbound { id, reply } => {
                let _ = reply.send(storage.remove_outbound(id));
            }
            DbCommand::RecordOutboundAttempt { id, reply } => {
                let _ = reply.send(storage.record_outbound_attempt(id));
            }
            DbCommand::ParkOutbound { id, reason, reply } => {
                let _ = reply.send(storage.park_outbound(id, &reason));
            }
            DbCommand::OutboundLen { reply } => {
                let _ = reply.send(storage.outbound_len());
            }
            DbCommand::ParkedOutboundLen { reply } => {
                let _ = reply.send(storage.parked_outbound_len());
            }
        }
    }
    tracing::debug!("DB actor stopped");
}
