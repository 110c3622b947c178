use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::error::EpisodicError;
use crate::models::{
    AiredBefore, EpisodeRow, EpisodeScope, FlagAction, FlagColumn, NewShow, OutboundFlagRecord,
    QueuedFlagRecord, Show, ShowState,
};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");
const SCHEMA_V2: &str = include_str!("../../../migrations/002_outbound_queue.sql");
const SCHEMA_V3: &str = include_str!("../../../migrations/003_episode_search.sql");
const SCHEMA_V4: &str = include_str!("../../../migrations/004_outbound_parking.sql");

/// Set once every show of the cloud backup has been merged into the library.
pub const KEY_CLOUD_MERGED_SHOWS: &str = "cloud.merged_shows";
/// Last time show ratings were pulled from trakt, ms since epoch.
pub const KEY_TRAKT_LAST_SHOWS_RATED_AT: &str = "trakt.last_shows_rated_at";
/// Last time episode ratings were pulled from trakt, ms since epoch.
pub const KEY_TRAKT_LAST_EPISODES_RATED_AT: &str = "trakt.last_episodes_rated_at";

/// Token record: (access_token, refresh_token, expires_at).
pub type TokenRecord = (String, Option<String>, Option<String>);

/// SQLite-backed storage for the episodic library.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, EpisodicError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, EpisodicError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Shows ───────────────────────────────────────────────────

    pub fn show_exists(&self, show_id: i64) -> Result<bool, EpisodicError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM show WHERE id = ?1",
            params![show_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_show(&self, show_id: i64) -> Result<Option<Show>, EpisodicError> {
        self.conn
            .query_row(
                "SELECT id, title, overview, language FROM show WHERE id = ?1",
                params![show_id],
                |row| {
                    Ok(Show {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        overview: row.get(2)?,
                        language: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Insert a show with its seasons and episodes in one transaction.
    ///
    /// Episodes listed in `collected` or `watched` start out with that flag set.
    pub fn insert_show(
        &self,
        show: &NewShow,
        collected: Option<&ShowState>,
        watched: Option<&ShowState>,
    ) -> Result<(), EpisodicError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO show (id, title, overview, language) VALUES (?1, ?2, ?3, ?4)",
            params![show.id, show.title, show.overview, show.language],
        )?;

        for episode in &show.episodes {
            tx.execute(
                "INSERT OR IGNORE INTO season (show_id, number) VALUES (?1, ?2)",
                params![show.id, episode.season],
            )?;
            let season_id: i64 = tx.query_row(
                "SELECT id FROM season WHERE show_id = ?1 AND number = ?2",
                params![show.id, episode.season],
                |row| row.get(0),
            )?;
            let is_watched = watched.is_some_and(|s| s.contains(episode.season, episode.number));
            let is_collected =
                collected.is_some_and(|s| s.contains(episode.season, episode.number));
            tx.execute(
                "INSERT OR REPLACE INTO episode (id, show_id, season_id, season, number, title,
                 overview, first_aired_ms, watched, collected)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    episode.id,
                    show.id,
                    season_id,
                    episode.season,
                    episode.number,
                    episode.title,
                    episode.overview,
                    episode.first_aired_ms,
                    is_watched as i32,
                    is_collected as i32,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Row id of a season, if the show has it.
    pub fn season_id(&self, show_id: i64, number: i32) -> Result<Option<i64>, EpisodicError> {
        self.conn
            .query_row(
                "SELECT id FROM season WHERE show_id = ?1 AND number = ?2",
                params![show_id, number],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // ── Episodes ────────────────────────────────────────────────

    /// Episodes in scope, ordered by season then number.
    pub fn query_episodes(
        &self,
        scope: EpisodeScope,
        filter: Option<AiredBefore>,
    ) -> Result<Vec<EpisodeRow>, EpisodicError> {
        let (selection, args) = selection(scope, filter);
        let sql = format!(
            "SELECT id, show_id, season_id, season, number, title, first_aired_ms,
                    watched, collected
             FROM episode WHERE {selection}
             ORDER BY season, number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_episode)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write a flag column for every episode in scope. Returns the number of rows changed.
    pub fn update_flag(
        &self,
        scope: EpisodeScope,
        column: FlagColumn,
        value: bool,
        filter: Option<AiredBefore>,
    ) -> Result<usize, EpisodicError> {
        let (selection, mut args) = selection(scope, filter);
        let sql = format!(
            "UPDATE episode SET {} = ?{} WHERE {selection}",
            column.as_sql(),
            args.len() + 1
        );
        args.push(Box::new(value as i32));
        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(args.iter()))?;
        Ok(changed)
    }

    // ── Full-text search ────────────────────────────────────────

    /// Regenerate the episode search index from scratch. Returns the number of indexed rows.
    pub fn rebuild_search_index(&self) -> Result<usize, EpisodicError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM episode_search", [])?;
        let indexed = tx.execute(
            "INSERT INTO episode_search (rowid, show_title, title, overview)
             SELECT e.id, s.title, COALESCE(e.title, ''), COALESCE(e.overview, '')
             FROM episode e JOIN show s ON e.show_id = s.id",
            [],
        )?;
        tx.commit()?;
        Ok(indexed)
    }

    /// Full-text search over episode titles, overviews and show titles.
    pub fn search_episodes(&self, query: &str) -> Result<Vec<EpisodeRow>, EpisodicError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.show_id, e.season_id, e.season, e.number, e.title,
                    e.first_aired_ms, e.watched, e.collected
             FROM episode_search f
             JOIN episode e ON e.id = f.rowid
             WHERE episode_search MATCH ?1
             ORDER BY rank",
        )?;
        let rows = stmt
            .query_map(params![query], row_to_episode)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Settings ────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, EpisodicError> {
        self.conn
            .query_row(
                "SELECT value FROM setting WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), EpisodicError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn set_merged_shows(&self, merged: bool) -> Result<(), EpisodicError> {
        self.set_setting(KEY_CLOUD_MERGED_SHOWS, if merged { "1" } else { "0" })
    }

    pub fn has_merged_shows(&self) -> Result<bool, EpisodicError> {
        Ok(self.get_setting(KEY_CLOUD_MERGED_SHOWS)?.as_deref() == Some("1"))
    }

    /// Zero both rating sync timestamps so the next trakt sync downloads everything.
    pub fn reset_rated_timestamps(&self) -> Result<(), EpisodicError> {
        let tx = self.conn.unchecked_transaction()?;
        for key in [KEY_TRAKT_LAST_SHOWS_RATED_AT, KEY_TRAKT_LAST_EPISODES_RATED_AT] {
            tx.execute(
                "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, '0')",
                params![key],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Auth Tokens ─────────────────────────────────────────────

    /// Save (or overwrite) a token for a service.
    pub fn save_token(
        &self,
        service: &str,
        token: &str,
        refresh: Option<&str>,
        expires_at: Option<&str>,
    ) -> Result<(), EpisodicError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO auth_tokens (service, token, refresh, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![service, token, refresh, expires_at],
        )?;
        Ok(())
    }

    /// Get the full token record for a service (token, refresh_token, expires_at).
    pub fn get_token_full(&self, service: &str) -> Result<Option<TokenRecord>, EpisodicError> {
        self.conn
            .query_row(
                "SELECT token, refresh, expires_at FROM auth_tokens WHERE service = ?1",
                params![service],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(Into::into)
    }

    // ── Outbound queue ──────────────────────────────────────────

    /// Persist a remote flag change. Returns its queue id.
    pub fn enqueue_outbound(&self, record: &OutboundFlagRecord) -> Result<i64, EpisodicError> {
        let episodes = serde_json::to_string(&record.episodes)?;
        self.conn.execute(
            "INSERT INTO outbound_flag (show_id, action, episodes, flag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.show_id,
                record.action.as_db_str(),
                episodes,
                record.flag as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Oldest live record, if any. Rows that no longer decode are parked
    /// so they cannot block the records behind them.
    pub fn peek_outbound(&self) -> Result<Option<QueuedFlagRecord>, EpisodicError> {
        loop {
            let raw = self
                .conn
                .query_row(
                    "SELECT id, show_id, action, episodes, flag, attempts, created_at
                     FROM outbound_flag WHERE parked_at IS NULL ORDER BY id LIMIT 1",
                    [],
                    |row| {
                        Ok(RawOutbound {
                            id: row.get(0)?,
                            show_id: row.get(1)?,
                            action: row.get(2)?,
                            episodes: row.get(3)?,
                            flag: row.get(4)?,
                            attempts: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )
                .optional()?;

            let Some(raw) = raw else {
                return Ok(None);
            };
            let id = raw.id;
            match raw.decode() {
                Ok(queued) => return Ok(Some(queued)),
                Err(reason) => {
                    tracing::warn!(id, %reason, "Parking undecodable outbound record");
                    self.park_outbound(id, &reason)?;
                }
            }
        }
    }

    pub fn remove_outbound(&self, id: i64) -> Result<(), EpisodicError> {
        self.conn
            .execute("DELETE FROM outbound_flag WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Count a failed delivery attempt. Returns the new attempt count.
    pub fn record_outbound_attempt(&self, id: i64) -> Result<u32, EpisodicError> {
        self.conn.execute(
            "UPDATE outbound_flag SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        let attempts = self
            .conn
            .query_row(
                "SELECT attempts FROM outbound_flag WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(attempts.unwrap_or(0))
    }

    /// Take a record out of the live queue without deleting it.
    pub fn park_outbound(&self, id: i64, reason: &str) -> Result<(), EpisodicError> {
        self.conn.execute(
            "UPDATE outbound_flag SET parked_at = ?2, park_reason = ?3 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339(), reason],
        )?;
        Ok(())
    }

    /// Number of live (not parked) records.
    pub fn outbound_len(&self) -> Result<usize, EpisodicError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outbound_flag WHERE parked_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn parked_outbound_len(&self) -> Result<usize, EpisodicError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outbound_flag WHERE parked_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ── Migrations ──────────────────────────────────────────────────

fn run_migrations(conn: &Connection) -> Result<(), EpisodicError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if version < 2 {
        conn.execute_batch(SCHEMA_V2)?;
        conn.pragma_update(None, "user_version", 2)?;
    }
    if version < 3 {
        conn.execute_batch(SCHEMA_V3)?;
        conn.pragma_update(None, "user_version", 3)?;
    }
    if version < 4 {
        conn.execute_batch(SCHEMA_V4)?;
        conn.pragma_update(None, "user_version", 4)?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

/// WHERE clause and bound arguments for an episode scope.
fn selection(scope: EpisodeScope, filter: Option<AiredBefore>) -> (String, Vec<Box<dyn ToSql>>) {
    let (column, id) = match scope {
        EpisodeScope::Episode(id) => ("id", id),
        EpisodeScope::Season(id) => ("season_id", id),
        EpisodeScope::Show(id) => ("show_id", id),
    };
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    let mut clause = format!("{column} = ?1");
    if let Some(AiredBefore(cutoff)) = filter {
        clause.push_str(" AND first_aired_ms > 0 AND first_aired_ms < ?2");
        args.push(Box::new(cutoff));
    }
    (clause, args)
}

/// An `outbound_flag` row as stored.
struct RawOutbound {
    id: i64,
    show_id: i64,
    action: String,
    episodes: String,
    flag: i32,
    attempts: u32,
    created_at: String,
}

impl RawOutbound {
    fn decode(self) -> Result<QueuedFlagRecord, String> {
        let action = FlagAction::from_db_str(&self.action)
            .ok_or_else(|| format!("unknown flag action: {}", self.action))?;
        let episodes =
            serde_json::from_str(&self.episodes).map_err(|e| format!("bad episode list: {e}"))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| format!("bad created_at {:?}: {e}", self.created_at))?
            .with_timezone(&Utc);

        Ok(QueuedFlagRecord {
            id: self.id,
            record: OutboundFlagRecord {
                show_id: self.show_id,
                action,
                episodes,
                flag: self.flag != 0,
            },
            attempts: self.attempts,
            created_at,
        })
    }
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodeRow> {
    Ok(EpisodeRow {
        id: row.get(0)?,
        show_id: row.get(1)?,
        season_id: row.get(2)?,
        season: row.get(3)?,
        number: row.get(4)?,
        title: row.get(5)?,
        first_aired_ms: row.get(6)?,
        watched: row.get::<_, i32>(7)? != 0,
        collected: row.get::<_, i32>(8)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EpisodeRef, NewEpisode};

    fn episode(id: i64, season: i32, number: i32, first_aired_ms: i64) -> NewEpisode {
        NewEpisode {
            id,
            season,
            number,
            title: Some(format!("Episode {season}x{number}")),
            overview: None,
            first_aired_ms,
        }
    }

    fn test_show() -> NewShow {
        NewShow {
            id: 81189,
            title: "Breaking Bad".into(),
            overview: Some("A chemistry teacher turns to crime.".into()),
            language: "en".into(),
            episodes: vec![
                episode(1, 1, 1, 1_200_000_000_000),
                episode(2, 1, 2, 1_200_600_000_000),
                episode(3, 1, 3, 1_201_200_000_000),
                episode(4, 2, 1, 1_236_000_000_000),
                episode(5, 2, 2, -1),
            ],
        }
    }

    #[test]
    fn test_insert_show() {
        let db = Storage::open_memory().unwrap();
        db.insert_show(&test_show(), None, None).unwrap();

        assert!(db.show_exists(81189).unwrap());
        assert!(!db.show_exists(1).unwrap());
        let show = db.get_show(81189).unwrap().unwrap();
        assert_eq!(show.title, "Breaking Bad");

        let episodes = db.query_episodes(EpisodeScope::Show(81189), None).unwrap();
        assert_eq!(episodes.len(), 5);
        assert!(episodes.iter().all(|e| !e.watched && !e.collected));
        assert!(db.season_id(81189, 2).unwrap().is_some());
        assert!(db.season_id(81189, 3).unwrap().is_none());
    }

    #[test]
    fn test_insert_show_prefills_flags() {
        let db = Storage::open_memory().unwrap();
        let mut watched = ShowState::default();
        watched.insert(1, 1);
        watched.insert(1, 2);
        let mut collected = ShowState::default();
        collected.insert(2, 1);

        db.insert_show(&test_show(), Some(&collected), Some(&watched))
            .unwrap();

        let episodes = db.query_episodes(EpisodeScope::Show(81189), None).unwrap();
        let watched: Vec<_> = episodes.iter().filter(|e| e.watched).map(|e| e.id).collect();
        let collected: Vec<_> = episodes.iter().filter(|e| e.collected).map(|e| e.id).collect();
        assert_eq!(watched, vec![1, 2]);
        assert_eq!(collected, vec![4]);
    }

    #[test]
    fn test_update_flag_scopes() {
        let db = Storage::open_memory().unwrap();
        db.insert_show(&test_show(), None, None).unwrap();

        let changed = db
            .update_flag(EpisodeScope::Episode(2), FlagColumn::Collected, true, None)
            .unwrap();
        assert_eq!(changed, 1);

        let season_two = db.season_id(81189, 2).unwrap().unwrap();
        let changed = db
            .update_flag(EpisodeScope::Season(season_two), FlagColumn::Watched, true, None)
            .unwrap();
        assert_eq!(changed, 2);

        let episodes = db.query_episodes(EpisodeScope::Show(81189), None).unwrap();
        assert!(episodes[1].collected);
        assert!(episodes[3].watched && episodes[4].watched);
        assert!(!episodes[0].watched);

        let changed = db
            .update_flag(EpisodeScope::Show(81189), FlagColumn::Watched, false, None)
            .unwrap();
        assert_eq!(changed, 5);
    }

    #[test]
    fn test_aired_before_filter() {
        let db = Storage::open_memory().unwrap();
        db.insert_show(&test_show(), None, None).unwrap();

        let filter = Some(AiredBefore(1_201_200_000_000));
        let previous = db.query_episodes(EpisodeScope::Show(81189), filter).unwrap();
        let ids: Vec<_> = previous.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let changed = db
            .update_flag(EpisodeScope::Show(81189), FlagColumn::Watched, true, filter)
            .unwrap();
        assert_eq!(changed, 2);

        // An unknown air date never counts as previous.
        let everything = Some(AiredBefore(i64::MAX));
        let all = db.query_episodes(EpisodeScope::Show(81189), everything).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_search_index() {
        let db = Storage::open_memory().unwrap();
        db.insert_show(&test_show(), None, None).unwrap();

        assert!(db.search_episodes("Breaking").unwrap().is_empty());
        let indexed = db.rebuild_search_index().unwrap();
        assert_eq!(indexed, 5);
        assert_eq!(db.search_episodes("Breaking").unwrap().len(), 5);

        // Rebuilding does not duplicate rows.
        assert_eq!(db.rebuild_search_index().unwrap(), 5);
    }

    #[test]
    fn test_settings() {
        let db = Storage::open_memory().unwrap();
        assert!(!db.has_merged_shows().unwrap());
        db.set_merged_shows(true).unwrap();
        assert!(db.has_merged_shows().unwrap());

        db.set_setting(KEY_TRAKT_LAST_SHOWS_RATED_AT, "12345").unwrap();
        db.reset_rated_timestamps().unwrap();
        assert_eq!(
            db.get_setting(KEY_TRAKT_LAST_SHOWS_RATED_AT).unwrap().as_deref(),
            Some("0")
        );
        assert_eq!(
            db.get_setting(KEY_TRAKT_LAST_EPISODES_RATED_AT).unwrap().as_deref(),
            Some("0")
        );
    }

    #[test]
    fn test_auth_tokens() {
        let db = Storage::open_memory().unwrap();

        db.save_token("trakt", "abc123", None, None).unwrap();
        let (token, _, _) = db.get_token_full("trakt").unwrap().unwrap();
        assert_eq!(token, "abc123");

        db.save_token("trakt", "xyz789", Some("refresh_tok"), Some("2030-01-01T00:00:00Z"))
            .unwrap();
        let (token, refresh, expires) = db.get_token_full("trakt").unwrap().unwrap();
        assert_eq!(token, "xyz789");
        assert_eq!(refresh.as_deref(), Some("refresh_tok"));
        assert!(expires.is_some());
    }

    #[test]
    fn test_outbound_fifo() {
        let db = Storage::open_memory().unwrap();
        assert!(db.peek_outbound().unwrap().is_none());

        let first = OutboundFlagRecord {
            show_id: 81189,
            action: FlagAction::EpisodeWatched,
            episodes: vec![EpisodeRef::new(1, 2)],
            flag: true,
        };
        let second = OutboundFlagRecord {
            flag: false,
            ..first.clone()
        };
        let first_id = db.enqueue_outbound(&first).unwrap();
        db.enqueue_outbound(&second).unwrap();
        assert_eq!(db.outbound_len().unwrap(), 2);

        let head = db.peek_outbound().unwrap().unwrap();
        assert_eq!(head.id, first_id);
        assert_eq!(head.record, first);
        assert_eq!(head.attempts, 0);

        assert_eq!(db.record_outbound_attempt(first_id).unwrap(), 1);
        assert_eq!(db.peek_outbound().unwrap().unwrap().attempts, 1);

        db.remove_outbound(first_id).unwrap();
        let head = db.peek_outbound().unwrap().unwrap();
        assert_eq!(head.record, second);
    }

    #[test]
    fn test_parked_outbound_leaves_live_queue() {
        let db = Storage::open_memory().unwrap();
        let record = OutboundFlagRecord {
            show_id: 81189,
            action: FlagAction::EpisodeCollected,
            episodes: vec![EpisodeRef::new(2, 1)],
            flag: true,
        };
        let first_id = db.enqueue_outbound(&record).unwrap();
        let second_id = db.enqueue_outbound(&record).unwrap();

        db.park_outbound(first_id, "gave up after 10 attempts").unwrap();

        assert_eq!(db.outbound_len().unwrap(), 1);
        assert_eq!(db.parked_outbound_len().unwrap(), 1);
        assert_eq!(db.peek_outbound().unwrap().unwrap().id, second_id);
    }

    #[test]
    fn test_undecodable_outbound_row_is_parked() {
        let db = Storage::open_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO outbound_flag (show_id, action, episodes, flag, created_at)
                 VALUES (1, 'rewatched', '[]', 1, '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO outbound_flag (show_id, action, episodes, flag, created_at)
                 VALUES (2, 'episode_watched', 'not json', 1, '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO outbound_flag (show_id, action, episodes, flag, created_at)
                 VALUES (4, 'show_watched', '[]', 1, '2024-01-01 00:00:00')",
                [],
            )
            .unwrap();
        let good = OutboundFlagRecord {
            show_id: 3,
            action: FlagAction::ShowWatched,
            episodes: vec![],
            flag: true,
        };
        let good_id = db.enqueue_outbound(&good).unwrap();

        let head = db.peek_outbound().unwrap().unwrap();
        assert_eq!(head.id, good_id);
        assert_eq!(head.record, good);
        assert_eq!(db.parked_outbound_len().unwrap(), 3);
        assert_eq!(db.outbound_len().unwrap(), 1);

        let reason: String = db
            .conn
            .query_row(
                "SELECT park_reason FROM outbound_flag WHERE show_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(reason.contains("rewatched"));
    }

    #[test]
    fn test_outbound_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodic.db");

        let record = OutboundFlagRecord {
            show_id: 81189,
            action: FlagAction::SeasonWatched,
            episodes: vec![EpisodeRef::whole_season(1)],
            flag: true,
        };
        {
            let db = Storage::open(&path).unwrap();
            db.enqueue_outbound(&record).unwrap();
        }

        let db = Storage::open(&path).unwrap();
        let head = db.peek_outbound().unwrap().unwrap();
        assert_eq!(head.record, record);
        assert!(head.record.episodes[0].is_whole_season());
    }
}
