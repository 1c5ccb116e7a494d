//! # Local Stores
//!
//! SQLite database holding the user identity and the session history.
//!
//! ## Schema
//!
//! ```sql
//! identity (key TEXT PRIMARY KEY, value TEXT NOT NULL)
//! history  (id INTEGER PRIMARY KEY, date TEXT NOT NULL,
//!           main_emotion TEXT NOT NULL, stats TEXT NOT NULL)
//! ```
//!
//! `history.stats` holds the top-N view of a session as JSON, rounded to one
//! decimal. `history.date` is the local calendar date as computed by SQLite.

use crate::emotion::EmotionLabel;
use crate::session::SessionSummary;
use crate::stats::{round1, EmotionStat, EmotionStats};
use anyhow::{Context, Result};
use log::{debug, info};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const USER_ID_KEY: &str = "user_id";

/// Upper bound for `moodtune history`.
pub const MAX_HISTORY: usize = 30;

/// One stored session.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    /// `YYYY-MM-DD`, local time
    pub date: String,
    pub main_emotion: EmotionLabel,
    pub stats: EmotionStats,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::init(conn)
    }

    /// Throwaway database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identity (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS history (
                id           INTEGER PRIMARY KEY,
                date         TEXT    NOT NULL,
                main_emotion TEXT    NOT NULL,
                stats        TEXT    NOT NULL
            );",
        )
        .context("Failed to create database tables")?;

        Ok(Self { conn })
    }

    /// The persisted user id, created on first call.
    pub fn user_id(&self) -> Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM identity WHERE key = ?1",
                [USER_ID_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read user id")?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let id = new_user_id();
        self.conn
            .execute(
                "INSERT INTO identity (key, value) VALUES (?1, ?2)",
                params![USER_ID_KEY, id],
            )
            .context("Failed to store user id")?;
        info!("Created user id {id}");
        Ok(id)
    }

    /// Append the top-N view of a completed session.
    pub fn append_history(&self, summary: &SessionSummary) -> Result<i64> {
        let stats = serde_json::to_string(&rounded(&summary.top))
            .context("Failed to serialize session stats")?;

        self.conn
            .execute(
                "INSERT INTO history (date, main_emotion, stats)
                 VALUES (date('now', 'localtime'), ?1, ?2)",
                params![summary.main_emotion.as_str(), stats],
            )
            .context("Failed to append history record")?;

        let id = self.conn.last_insert_rowid();
        debug!("History record {id} stored for {}", summary.main_emotion);
        Ok(id)
    }

    /// The newest `limit` records, oldest first.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, date, main_emotion, stats FROM history
                 ORDER BY id DESC LIMIT ?1",
            )
            .context("Invalid SQL statement when selecting history")?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Cannot query history")?;

        let mut records = Vec::new();
        for row in rows {
            let (id, date, main_emotion, stats) = row.context("Reading history row failed")?;
            let stats: EmotionStats = serde_json::from_str(&stats)
                .with_context(|| format!("History record {id} has malformed stats"))?;
            records.push(HistoryRecord {
                id,
                date,
                main_emotion: EmotionLabel::from(main_emotion),
                stats,
            });
        }

        records.reverse();
        Ok(records)
    }
}

/// `u-<unix millis>-<0..1e6>`
pub fn new_user_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let suffix = rand::thread_rng().gen_range(0..1_000_000);
    format!("u-{millis}-{suffix}")
}

fn rounded(stats: &EmotionStats) -> Vec<EmotionStat> {
    stats
        .iter()
        .map(|stat| EmotionStat {
            percentage: round1(stat.percentage),
            avg_confidence: round1(stat.avg_confidence * 100.0) / 100.0,
            ..stat.clone()
        })
        .collect()
}
