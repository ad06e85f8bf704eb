//! SQLite attempt store.
//!
//! All statements run on the blocking pool against a single shared
//! connection. Timestamps are stored as unix milliseconds.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gauntlet_core::{AttemptDetail, AttemptRecord, Eligibility, Email};
use rusqlite::{Connection, OptionalExtension, params};

use super::{AttemptId, AttemptStore, UserId, failure_window_start};
use crate::error::StorageError;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    email      TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS attempts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL REFERENCES users(id),
    failed       INTEGER NOT NULL,
    detail       TEXT NOT NULL,
    submitted_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attempts_user_time
    ON attempts(user_id, submitted_at);
";

/// Attempt store backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();
        tokio::task::spawn_blocking(move || Connection::open(&path))
            .await
            .map_err(|e| StorageError::Worker(e.to_string()))?
            .map_err(|e| StorageError::Open {
                location: location.clone(),
                message: e.to_string(),
            })
            .and_then(|conn| Self::with_schema(conn, &location))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open {
            location: ":memory:".into(),
            message: e.to_string(),
        })?;
        Self::with_schema(conn, ":memory:")
    }

    fn with_schema(conn: Connection, location: &str) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA).map_err(|e| StorageError::Open {
            location: location.to_string(),
            message: format!("apply schema: {e}"),
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::Worker("sqlite connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Worker(e.to_string()))?
    }

    /// Inserts an attempt with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownUser`] if `email` was never
    /// registered.
    pub async fn record_attempt_at(
        &self,
        email: &Email,
        failed: bool,
        detail: &AttemptDetail,
        submitted_at: DateTime<Utc>,
    ) -> Result<AttemptId, StorageError> {
        let email = email.clone();
        let detail = serde_json::to_string(detail).map_err(|e| StorageError::Corrupt {
            what: "attempt detail",
            message: e.to_string(),
        })?;
        let at = submitted_at.timestamp_millis();
        self.with_conn(move |conn| {
            let user_id = lookup_user(conn, &email)?
                .ok_or_else(|| StorageError::UnknownUser(email.to_string()))?;
            conn.execute(
                "INSERT INTO attempts (user_id, failed, detail, submitted_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, failed, detail, at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// All attempts recorded for `email`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails or a row cannot be
    /// decoded.
    pub async fn attempts(&self, email: &Email) -> Result<Vec<AttemptRecord>, StorageError> {
        let email = email.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.failed, a.detail, a.submitted_at
                   FROM attempts a JOIN users u ON u.id = a.user_id
                  WHERE u.email = ?1
                  ORDER BY a.submitted_at, a.id",
            )?;
            let rows = stmt
                .query_map(params![email.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, failed, detail, at)| {
                    let detail = serde_json::from_str(&detail).map_err(|e| StorageError::Corrupt {
                        what: "attempt detail",
                        message: format!("attempt {id}: {e}"),
                    })?;
                    Ok(AttemptRecord {
                        id,
                        email: email.clone(),
                        failed,
                        detail,
                        submitted_at: from_millis(at)?,
                    })
                })
                .collect()
        })
        .await
    }
}

fn lookup_user(conn: &Connection, email: &Email) -> Result<Option<UserId>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::Corrupt {
            what: "submitted_at",
            message: format!("timestamp {ms} out of range"),
        })
}

#[async_trait]
impl AttemptStore for SqliteStore {
    async fn create_user(&self, email: &Email) -> Result<UserId, StorageError> {
        let email = email.clone();
        let now = Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (email, created_at) VALUES (?1, ?2)
                 ON CONFLICT(email) DO NOTHING",
                params![email.as_str(), now],
            )?;
            lookup_user(conn, &email)?.ok_or_else(|| StorageError::UnknownUser(email.to_string()))
        })
        .await
    }

    async fn record_attempt(
        &self,
        email: &Email,
        failed: bool,
        detail: &AttemptDetail,
    ) -> Result<AttemptId, StorageError> {
        self.record_attempt_at(email, failed, detail, Utc::now()).await
    }

    async fn has_failed_attempt_today(&self, email: &Email) -> Result<bool, StorageError> {
        let email = email.clone();
        let cutoff = failure_window_start(Utc::now()).timestamp_millis();
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM attempts a JOIN users u ON u.id = a.user_id
                     WHERE u.email = ?1 AND a.failed = 1 AND a.submitted_at > ?2)",
                params![email.as_str(), cutoff],
                |row| row.get(0),
            )?)
        })
        .await
    }

    async fn has_won(&self, email: &Email) -> Result<bool, StorageError> {
        let email = email.clone();
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM attempts a JOIN users u ON u.id = a.user_id
                     WHERE u.email = ?1 AND a.failed = 0)",
                params![email.as_str()],
                |row| row.get(0),
            )?)
        })
        .await
    }

    async fn check_eligibility(&self, email: &Email) -> Result<Eligibility, StorageError> {
        let email = email.clone();
        let cutoff = failure_window_start(Utc::now()).timestamp_millis();
        self.with_conn(move |conn| {
            let (won, last_failure): (bool, Option<i64>) = conn.query_row(
                "SELECT
                    COALESCE(MAX(a.failed = 0), 0),
                    MAX(CASE WHEN a.failed = 1 AND a.submitted_at > ?2 THEN a.submitted_at END)
                   FROM attempts a JOIN users u ON u.id = a.user_id
                  WHERE u.email = ?1",
                params![email.as_str(), cutoff],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let last_failure = last_failure.map(from_millis).transpose()?;
            Ok(Eligibility::resolve(won, last_failure.is_some(), last_failure))
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
