//! Attempt storage
//!
//! The [`AttemptStore`] trait is the only way the session engine touches
//! durable state. Implementations must be safe for concurrent use; the
//! engine never serializes calls to them.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gauntlet_core::{AttemptDetail, Eligibility, Email};
use tracing::{info, warn};

use crate::error::StorageError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage-assigned user identifier.
pub type UserId = i64;

/// Storage-assigned attempt identifier.
pub type AttemptId = i64;

/// Durable record of users and their attempts.
#[async_trait]
pub trait AttemptStore: Send + Sync + 'static {
    /// Registers an identity, returning the existing id if already known.
    async fn create_user(&self, email: &Email) -> Result<UserId, StorageError>;

    /// Appends an attempt for a registered identity.
    async fn record_attempt(
        &self,
        email: &Email,
        failed: bool,
        detail: &AttemptDetail,
    ) -> Result<AttemptId, StorageError>;

    /// `true` iff a failed attempt exists within the trailing 24 hours.
    async fn has_failed_attempt_today(&self, email: &Email) -> Result<bool, StorageError>;

    /// `true` iff any non-failed attempt exists.
    async fn has_won(&self, email: &Email) -> Result<bool, StorageError>;

    /// Runs both checks concurrently and resolves them into one verdict,
    /// a win taking precedence.
    ///
    /// Backends that can answer in one round trip should override this.
    async fn check_eligibility(&self, email: &Email) -> Result<Eligibility, StorageError> {
        let (won, failed_today) =
            tokio::try_join!(self.has_won(email), self.has_failed_attempt_today(email))?;
        Ok(Eligibility::resolve(won, failed_today, None))
    }

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Start of the trailing window used by `has_failed_attempt_today`.
#[must_use]
pub fn failure_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - gauntlet_core::attempt::retry_window()
}

/// Opens the store named by `database_url`.
///
/// - `None` or `memory:` keeps attempts in process memory.
/// - `sqlite::memory:` opens a private in-memory SQLite database.
/// - `sqlite://PATH`, `sqlite:PATH` or a bare path opens a SQLite file.
///
/// # Errors
///
/// Returns [`StorageError::Unavailable`] for unsupported schemes and
/// [`StorageError::Open`] when the database cannot be opened or migrated.
pub async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn AttemptStore>, StorageError> {
    let Some(url) = database_url.map(str::trim).filter(|u| !u.is_empty()) else {
        warn!("no database configured; attempts are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    };

    if url == "memory:" {
        warn!("in-memory store selected; attempts are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url == "sqlite::memory:" {
        return Ok(Arc::new(SqliteStore::open_in_memory().await?));
    }
    if let Some((scheme, _)) = url.split_once("://") {
        if scheme != "sqlite" {
            return Err(StorageError::Unavailable(format!(
                "unsupported database scheme '{scheme}'"
            )));
        }
    }

    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let store = SqliteStore::open(path).await?;
    info!(path, "opened sqlite attempt store");
    Ok(Arc::new(store))
}
