//! Process-memory attempt store.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gauntlet_core::{AttemptDetail, AttemptRecord, Eligibility, Email};

use super::{AttemptId, AttemptStore, UserId, failure_window_start};
use crate::error::StorageError;

#[derive(Debug)]
struct UserEntry {
    id: UserId,
    attempts: Vec<AttemptRecord>,
}

/// Keeps users and attempts in a concurrent map for the life of the
/// process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<Email, UserEntry>,
    next_user: AtomicI64,
    next_attempt: AtomicI64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an attempt with an explicit timestamp, registering the user
    /// if needed.
    pub fn seed_attempt(
        &self,
        email: &Email,
        failed: bool,
        detail: AttemptDetail,
        submitted_at: DateTime<Utc>,
    ) -> AttemptId {
        self.ensure_user(email);
        self.push_attempt(email, failed, detail, submitted_at)
            .unwrap_or_default()
    }

    /// All attempts recorded for `email`, oldest first.
    #[must_use]
    pub fn attempts(&self, email: &Email) -> Vec<AttemptRecord> {
        self.users
            .get(email)
            .map(|entry| entry.attempts.clone())
            .unwrap_or_default()
    }

    /// Total number of attempts across all users.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.users.iter().map(|entry| entry.attempts.len()).sum()
    }

    fn ensure_user(&self, email: &Email) -> UserId {
        self.users
            .entry(email.clone())
            .or_insert_with(|| UserEntry {
                id: self.next_user.fetch_add(1, Ordering::SeqCst) + 1,
                attempts: Vec::new(),
            })
            .id
    }

    fn push_attempt(
        &self,
        email: &Email,
        failed: bool,
        detail: AttemptDetail,
        submitted_at: DateTime<Utc>,
    ) -> Option<AttemptId> {
        let mut entry = self.users.get_mut(email)?;
        let id = self.next_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        entry.attempts.push(AttemptRecord {
            id,
            email: email.clone(),
            failed,
            detail,
            submitted_at,
        });
        Some(id)
    }

    fn last_recent_failure(&self, email: &Email, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cutoff = failure_window_start(now);
        self.users.get(email).and_then(|entry| {
            entry
                .attempts
                .iter()
                .filter(|a| a.failed && a.submitted_at > cutoff)
                .map(|a| a.submitted_at)
                .max()
        })
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create_user(&self, email: &Email) -> Result<UserId, StorageError> {
        Ok(self.ensure_user(email))
    }

    async fn record_attempt(
        &self,
        email: &Email,
        failed: bool,
        detail: &AttemptDetail,
    ) -> Result<AttemptId, StorageError> {
        self.push_attempt(email, failed, detail.clone(), Utc::now())
            .ok_or_else(|| StorageError::UnknownUser(email.to_string()))
    }

    async fn has_failed_attempt_today(&self, email: &Email) -> Result<bool, StorageError> {
        Ok(self.last_recent_failure(email, Utc::now()).is_some())
    }

    async fn has_won(&self, email: &Email) -> Result<bool, StorageError> {
        Ok(self
            .users
            .get(email)
            .is_some_and(|entry| entry.attempts.iter().any(|a| !a.failed)))
    }

    /// Runs both checks one after the other against the in-memory map.
    async fn check_eligibility(&self, email: &Email) -> Result<Eligibility, StorageError> {
        let won = self.has_won(email).await?;
        let last_failure = self.last_recent_failure(email, Utc::now());
        Ok(Eligibility::resolve(won, last_failure.is_some(), last_failure))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn detail() -> AttemptDetail {
        AttemptDetail::new(1, std::time::Duration::from_secs(5), "Session abandoned.")
    }

    #[tokio::test]
    async fn test_create_user_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.create_user(&email("a@b.com")).await.unwrap();
        let b = store.create_user(&email("A@B.com")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_record_requires_user() {
        let store = MemoryStore::new();
        let err = store
            .record_attempt(&email("x@y.com"), true, &detail())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn test_failed_today_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed_attempt(&email("old@b.com"), true, detail(), now - Duration::hours(25));
        store.seed_attempt(&email("new@b.com"), true, detail(), now - Duration::hours(2));

        assert!(!store.has_failed_attempt_today(&email("old@b.com")).await.unwrap());
        assert!(store.has_failed_attempt_today(&email("new@b.com")).await.unwrap());
        assert!(!store.has_failed_attempt_today(&email("none@b.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_eligibility_precedence() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let c = email("c@d.com");
        store.seed_attempt(&c, false, detail(), now - Duration::days(30));
        store.seed_attempt(&c, true, detail(), now - Duration::hours(1));
        assert_eq!(store.check_eligibility(&c).await.unwrap(), Eligibility::AlreadyWon);

        let a = email("a@b.com");
        let failed_at = now - Duration::hours(2);
        store.seed_attempt(&a, true, detail(), failed_at);
        assert_eq!(
            store.check_eligibility(&a).await.unwrap(),
            Eligibility::AlreadyFailedToday {
                last_failure: Some(failed_at)
            }
        );
        assert_eq!(
            store.check_eligibility(&email("e@f.com")).await.unwrap(),
            Eligibility::Eligible
        );
    }
}
