//! Attempt records and eligibility.
//!
//! An attempt is the durable outcome of one concluded session. Eligibility
//! is derived from a user's attempts: a win is permanent, a failure blocks
//! new runs for [`RETRY_WINDOW_HOURS`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::email::Email;

/// Length of the rolling window during which a failure blocks a new run.
pub const RETRY_WINDOW_HOURS: i64 = 24;

/// Returns the retry window as a chrono duration.
#[must_use]
pub const fn retry_window() -> Duration {
    Duration::hours(RETRY_WINDOW_HOURS)
}

/// Structured detail persisted alongside an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDetail {
    /// 1-based number of the last step reached.
    pub step: usize,
    /// Wall-clock time spent in the session.
    pub elapsed_millis: u64,
    /// Failure reason; empty for a win.
    pub message: String,
}

impl AttemptDetail {
    /// Creates a new detail blob.
    #[must_use]
    pub fn new(step: usize, elapsed: std::time::Duration, message: impl Into<String>) -> Self {
        Self {
            step,
            elapsed_millis: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            message: message.into(),
        }
    }
}

/// A persisted attempt as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Identity the attempt belongs to.
    pub email: Email,
    /// `true` unless the session was won.
    pub failed: bool,
    /// Outcome detail.
    pub detail: AttemptDetail,
    /// When the attempt was recorded.
    pub submitted_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Returns `true` if this is a failure recorded within the retry window
    /// ending at `now`.
    #[must_use]
    pub fn is_recent_failure(&self, now: DateTime<Utc>) -> bool {
        self.failed && self.submitted_at > now - retry_window()
    }
}

/// Outcome of the eligibility pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    /// No blocking attempt; the run may start.
    Eligible,
    /// The user has a recorded win.
    AlreadyWon,
    /// The user failed within the retry window.
    AlreadyFailedToday {
        /// Most recent failure inside the window, when known.
        last_failure: Option<DateTime<Utc>>,
    },
}

impl Eligibility {
    /// Combines the two independent facts into one verdict.
    ///
    /// A recorded win takes precedence over a same-day failure.
    #[must_use]
    pub const fn resolve(has_won: bool, failed_today: bool, last_failure: Option<DateTime<Utc>>) -> Self {
        if has_won {
            Self::AlreadyWon
        } else if failed_today {
            Self::AlreadyFailedToday { last_failure }
        } else {
            Self::Eligible
        }
    }

    /// Returns when the user may try again, if blocked by a failure with a
    /// known timestamp.
    #[must_use]
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::AlreadyFailedToday {
                last_failure: Some(at),
            } => Some(*at + retry_window()),
            _ => None,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::AlreadyWon => "already_won",
            Self::AlreadyFailedToday { .. } => "already_failed_today",
        }
    }
}
