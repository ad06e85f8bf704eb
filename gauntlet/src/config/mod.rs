//! Challenge configuration
//!
//! Tuning for a challenge run (time budget, grace periods, quiz rules,
//! completion token claims) is read once from an optional YAML file and
//! frozen into [`ChallengeSettings`]. Process-level settings such as the
//! database URL and listen address come from the command line and
//! environment (see [`crate::cli::args`]).

pub mod loader;
pub mod schema;
pub mod validation;

use std::time::Duration;

pub use loader::{LoadResult, load_challenge};
pub use schema::ChallengeFile;
pub use validation::{ValidationResult, Validator};

/// Default global time budget.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(25 * 60);

/// Default delay before a concluded session disconnects.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(10);

/// Default bound on the eligibility pre-check.
pub const DEFAULT_IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on each background side effect.
pub const DEFAULT_BACKGROUND_TIMEOUT: Duration = Duration::from_secs(15);

/// Default quiz time limit.
pub const DEFAULT_QUIZ_TIME_LIMIT: Duration = Duration::from_secs(60);

/// Default number of correct quiz answers needed.
pub const DEFAULT_QUIZ_PASS_THRESHOLD: usize = 7;

/// Default completion token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Claims embedded in the completion token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    /// Token lifetime.
    pub ttl: Duration,
    /// `iss` claim.
    pub issuer: String,
    /// Where the candidate should go next.
    pub link: String,
    /// What to do there.
    pub instructions: String,
    /// Who to follow.
    pub follow: String,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TOKEN_TTL,
            issuer: "Gauntlet".to_string(),
            link: String::new(),
            instructions: "In the meeting description, please write the key provided below and briefly share your thoughts on the challenge.".to_string(),
            follow: String::new(),
        }
    }
}

/// Resolved challenge tuning, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSettings {
    /// Global session budget.
    pub duration: Duration,
    /// How long a concluded session stays connected.
    pub exit_grace: Duration,
    /// Bound on the eligibility pre-check.
    pub identify_timeout: Duration,
    /// Bound on each persistence or notification task.
    pub background_timeout: Duration,
    /// Quiz time limit.
    pub quiz_time_limit: Duration,
    /// Correct answers needed to pass the quiz.
    pub quiz_pass_threshold: usize,
    /// Completion token claims.
    pub token: TokenSettings,
    /// Subject line of the completion email.
    pub notice_subject: String,
}

impl ChallengeSettings {
    /// Window during which a failure blocks another run.
    #[must_use]
    pub const fn retry_window() -> Duration {
        Duration::from_secs(gauntlet_core::RETRY_WINDOW_HOURS.unsigned_abs() * 3600)
    }
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            exit_grace: DEFAULT_EXIT_GRACE,
            identify_timeout: DEFAULT_IDENTIFY_TIMEOUT,
            background_timeout: DEFAULT_BACKGROUND_TIMEOUT,
            quiz_time_limit: DEFAULT_QUIZ_TIME_LIMIT,
            quiz_pass_threshold: DEFAULT_QUIZ_PASS_THRESHOLD,
            token: TokenSettings::default(),
            notice_subject: "Your challenge completion link".to_string(),
        }
    }
}
