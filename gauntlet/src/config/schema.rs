//! On-disk challenge file schema.
//!
//! Every field is optional; missing fields fall back to the defaults in
//! [`ChallengeSettings`](super::ChallengeSettings). Durations are
//! human-readable strings such as `"25m"` or `"1h 30m"`.

use serde::{Deserialize, Serialize};

/// Top-level challenge file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengeFile {
    /// Global session budget.
    pub duration: Option<String>,
    /// Delay before a concluded session disconnects.
    pub exit_grace: Option<String>,
    /// Bound on the eligibility pre-check.
    pub identify_timeout: Option<String>,
    /// Bound on each background side effect.
    pub background_timeout: Option<String>,
    /// Quiz tuning.
    #[serde(default)]
    pub quiz: QuizSection,
    /// Completion token claims.
    #[serde(default)]
    pub token: TokenSection,
    /// Completion email.
    #[serde(default)]
    pub notice: NoticeSection,
}

/// `quiz:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuizSection {
    /// Time limit for the whole quiz.
    pub time_limit: Option<String>,
    /// Correct answers needed, out of 10.
    pub pass_threshold: Option<usize>,
}

/// `token:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSection {
    /// Token lifetime.
    pub ttl: Option<String>,
    /// `iss` claim.
    pub issuer: Option<String>,
    /// Booking link.
    pub link: Option<String>,
    /// Instructions for the candidate.
    pub instructions: Option<String>,
    /// Handle to follow.
    pub follow: Option<String>,
}

/// `notice:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoticeSection {
    /// Email subject.
    pub subject: Option<String>,
}
