//! Challenge file validation.
//!
//! Collects every problem in one pass instead of stopping at the first,
//! and produces resolved [`ChallengeSettings`] when there are no errors.

use std::time::Duration;

use crate::error::{Severity, ValidationIssue};

use super::schema::ChallengeFile;
use super::{ChallengeSettings, TokenSettings};
use crate::step::quiz::QUESTION_COUNT;

/// Outcome of validating a challenge file.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Problems that prevent the file from being used.
    pub errors: Vec<ValidationIssue>,
    /// Suspicious but usable values.
    pub warnings: Vec<ValidationIssue>,
    /// Resolved settings; `None` when there are errors.
    pub settings: Option<ChallengeSettings>,
}

impl ValidationResult {
    /// Returns `true` if validation passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Challenge file validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn warning(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }

    /// Parses an optional duration, recording an error for bad or zero
    /// values and returning `default` in their place.
    fn duration(&mut self, path: &str, raw: Option<&str>, default: Duration) -> Duration {
        let Some(raw) = raw else {
            return default;
        };
        match humantime::parse_duration(raw.trim()) {
            Ok(d) if d.is_zero() => {
                self.error(path, "must be greater than zero");
                default
            }
            Ok(d) => d,
            Err(e) => {
                self.error(path, format!("invalid duration '{raw}': {e}"));
                default
            }
        }
    }

    /// Validates a parsed challenge file.
    pub fn validate(&mut self, file: &ChallengeFile) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();
        let defaults = ChallengeSettings::default();

        let duration = self.duration("duration", file.duration.as_deref(), defaults.duration);
        let exit_grace = self.duration("exit_grace", file.exit_grace.as_deref(), defaults.exit_grace);
        let identify_timeout = self.duration(
            "identify_timeout",
            file.identify_timeout.as_deref(),
            defaults.identify_timeout,
        );
        let background_timeout = self.duration(
            "background_timeout",
            file.background_timeout.as_deref(),
            defaults.background_timeout,
        );
        let quiz_time_limit = self.duration(
            "quiz.time_limit",
            file.quiz.time_limit.as_deref(),
            defaults.quiz_time_limit,
        );
        let ttl = self.duration("token.ttl", file.token.ttl.as_deref(), defaults.token.ttl);

        let quiz_pass_threshold = file.quiz.pass_threshold.unwrap_or(defaults.quiz_pass_threshold);
        if !(1..=QUESTION_COUNT).contains(&quiz_pass_threshold) {
            self.error(
                "quiz.pass_threshold",
                format!("must be between 1 and {QUESTION_COUNT}, got {quiz_pass_threshold}"),
            );
        }

        if quiz_time_limit >= duration {
            self.warning(
                "quiz.time_limit",
                "quiz time limit is not shorter than the whole session budget",
            );
        }
        if identify_timeout >= duration {
            self.error("identify_timeout", "must be shorter than the session duration");
        }
        if ttl > ChallengeSettings::retry_window() * 7 {
            self.warning("token.ttl", "completion tokens valid for more than a week");
        }

        let token = TokenSettings {
            ttl,
            issuer: non_empty(file.token.issuer.as_deref()).unwrap_or(defaults.token.issuer),
            link: file.token.link.clone().unwrap_or(defaults.token.link),
            instructions: non_empty(file.token.instructions.as_deref())
                .unwrap_or(defaults.token.instructions),
            follow: file.token.follow.clone().unwrap_or(defaults.token.follow),
        };
        if token.link.is_empty() {
            self.warning("token.link", "completion tokens will not carry a link");
        }

        let settings = ChallengeSettings {
            duration,
            exit_grace,
            identify_timeout,
            background_timeout,
            quiz_time_limit,
            quiz_pass_threshold,
            token,
            notice_subject: non_empty(file.notice.subject.as_deref())
                .unwrap_or(defaults.notice_subject),
        };

        let valid = self.errors.is_empty();
        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
            settings: valid.then_some(settings),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
