//! Challenge file loading.

use std::path::Path;

use tracing::warn;

use crate::error::{ConfigError, ValidationIssue};

use super::schema::ChallengeFile;
use super::validation::Validator;
use super::ChallengeSettings;

/// Largest challenge file accepted.
const MAX_FILE_SIZE: u64 = 64 * 1024;

/// A successfully loaded challenge file.
#[derive(Debug)]
pub struct LoadResult {
    /// Resolved settings.
    pub settings: ChallengeSettings,
    /// Non-fatal issues.
    pub warnings: Vec<ValidationIssue>,
}

/// Reads, parses and validates a challenge file.
///
/// # Errors
///
/// Returns [`ConfigError::MissingFile`] if the file cannot be read,
/// [`ConfigError::ParseError`] on malformed YAML or unknown fields, and
/// [`ConfigError::ValidationError`] listing every invalid value.
pub fn load_challenge(path: &Path) -> Result<LoadResult, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
        path: path.to_path_buf(),
    })?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(ConfigError::InvalidValue {
            field: "file_size".to_string(),
            value: format!("{} bytes", metadata.len()),
            expected: format!("at most {MAX_FILE_SIZE} bytes"),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
        path: path.to_path_buf(),
    })?;
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);

    let file: ChallengeFile = if raw.trim().is_empty() {
        ChallengeFile::default()
    } else {
        serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?
    };

    let result = Validator::new().validate(&file);
    for warning in &result.warnings {
        warn!(path = %path.display(), "{warning}");
    }
    match result.settings {
        Some(settings) => Ok(LoadResult {
            settings,
            warnings: result.warnings,
        }),
        None => Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: result.errors,
        }),
    }
}
