//! Error types for `Gauntlet`
//!
//! One error enum per concern, aggregated into [`GauntletError`] which maps
//! every failure to a process exit code.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub use gauntlet_core::error::{ConfigError, EmailError, Severity, ValidationIssue};

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `Gauntlet` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// Storage error (database unreachable, schema failure)
    pub const STORAGE_ERROR: i32 = 3;

    /// Transport error (bind failed, terminal I/O failed)
    pub const TRANSPORT_ERROR: i32 = 4;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `Gauntlet` operations.
#[derive(Debug, Error)]
pub enum GauntletError {
    /// Challenge configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage backend error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Notification delivery error
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Completion token error
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Transport layer error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Step engine misuse
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Invalid command-line usage
    #[error("{0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GauntletError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Storage(_) => ExitCode::STORAGE_ERROR,
            Self::Transport(_) | Self::Io(_) => ExitCode::TRANSPORT_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Notify(_) | Self::Token(_) | Self::Engine(_) => ExitCode::ERROR,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GauntletError>;

// ============================================================================
// Storage Errors
// ============================================================================

/// Errors raised by an [`AttemptStore`](crate::storage::AttemptStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened or migrated
    #[error("failed to open store at {location}: {message}")]
    Open {
        /// Connection string or path
        location: String,
        /// Underlying failure
        message: String,
    },

    /// A query failed
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An attempt was recorded for an identity with no user row
    #[error("no user registered for {0}")]
    UnknownUser(String),

    /// A stored value could not be decoded
    #[error("corrupt {what} in store: {message}")]
    Corrupt {
        /// Which value was unreadable
        what: &'static str,
        /// Decoder message
        message: String,
    },

    /// The blocking worker running the query died
    #[error("storage worker failed: {0}")]
    Worker(String),

    /// The backend is not reachable
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Notification Errors
// ============================================================================

/// Errors raised by a [`Notifier`](crate::notify::Notifier).
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The HTTP request could not be sent or its body read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote side answered with a non-success status
    #[error("{stage} returned HTTP {status}: {body}")]
    Status {
        /// Which request failed ("render" or "send")
        stage: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The notifier is missing required configuration
    #[error("notifier misconfigured: {0}")]
    Misconfigured(String),
}

// ============================================================================
// Token Errors
// ============================================================================

/// Errors raised while issuing or verifying completion tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The secret is unusable
    #[error("invalid signing key")]
    InvalidKey,

    /// The token does not have three base64url segments
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// The header names an algorithm other than HS256
    #[error("unsupported token algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// The signature does not match
    #[error("token signature mismatch")]
    BadSignature,

    /// The token is past its expiry
    #[error("token expired at {0}")]
    Expired(i64),

    /// The token is not valid yet
    #[error("token not valid before {0}")]
    NotYetValid(i64),

    /// Any other encoding or decoding failure
    #[error("token error: {0}")]
    Jwt(jsonwebtoken::errors::Error),
}

// ============================================================================
// Transport Errors
// ============================================================================

/// Terminal transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Listen address could not be parsed
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// Writing a frame failed
    #[error("terminal write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The peer went away
    #[error("terminal closed")]
    Closed,
}

// ============================================================================
// Engine Errors
// ============================================================================

/// Misuse of the step progression engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A run needs at least one step
    #[error("step sequence is empty")]
    EmptySequence,

    /// The last step must be able to conclude the run on its own
    #[error("final step '{0}' is not a terminal step")]
    NonTerminalLast(String),
}

// ============================================================================
// Background Errors
// ============================================================================

/// Failure of a fire-and-forget background task, as reported back to the
/// owning session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackgroundError {
    /// The task did not finish in time
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Process shutdown aborted the task
    #[error("cancelled by shutdown")]
    Cancelled,

    /// The collaborator returned an error
    #[error("{0}")]
    Failed(String),
}
