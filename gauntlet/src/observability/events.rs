//! Structured session event stream.
//!
//! Typed events are written as newline-delimited JSON, each wrapped in an
//! envelope carrying a monotonically increasing sequence number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event in the life of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A terminal connected and a controller was created.
    SessionStarted {
        /// When the session started.
        timestamp: DateTime<Utc>,
        /// Per-connection identifier.
        session_id: String,
        /// Peer description (`"stdio"` or a socket address).
        peer: String,
    },

    /// The eligibility pre-check finished.
    Identified {
        /// When identification finished.
        timestamp: DateTime<Utc>,
        /// Per-connection identifier.
        session_id: String,
        /// Normalized address.
        email: String,
        /// `eligible`, `already_won`, `already_failed_today` or `unavailable`.
        eligibility: String,
    },

    /// The engine moved to the next step.
    StepAdvanced {
        /// When the transition happened.
        timestamp: DateTime<Utc>,
        /// Per-connection identifier.
        session_id: String,
        /// Zero-based index left behind.
        from: usize,
        /// Zero-based index entered.
        to: usize,
        /// Title of the entered step.
        title: String,
    },

    /// The run concluded and was handed to the background coordinator.
    SessionConcluded {
        /// When the run concluded.
        timestamp: DateTime<Utc>,
        /// Per-connection identifier.
        session_id: String,
        /// `success` or `failure`.
        outcome: String,
        /// 1-based step reached.
        step: usize,
        /// Elapsed session time in milliseconds.
        elapsed_ms: u64,
        /// Failure reason; empty on success.
        reason: String,
    },

    /// A background task reported back to its session.
    BackgroundTaskFinished {
        /// When the report was applied.
        timestamp: DateTime<Utc>,
        /// Per-connection identifier.
        session_id: String,
        /// `persist` or `notify`.
        task: String,
        /// Whether the task succeeded.
        success: bool,
        /// Result or error description.
        detail: String,
    },

    /// The session loop exited.
    SessionClosed {
        /// When the session closed.
        timestamp: DateTime<Utc>,
        /// Per-connection identifier.
        session_id: String,
        /// Why the loop ended.
        reason: String,
    },
}

#[derive(Debug, Serialize)]
struct EventEnvelope {
    seq: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer shared by all sessions.
///
/// Serialization or I/O failures are dropped; the event stream never takes
/// a session down.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter appending to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Writes one event as a JSON line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope { seq, event };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
