//! Presentation configuration.
//!
//! A single immutable [`Theme`] is chosen at startup and passed by
//! reference into every render call. Steps never touch escape codes
//! directly.

use std::fmt::Write as _;
use std::time::Duration;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Text styling applied to rendered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    ansi: bool,
}

impl Theme {
    /// Styled output using ANSI escape sequences.
    #[must_use]
    pub const fn ansi() -> Self {
        Self { ansi: true }
    }

    /// Unstyled output.
    #[must_use]
    pub const fn plain() -> Self {
        Self { ansi: false }
    }

    /// Whether escape sequences are emitted.
    #[must_use]
    pub const fn is_ansi(&self) -> bool {
        self.ansi
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.ansi {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// Headings and emphasis.
    #[must_use]
    pub fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    /// Secondary hints.
    #[must_use]
    pub fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    /// Correct answers and satisfied rules.
    #[must_use]
    pub fn good(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    /// Partial matches and warnings.
    #[must_use]
    pub fn warn(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    /// Errors and unmet rules.
    #[must_use]
    pub fn bad(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    /// Code and user-supplied values.
    #[must_use]
    pub fn accent(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }

    /// Prefix written before every full-frame redraw.
    #[must_use]
    pub const fn frame_prefix(&self) -> &'static str {
        if self.ansi { CLEAR } else { "\n" }
    }

    /// Renders a titled frame body with the remaining budget in the header.
    #[must_use]
    pub fn frame(&self, title: &str, remaining: Option<Duration>, body: &str) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}", self.bold(title));
        if let Some(left) = remaining {
            let _ = write!(out, "  {}", self.dim(&format!("[{} left]", clock(left))));
        }
        out.push_str("\n\n");
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::plain()
    }
}

/// Formats a duration as `mm:ss`, or `h:mm:ss` past one hour.
#[must_use]
pub fn clock(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Formats a long countdown as `HHh MMm SSs`.
#[must_use]
pub fn countdown(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{:02}h {:02}m {:02}s",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
