//! Step contract and variants.
//!
//! Every puzzle and every informational screen implements [`Step`]. The
//! progression engine only ever talks to steps through this trait: it
//! forwards events, asks whether the step is completed, and renders it.
//! Puzzle rules stay private to each variant.

pub mod code_fix;
pub mod decode;
pub mod grid_path;
pub mod password;
pub mod quiz;
pub mod terminal;
pub mod word_guess;

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ChallengeSettings;
use crate::presentation::Theme;

pub use code_fix::CodeFix;
pub use decode::Decode;
pub use grid_path::GridPath;
pub use password::Password;
pub use quiz::Quiz;
pub use terminal::{AlreadyFailedToday, AlreadyWon, Failure, Success};
pub use word_guess::WordGuess;

// ============================================================================
// Events and commands
// ============================================================================

/// An event forwarded to the active step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// One submitted line of input, without the trailing newline.
    Input(String),
    /// A scheduling pulse observed at the given instant.
    Tick(Instant),
}

/// A follow-up requested by a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Deliver a [`StepEvent::Tick`] after the given delay.
    Schedule(Duration),
    /// The step hit its own terminal failure condition; the session must
    /// fail the run with this reason.
    Fail(String),
}

/// Identifies a step variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Five-letter word guessing.
    WordGuess,
    /// Progressive password constraints.
    Password,
    /// Timed arithmetic quiz.
    Quiz,
    /// Repair an async code snippet.
    CodeFix,
    /// Route through an obstacle grid.
    GridPath,
    /// Decode the final message.
    Decode,
    /// Run completed.
    Success,
    /// Run failed.
    Failure,
    /// Identity already has a win.
    AlreadyWon,
    /// Identity failed within the retry window.
    AlreadyFailedToday,
}

impl StepKind {
    /// Informational end states rather than puzzles.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::AlreadyWon | Self::AlreadyFailedToday
        )
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::WordGuess => "word_guess",
            Self::Password => "password",
            Self::Quiz => "quiz",
            Self::CodeFix => "code_fix",
            Self::GridPath => "grid_path",
            Self::Decode => "decode",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::AlreadyWon => "already_won",
            Self::AlreadyFailedToday => "already_failed_today",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inputs to a render call. Rendering is a pure function of step state
/// plus this context.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Styling.
    pub theme: &'a Theme,
    /// Monotonic instant the frame is drawn at.
    pub now: Instant,
}

// ============================================================================
// Step trait
// ============================================================================

/// The uniform capability set every step provides.
///
/// `is_completed` is monotonic: once it returns `true` it keeps returning
/// `true` for the lifetime of the instance.
pub trait Step: Send {
    /// Human-readable title.
    fn title(&self) -> &str;

    /// Variant identifier.
    fn kind(&self) -> StepKind;

    /// Called exactly once, when the engine makes this step active.
    fn init(&mut self, now: Instant) -> Option<Command>;

    /// Consumes one event.
    fn handle(&mut self, event: &StepEvent) -> Option<Command>;

    /// Whether the engine may advance past this step.
    fn is_completed(&self) -> bool;

    /// Renders the current state.
    fn render(&self, ctx: &RenderContext<'_>) -> String;
}

impl fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("kind", &self.kind())
            .field("title", &self.title())
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Builds the full puzzle sequence for one run, ending in [`Success`].
///
/// `seed` picks the secret word so tests can fix it.
#[must_use]
pub fn standard_sequence(settings: &ChallengeSettings, seed: u64) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(WordGuess::seeded(seed)),
        Box::new(Password::new()),
        Box::new(Quiz::new(settings.quiz_time_limit, settings.quiz_pass_threshold)),
        Box::new(CodeFix::new()),
        Box::new(GridPath::new()),
        Box::new(Decode::new()),
        Box::new(Success::new()),
    ]
}
