//! Informational end states.
//!
//! None of these accept input; each is completed from the moment it
//! becomes active.

use std::fmt::Write as _;
use std::time::Duration;

use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};
use crate::presentation::{clock, countdown};

// ============================================================================
// Success
// ============================================================================

/// Shown once the last puzzle is solved.
#[derive(Debug, Default)]
pub struct Success {
    completed: bool,
}

impl Success {
    /// Creates the success screen.
    #[must_use]
    pub const fn new() -> Self {
        Self { completed: false }
    }
}

impl Step for Success {
    fn title(&self) -> &str {
        "Challenge complete"
    }

    fn kind(&self) -> StepKind {
        StepKind::Success
    }

    fn init(&mut self, _now: Instant) -> Option<Command> {
        self.completed = true;
        None
    }

    fn handle(&mut self, _event: &StepEvent) -> Option<Command> {
        None
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        format!(
            "{}\n\nYou solved every step.\nA completion link with further instructions is on its way to your inbox.\nCheck your spam folder if it doesn't show up in a few minutes.\n",
            theme.good(&theme.bold("Congratulations!"))
        )
    }
}

// ============================================================================
// Failure
// ============================================================================

/// Replaces the whole sequence when a run fails.
#[derive(Debug)]
pub struct Failure {
    step_reached: usize,
    elapsed: Duration,
    reason: String,
    retry_in: Option<Duration>,
    retry_at: Option<Instant>,
}

impl Failure {
    /// Creates the failure screen.
    ///
    /// `step_reached` is 1-based; `0` means no puzzle was started.
    /// `retry_in` drives the countdown to the next eligible run.
    #[must_use]
    pub fn new(
        step_reached: usize,
        elapsed: Duration,
        reason: impl Into<String>,
        retry_in: Option<Duration>,
    ) -> Self {
        Self {
            step_reached,
            elapsed,
            reason: reason.into(),
            retry_in,
            retry_at: None,
        }
    }

    /// Why the run failed.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// 1-based step the run ended on.
    #[must_use]
    pub const fn step_reached(&self) -> usize {
        self.step_reached
    }
}

impl Step for Failure {
    fn title(&self) -> &str {
        "Challenge failed"
    }

    fn kind(&self) -> StepKind {
        StepKind::Failure
    }

    fn init(&mut self, now: Instant) -> Option<Command> {
        self.retry_at = self.retry_in.map(|d| now + d);
        None
    }

    fn handle(&mut self, _event: &StepEvent) -> Option<Command> {
        None
    }

    fn is_completed(&self) -> bool {
        true
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::new();
        let _ = writeln!(out, "{}\n", theme.bad(&self.reason));
        if self.step_reached > 0 {
            let _ = writeln!(out, "You reached step {}.", self.step_reached);
            let _ = writeln!(out, "Total time: {}", clock(self.elapsed));
        }
        match self.retry_at {
            Some(at) => {
                let _ = writeln!(
                    out,
                    "\nYou can try again tomorrow. Next attempt in {}.",
                    theme.warn(&countdown(at.saturating_duration_since(ctx.now)))
                );
            }
            None => out.push_str("\nPlease try again later.\n"),
        }
        out
    }
}

// ============================================================================
// AlreadyWon
// ============================================================================

/// Routed to when the identity already has a win.
#[derive(Debug, Default)]
pub struct AlreadyWon;

impl AlreadyWon {
    /// Creates the screen.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Step for AlreadyWon {
    fn title(&self) -> &str {
        "Already completed"
    }

    fn kind(&self) -> StepKind {
        StepKind::AlreadyWon
    }

    fn init(&mut self, _now: Instant) -> Option<Command> {
        None
    }

    fn handle(&mut self, _event: &StepEvent) -> Option<Command> {
        None
    }

    fn is_completed(&self) -> bool {
        true
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        format!(
            "{}\n\nYou already completed the challenge. Check your inbox for the completion link.\n",
            ctx.theme.good("Welcome back!")
        )
    }
}

// ============================================================================
// AlreadyFailedToday
// ============================================================================

/// Routed to when the identity failed within the retry window.
#[derive(Debug)]
pub struct AlreadyFailedToday {
    retry_in: Option<Duration>,
    retry_at: Option<Instant>,
}

impl AlreadyFailedToday {
    /// Creates the screen; `retry_in` is the time left until eligibility,
    /// when known.
    #[must_use]
    pub const fn new(retry_in: Option<Duration>) -> Self {
        Self {
            retry_in,
            retry_at: None,
        }
    }
}

impl Step for AlreadyFailedToday {
    fn title(&self) -> &str {
        "Come back tomorrow"
    }

    fn kind(&self) -> StepKind {
        StepKind::AlreadyFailedToday
    }

    fn init(&mut self, now: Instant) -> Option<Command> {
        self.retry_at = self.retry_in.map(|d| now + d);
        None
    }

    fn handle(&mut self, _event: &StepEvent) -> Option<Command> {
        None
    }

    fn is_completed(&self) -> bool {
        true
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::from("You already attempted the challenge in the last 24 hours.\n");
        if let Some(at) = self.retry_at {
            let _ = writeln!(
                out,
                "Next attempt in {}.",
                theme.warn(&countdown(at.saturating_duration_since(ctx.now)))
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::Theme;

    #[tokio::test(start_paused = true)]
    async fn test_success_completes_on_init() {
        let mut step = Success::new();
        assert!(!step.is_completed());
        assert_eq!(step.init(Instant::now()), None);
        assert!(step.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_renders_reason_step_and_countdown() {
        let now = Instant::now();
        let mut step = Failure::new(
            3,
            Duration::from_secs(125),
            "Time's up!",
            Some(Duration::from_secs(24 * 3600)),
        );
        step.init(now);
        let theme = Theme::plain();
        let text = step.render(&RenderContext {
            theme: &theme,
            now: now + Duration::from_secs(1),
        });
        assert!(text.contains("Time's up!"));
        assert!(text.contains("You reached step 3."));
        assert!(text.contains("Total time: 02:05"));
        assert!(text.contains("23h 59m 59s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_retry_window() {
        let mut step = Failure::new(0, Duration::ZERO, "Something went wrong", None);
        step.init(Instant::now());
        let theme = Theme::plain();
        let text = step.render(&RenderContext {
            theme: &theme,
            now: Instant::now(),
        });
        assert!(!text.contains("You reached step"));
        assert!(text.contains("try again later"));
    }

    #[test]
    fn test_informational_steps_are_completed() {
        assert!(AlreadyWon::new().is_completed());
        assert!(AlreadyFailedToday::new(None).is_completed());
    }
}
