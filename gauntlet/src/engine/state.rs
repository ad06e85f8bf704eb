//! Engine state and the values it reports back to the session.

use std::fmt;
use std::time::Duration;

use gauntlet_core::AttemptDetail;

use crate::step::Command;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// The step at this index receives events.
    Active(usize),
    /// The run is over; no further transitions happen.
    Concluded,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(i) => write!(f, "active({i})"),
            Self::Concluded => f.write_str("concluded"),
        }
    }
}

/// Record of one `Active(i) -> Active(i+1)` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTransition {
    /// Index left behind.
    pub from: usize,
    /// Index entered.
    pub to: usize,
    /// Title of the entered step.
    pub title: String,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The last step completed.
    Succeeded,
    /// `set_failed` was invoked.
    Failed,
}

impl Verdict {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Failed => "failure",
        }
    }
}

/// The outcome of a concluded run, handed to the background coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conclusion {
    /// Success or failure.
    pub verdict: Verdict,
    /// 1-based step the run ended on.
    pub step_reached: usize,
    /// Time since the session started.
    pub elapsed: Duration,
    /// Failure reason; empty on success.
    pub reason: String,
}

impl Conclusion {
    /// A successful run.
    #[must_use]
    pub const fn success(step_reached: usize, elapsed: Duration) -> Self {
        Self {
            verdict: Verdict::Succeeded,
            step_reached,
            elapsed,
            reason: String::new(),
        }
    }

    /// A failed run.
    #[must_use]
    pub fn failure(step_reached: usize, elapsed: Duration, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Failed,
            step_reached,
            elapsed,
            reason: reason.into(),
        }
    }

    /// Whether the run was won.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.verdict, Verdict::Succeeded)
    }

    /// The detail blob persisted with the attempt.
    #[must_use]
    pub fn detail(&self) -> AttemptDetail {
        AttemptDetail::new(self.step_reached, self.elapsed, self.reason.clone())
    }
}

/// Everything that happened while handling one event.
#[derive(Debug, Default)]
pub struct Progress {
    /// Follow-ups requested by the active step or by newly initialized steps.
    pub commands: Vec<Command>,
    /// Transitions, in order.
    pub transitions: Vec<StepTransition>,
    /// Set when this event concluded the run successfully.
    pub conclusion: Option<Conclusion>,
}

impl Progress {
    /// Whether the event changed nothing observable beyond the step itself.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.commands.is_empty() && self.transitions.is_empty() && self.conclusion.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conclusion_detail() {
        let c = Conclusion::failure(3, Duration::from_millis(1500), "Time's up!");
        let detail = c.detail();
        assert_eq!(detail.step, 3);
        assert_eq!(detail.elapsed_millis, 1500);
        assert_eq!(detail.message, "Time's up!");
        assert!(!c.is_success());
    }

    #[test]
    fn test_success_has_empty_reason() {
        let c = Conclusion::success(7, Duration::from_secs(600));
        assert!(c.is_success());
        assert!(c.detail().message.is_empty());
        assert_eq!(c.verdict.label(), "success");
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Active(2).to_string(), "active(2)");
        assert_eq!(EngineState::Concluded.to_string(), "concluded");
    }
}
