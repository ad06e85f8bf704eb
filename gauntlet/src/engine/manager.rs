//! The step manager.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::observability::metrics;
use crate::step::{Failure, Step, StepEvent, StepKind};

use super::state::{Conclusion, EngineState, Progress, StepTransition};

/// Owns the ordered step sequence for one session.
///
/// The index only moves forward, one step at a time, and only after the
/// active step reports completion. The single exception is
/// [`set_failed`](Self::set_failed), which replaces the whole sequence with
/// one [`Failure`] step and resets the index to 0.
pub struct StepManager {
    steps: Vec<Box<dyn Step>>,
    index: usize,
    state: EngineState,
    failed: bool,
    failure_reason: Option<String>,
    started_at: Instant,
    retry_window: Duration,
}

impl std::fmt::Debug for StepManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepManager")
            .field("state", &self.state)
            .field("index", &self.index)
            .field("len", &self.steps.len())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl StepManager {
    /// Creates a manager for a full run. Call [`start`](Self::start) to
    /// initialize the first step.
    ///
    /// `started_at` is the session start the elapsed time is measured from.
    /// `retry_window` seeds the countdown shown on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptySequence`] for an empty list and
    /// [`EngineError::NonTerminalLast`] when the last step is a puzzle.
    pub fn new(
        steps: Vec<Box<dyn Step>>,
        started_at: Instant,
        retry_window: Duration,
    ) -> Result<Self, EngineError> {
        let last = steps.last().ok_or(EngineError::EmptySequence)?;
        if !last.kind().is_terminal() {
            return Err(EngineError::NonTerminalLast(last.title().to_string()));
        }
        Ok(Self {
            steps,
            index: 0,
            state: EngineState::Active(0),
            failed: false,
            failure_reason: None,
            started_at,
            retry_window,
        })
    }

    /// Creates an already-concluded manager showing a single informational
    /// step. Used when eligibility routing short-circuits the run; no
    /// conclusion is ever reported.
    #[must_use]
    pub fn informational(mut step: Box<dyn Step>, now: Instant) -> Self {
        step.init(now);
        Self {
            steps: vec![step],
            index: 0,
            state: EngineState::Concluded,
            failed: false,
            failure_reason: None,
            started_at: now,
            retry_window: Duration::ZERO,
        }
    }

    /// Initializes step 0.
    pub fn start(&mut self, now: Instant) -> Progress {
        let mut progress = Progress::default();
        if let EngineState::Active(i) = self.state {
            if let Some(step) = self.steps.get_mut(i) {
                debug!(index = i, title = step.title(), "initializing first step");
                progress.commands.extend(step.init(now));
            }
            self.settle(now, &mut progress);
        }
        progress
    }

    /// Forwards one event to the active step and applies any resulting
    /// transitions before returning.
    pub fn dispatch(&mut self, event: &StepEvent, now: Instant) -> Progress {
        let mut progress = Progress::default();
        let EngineState::Active(i) = self.state else {
            return progress;
        };
        let Some(step) = self.steps.get_mut(i) else {
            debug!(index = i, len = self.steps.len(), "event for out-of-range step ignored");
            return progress;
        };
        progress.commands.extend(step.handle(event));
        self.settle(now, &mut progress);
        progress
    }

    fn settle(&mut self, now: Instant, progress: &mut Progress) {
        while let EngineState::Active(i) = self.state {
            if !self.steps.get(i).is_some_and(|s| s.is_completed()) {
                break;
            }
            let next = i + 1;
            if next < self.steps.len() {
                self.index = next;
                self.state = EngineState::Active(next);
                let step = &mut self.steps[next];
                info!(from = i, to = next, title = step.title(), "step transition");
                metrics::record_step_transition(i, next);
                progress.transitions.push(StepTransition {
                    from: i,
                    to: next,
                    title: step.title().to_string(),
                });
                progress.commands.extend(step.init(now));
            } else {
                self.state = EngineState::Concluded;
                let elapsed = now.saturating_duration_since(self.started_at);
                info!(step = next, ?elapsed, "run completed");
                progress.conclusion = Some(Conclusion::success(next, elapsed));
            }
        }
    }

    /// Fails the run: discards the remaining sequence, substitutes a single
    /// [`Failure`] step, resets the index to 0 and latches the failed flag.
    ///
    /// Returns `None` if the run had already concluded.
    pub fn set_failed(&mut self, reason: impl Into<String>, now: Instant) -> Option<Conclusion> {
        let EngineState::Active(i) = self.state else {
            return None;
        };
        let reason = reason.into();
        let step_reached = i + 1;
        let elapsed = now.saturating_duration_since(self.started_at);
        info!(step = step_reached, reason = %reason, "run failed");

        let mut failure = Failure::new(step_reached, elapsed, reason.clone(), Some(self.retry_window));
        failure.init(now);
        self.steps = vec![Box::new(failure)];
        self.index = 0;
        self.state = EngineState::Concluded;
        self.failed = true;
        self.failure_reason = Some(reason.clone());

        Some(Conclusion::failure(step_reached, elapsed, reason))
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Index of the step being shown.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.index
    }

    /// The step being shown.
    #[must_use]
    pub fn current(&self) -> Option<&dyn Step> {
        self.steps.get(self.index).map(AsRef::as_ref)
    }

    /// Kind of the step being shown.
    #[must_use]
    pub fn current_kind(&self) -> Option<StepKind> {
        self.current().map(Step::kind)
    }

    /// Number of steps in the current sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence is empty. Never true for a constructed manager.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the run has concluded.
    #[must_use]
    pub const fn is_concluded(&self) -> bool {
        matches!(self.state, EngineState::Concluded)
    }

    /// Whether `set_failed` has been applied.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    /// The reason passed to `set_failed`.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Command, RenderContext, Success};

    /// Completes after `needed` inputs equal to "ok"; fails on "boom".
    struct Scripted {
        needed: usize,
        seen: usize,
        inits: usize,
    }

    impl Scripted {
        fn boxed(needed: usize) -> Box<dyn Step> {
            Box::new(Self {
                needed,
                seen: 0,
                inits: 0,
            })
        }
    }

    impl Step for Scripted {
        fn title(&self) -> &str {
            "scripted"
        }

        fn kind(&self) -> StepKind {
            StepKind::WordGuess
        }

        fn init(&mut self, _now: Instant) -> Option<Command> {
            self.inits += 1;
            Some(Command::Schedule(Duration::from_secs(1)))
        }

        fn handle(&mut self, event: &StepEvent) -> Option<Command> {
            match event {
                StepEvent::Input(s) if s == "ok" => {
                    self.seen += 1;
                    None
                }
                StepEvent::Input(s) if s == "boom" => Some(Command::Fail("boom".to_string())),
                _ => None,
            }
        }

        fn is_completed(&self) -> bool {
            self.seen >= self.needed
        }

        fn render(&self, _ctx: &RenderContext<'_>) -> String {
            String::new()
        }
    }

    fn ok() -> StepEvent {
        StepEvent::Input("ok".to_string())
    }

    fn manager(puzzles: &[usize]) -> StepManager {
        let mut steps: Vec<Box<dyn Step>> = puzzles.iter().map(|n| Scripted::boxed(*n)).collect();
        steps.push(Box::new(Success::new()));
        StepManager::new(steps, Instant::now(), Duration::from_secs(86_400)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_empty_and_open_ended_sequences() {
        let now = Instant::now();
        assert_eq!(
            StepManager::new(Vec::new(), now, Duration::ZERO).unwrap_err(),
            EngineError::EmptySequence
        );
        assert!(matches!(
            StepManager::new(vec![Scripted::boxed(1)], now, Duration::ZERO),
            Err(EngineError::NonTerminalLast(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_initializes_first_step() {
        let mut m = manager(&[1, 1]);
        let progress = m.start(Instant::now());
        assert_eq!(progress.commands, vec![Command::Schedule(Duration::from_secs(1))]);
        assert_eq!(m.state(), EngineState::Active(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_advance_initializes_next_step() {
        let mut m = manager(&[2, 1]);
        m.start(Instant::now());

        let p = m.dispatch(&ok(), Instant::now());
        assert!(p.transitions.is_empty());
        assert_eq!(m.current_index(), 0);

        let p = m.dispatch(&ok(), Instant::now());
        assert_eq!(
            p.transitions,
            vec![StepTransition {
                from: 0,
                to: 1,
                title: "scripted".to_string()
            }]
        );
        // the next step's init ran inside the same dispatch
        assert_eq!(p.commands, vec![Command::Schedule(Duration::from_secs(1))]);
        assert_eq!(m.state(), EngineState::Active(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_puzzle_concludes_through_success() {
        let start = Instant::now();
        let mut m = manager(&[1]);
        m.start(start);
        tokio::time::advance(Duration::from_secs(90)).await;

        let p = m.dispatch(&ok(), Instant::now());
        assert_eq!(p.transitions.len(), 1);
        let conclusion = p.conclusion.expect("run should conclude");
        assert!(conclusion.is_success());
        assert_eq!(conclusion.step_reached, 2);
        assert_eq!(conclusion.elapsed, Duration::from_secs(90));
        assert_eq!(m.state(), EngineState::Concluded);
        assert_eq!(m.current_kind(), Some(StepKind::Success));

        // concluded engines ignore everything
        assert!(m.dispatch(&ok(), Instant::now()).is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_failure_is_reported_not_applied() {
        let mut m = manager(&[1]);
        m.start(Instant::now());
        let p = m.dispatch(&StepEvent::Input("boom".to_string()), Instant::now());
        assert_eq!(p.commands, vec![Command::Fail("boom".to_string())]);
        assert!(!m.is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_failed_truncates_and_latches() {
        let mut m = manager(&[1, 1, 1]);
        m.start(Instant::now());
        m.dispatch(&ok(), Instant::now());
        assert_eq!(m.current_index(), 1);

        let conclusion = m.set_failed("time exhausted", Instant::now()).unwrap();
        assert_eq!(conclusion.step_reached, 2);
        assert_eq!(conclusion.reason, "time exhausted");
        assert_eq!(m.len(), 1);
        assert_eq!(m.current_index(), 0);
        assert_eq!(m.current_kind(), Some(StepKind::Failure));
        assert!(m.is_failed());
        assert_eq!(m.failure_reason(), Some("time exhausted"));

        // second call is a no-op
        assert!(m.set_failed("again", Instant::now()).is_none());
        assert_eq!(m.failure_reason(), Some("time exhausted"));
        assert!(m.dispatch(&ok(), Instant::now()).is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_failed_after_success_is_noop() {
        let mut m = manager(&[1]);
        m.start(Instant::now());
        m.dispatch(&ok(), Instant::now());
        assert!(m.set_failed("late", Instant::now()).is_none());
        assert!(!m.is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_informational_is_concluded_from_the_start() {
        let mut m = StepManager::informational(
            Box::new(crate::step::AlreadyWon::new()),
            Instant::now(),
        );
        assert!(m.is_concluded());
        assert!(m.dispatch(&ok(), Instant::now()).is_quiet());
        assert!(m.set_failed("x", Instant::now()).is_none());
        assert_eq!(m.current_kind(), Some(StepKind::AlreadyWon));
    }

    mod monotonic {
        use super::*;
        use proptest::prelude::*;

        fn event_strategy() -> impl Strategy<Value = Option<StepEvent>> {
            prop_oneof![
                6 => Just(Some(StepEvent::Input("ok".to_string()))),
                3 => Just(Some(StepEvent::Input("nope".to_string()))),
                1 => Just(Some(StepEvent::Input("boom".to_string()))),
                1 => Just(None),
            ]
        }

        proptest! {
            #[test]
            fn index_never_decreases_except_on_failure(
                needs in proptest::collection::vec(1usize..4, 1..6),
                trace in proptest::collection::vec(event_strategy(), 0..60),
            ) {
                let now = Instant::now();
                let mut m = manager(&needs);
                m.start(now);
                let mut last = m.current_index();
                for event in trace {
                    let failed_before = m.is_failed();
                    match event {
                        Some(ev) => {
                            let p = m.dispatch(&ev, now);
                            if p.commands.iter().any(|c| matches!(c, Command::Fail(_))) {
                                m.set_failed("boom", now);
                            }
                        }
                        None => {
                            m.set_failed("time exhausted", now);
                        }
                    }
                    let index = m.current_index();
                    if m.is_failed() && !failed_before {
                        prop_assert_eq!(index, 0);
                        prop_assert_eq!(m.len(), 1);
                    } else {
                        prop_assert!(index >= last, "index went from {} to {}", last, index);
                        prop_assert!(index <= last + 1);
                    }
                    if !m.is_concluded() {
                        prop_assert!(index < m.len());
                    }
                    last = index;
                }
            }
        }
    }
}
