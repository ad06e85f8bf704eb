//! The session controller.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gauntlet_core::{Eligibility, Email};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::background::{BackgroundReport, Coordinator};
use crate::config::ChallengeSettings;
use crate::engine::{Conclusion, Progress, StepManager};
use crate::observability::{Event, EventEmitter, metrics};
use crate::presentation::{Theme, clock};
use crate::step::{
    AlreadyFailedToday, AlreadyWon, Command, Failure, RenderContext, Step, StepEvent,
    standard_sequence,
};
use crate::storage::AttemptStore;

use super::Services;

/// Typed by the candidate to leave.
pub const QUIT_COMMAND: &str = ":quit";

/// Recorded when a run is left before it concludes.
pub const ABANDONED_REASON: &str = "Session abandoned.";

/// Shown when the eligibility check cannot be completed.
pub const UNAVAILABLE_REASON: &str =
    "We couldn't verify your eligibility right now. Please try again later.";

/// Result of [`Controller::identify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    /// The run started at step 0.
    Eligible,
    /// Routed to the already-won screen.
    AlreadyWon,
    /// Routed to the come-back-tomorrow screen.
    AlreadyFailedToday,
    /// The address was rejected; the prompt stays up.
    Invalid(String),
    /// Storage failed or timed out; routed to a generic failure screen.
    Unavailable,
}

impl Identification {
    const fn label(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::AlreadyWon => "already_won",
            Self::AlreadyFailedToday => "already_failed_today",
            Self::Invalid(_) => "invalid",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Owns one candidate's run from connection to exit.
pub struct Controller {
    session_id: String,
    settings: Arc<ChallengeSettings>,
    store: Arc<dyn AttemptStore>,
    coordinator: Coordinator,
    events: Arc<EventEmitter>,
    started_at: Instant,
    seed: Option<u64>,
    email: Option<Email>,
    engine: Option<StepManager>,
    notice: Option<String>,
    handed_off: bool,
    exit_at: Option<Instant>,
    exit_requested: bool,
    scheduled: Vec<Duration>,
    pending: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("session_id", &self.session_id)
            .field("email", &self.email)
            .field("engine", &self.engine)
            .field("handed_off", &self.handed_off)
            .field("exit_requested", &self.exit_requested)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a controller whose budget starts at `now`.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        services: &Services,
        coordinator: Coordinator,
        now: Instant,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            settings: Arc::clone(&services.settings),
            store: Arc::clone(&services.store),
            coordinator,
            events: Arc::clone(&services.events),
            started_at: now,
            seed: None,
            email: None,
            engine: None,
            notice: None,
            handed_off: false,
            exit_at: None,
            exit_requested: false,
            scheduled: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Fixes the seed used to build the puzzle sequence.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Handles one submitted line.
    pub async fn handle_line(&mut self, line: &str) {
        let now = Instant::now();
        if self.exit_at.is_some() {
            debug!(session_id = %self.session_id, "input after conclusion; exiting");
            self.exit_requested = true;
            return;
        }

        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case(QUIT_COMMAND) {
            info!(session_id = %self.session_id, "candidate quit");
            self.abandon(now);
            self.exit_requested = true;
            return;
        }

        if self.engine.is_none() {
            if trimmed.is_empty() {
                self.notice = Some("Please enter your email address.".to_string());
            } else {
                self.identify(trimmed).await;
            }
            return;
        }

        self.dispatch_event(&StepEvent::Input(line.to_string()), now);
    }

    /// Validates `candidate` and routes the session by eligibility.
    ///
    /// The run is only built once the address is known to be eligible.
    pub async fn identify(&mut self, candidate: &str) -> Identification {
        if self.engine.is_some() {
            debug!(session_id = %self.session_id, "already identified");
            return Identification::Invalid("already identified".to_string());
        }

        let email = match Email::parse(candidate) {
            Ok(email) => email,
            Err(e) => {
                self.notice = Some(format!("{e}. Please try again."));
                return Identification::Invalid(e.to_string());
            }
        };
        self.notice = None;

        let check = tokio::time::timeout(
            self.settings.identify_timeout,
            self.store.check_eligibility(&email),
        )
        .await;
        let now = Instant::now();

        let outcome = match check {
            Ok(Ok(eligibility)) => self.route(&email, eligibility, now),
            Ok(Err(e)) => {
                warn!(session_id = %self.session_id, email = %email, error = %e, "eligibility check failed");
                self.route_unavailable(now)
            }
            Err(_) => {
                warn!(
                    session_id = %self.session_id,
                    email = %email,
                    timeout = ?self.settings.identify_timeout,
                    "eligibility check timed out"
                );
                self.route_unavailable(now)
            }
        };

        info!(session_id = %self.session_id, email = %email, result = outcome.label(), "identified");
        metrics::record_eligibility(outcome.label());
        self.events.emit(Event::Identified {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            email: email.to_string(),
            eligibility: outcome.label().to_string(),
        });
        self.email = Some(email);
        outcome
    }

    fn route(&mut self, email: &Email, eligibility: Eligibility, now: Instant) -> Identification {
        match eligibility {
            Eligibility::AlreadyWon => {
                self.show_informational(Box::new(AlreadyWon::new()), now);
                Identification::AlreadyWon
            }
            Eligibility::AlreadyFailedToday { .. } => {
                let retry_in = eligibility
                    .retry_at()
                    .and_then(|at| (at - Utc::now()).to_std().ok())
                    .unwrap_or_else(ChallengeSettings::retry_window);
                self.show_informational(Box::new(AlreadyFailedToday::new(Some(retry_in))), now);
                Identification::AlreadyFailedToday
            }
            Eligibility::Eligible => {
                let seed = self.seed.unwrap_or_else(rand::random);
                let steps = standard_sequence(&self.settings, seed);
                match StepManager::new(steps, self.started_at, ChallengeSettings::retry_window()) {
                    Ok(mut engine) => {
                        debug!(session_id = %self.session_id, email = %email, len = engine.len(), "starting run");
                        let progress = engine.start(now);
                        self.engine = Some(engine);
                        self.apply(progress, now);
                        Identification::Eligible
                    }
                    Err(e) => {
                        warn!(session_id = %self.session_id, error = %e, "could not build step sequence");
                        self.route_unavailable(now)
                    }
                }
            }
        }
    }

    fn route_unavailable(&mut self, now: Instant) -> Identification {
        let elapsed = now.saturating_duration_since(self.started_at);
        self.show_informational(Box::new(Failure::new(0, elapsed, UNAVAILABLE_REASON, None)), now);
        Identification::Unavailable
    }

    fn show_informational(&mut self, step: Box<dyn Step>, now: Instant) {
        self.engine = Some(StepManager::informational(step, now));
        self.exit_at = Some(now + self.settings.exit_grace);
    }

    /// Forwards `event` to the active step. Swallowed once concluded.
    pub fn dispatch_event(&mut self, event: &StepEvent, now: Instant) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if engine.is_concluded() {
            debug!(session_id = %self.session_id, "event after conclusion swallowed");
            return;
        }
        let progress = engine.dispatch(event, now);
        self.apply(progress, now);
    }

    /// The one-second pulse.
    ///
    /// Enforces the global budget, forwards the tick to the active step and
    /// closes the session once the exit grace has passed.
    pub fn tick(&mut self, now: Instant) {
        if self.exit_at.is_some_and(|at| now >= at) {
            self.exit_requested = true;
            return;
        }

        if self.remaining(now).is_zero() {
            match self.engine.as_ref().map(StepManager::is_concluded) {
                None => {
                    info!(session_id = %self.session_id, "budget exhausted before identification");
                    self.exit_requested = true;
                }
                Some(false) => {
                    let reason = self.time_exhausted_reason();
                    self.fail(reason, now);
                }
                Some(true) => {}
            }
            return;
        }

        self.dispatch_event(&StepEvent::Tick(now), now);
    }

    /// A scheduled follow-up fired.
    pub fn wake(&mut self, now: Instant) {
        self.dispatch_event(&StepEvent::Tick(now), now);
    }

    /// Logs and records a background report. Never changes what the
    /// candidate sees.
    pub fn apply_report(&self, report: &BackgroundReport) {
        let (success, detail) = match &report.outcome {
            Ok(detail) => (true, detail.clone()),
            Err(e) => (false, e.to_string()),
        };
        debug!(
            session_id = %self.session_id,
            task = report.task.label(),
            success,
            detail = %detail,
            "background report"
        );
        self.events.emit(Event::BackgroundTaskFinished {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            task: report.task.label().to_string(),
            success,
            detail,
        });
    }

    /// Concludes an active run as abandoned. No-op otherwise.
    pub fn abandon(&mut self, now: Instant) {
        if self.engine.as_ref().is_some_and(|e| !e.is_concluded()) {
            self.fail(ABANDONED_REASON.to_string(), now);
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn apply(&mut self, progress: Progress, now: Instant) {
        for transition in &progress.transitions {
            self.events.emit(Event::StepAdvanced {
                timestamp: Utc::now(),
                session_id: self.session_id.clone(),
                from: transition.from,
                to: transition.to,
                title: transition.title.clone(),
            });
        }
        if let Some(conclusion) = progress.conclusion {
            self.conclude(&conclusion, now);
        }
        for command in progress.commands {
            match command {
                Command::Schedule(after) => self.scheduled.push(after),
                Command::Fail(reason) => self.fail(reason, now),
            }
        }
    }

    fn fail(&mut self, reason: String, now: Instant) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if let Some(conclusion) = engine.set_failed(reason, now) {
            self.conclude(&conclusion, now);
        }
    }

    /// Hands the conclusion to the coordinator. Latched: runs once.
    fn conclude(&mut self, conclusion: &Conclusion, now: Instant) {
        if self.handed_off {
            debug!(session_id = %self.session_id, "conclusion already handed off");
            return;
        }
        self.handed_off = true;
        self.exit_at = Some(now + self.settings.exit_grace);

        let outcome = conclusion.verdict.label();
        info!(
            session_id = %self.session_id,
            outcome,
            step = conclusion.step_reached,
            elapsed = ?conclusion.elapsed,
            "run concluded"
        );
        metrics::record_conclusion(outcome, conclusion.elapsed);
        self.events.emit(Event::SessionConcluded {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            outcome: outcome.to_string(),
            step: conclusion.step_reached,
            elapsed_ms: u64::try_from(conclusion.elapsed.as_millis()).unwrap_or(u64::MAX),
            reason: conclusion.reason.clone(),
        });

        if let Some(email) = &self.email {
            self.pending
                .extend(self.coordinator.record_conclusion(email, conclusion));
        }
    }

    fn time_exhausted_reason(&self) -> String {
        format!(
            "Time exhausted. You had {} to complete the challenge.",
            humantime::format_duration(self.settings.duration)
        )
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Budget left at `now`.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.settings
            .duration
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }

    /// Whether the session loop should end.
    #[must_use]
    pub const fn should_exit(&self) -> bool {
        self.exit_requested
    }

    /// Whether the conclusion has been handed off.
    #[must_use]
    pub const fn has_concluded(&self) -> bool {
        self.handed_off
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| !e.is_concluded())
    }

    /// The identified address.
    #[must_use]
    pub const fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    /// The step engine, once identified.
    #[must_use]
    pub const fn engine(&self) -> Option<&StepManager> {
        self.engine.as_ref()
    }

    /// When the session will close on its own.
    #[must_use]
    pub const fn exit_at(&self) -> Option<Instant> {
        self.exit_at
    }

    /// Per-connection identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Drains follow-ups requested since the last call.
    pub fn take_scheduled(&mut self) -> Vec<Duration> {
        std::mem::take(&mut self.scheduled)
    }

    /// Drains handles of background tasks spawned since the last call.
    pub fn take_pending(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.pending)
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Renders the current screen.
    #[must_use]
    pub fn render(&self, theme: &Theme, now: Instant) -> String {
        let remaining = (self.exit_at.is_none()).then(|| self.remaining(now));
        let mut frame = match self.engine.as_ref().and_then(StepManager::current) {
            Some(step) => {
                let body = step.render(&RenderContext { theme, now });
                theme.frame(step.title(), remaining, &body)
            }
            None => theme.frame("Welcome to the Gauntlet", remaining, &self.render_prompt(theme)),
        };

        if let Some(at) = self.exit_at {
            let _ = write!(
                frame,
                "\n{}\n",
                theme.dim(&format!(
                    "Press Enter to exit. Closing in {}.",
                    clock(at.saturating_duration_since(now))
                ))
            );
        }
        frame
    }

    fn render_prompt(&self, theme: &Theme) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Six puzzles stand between you and the finish. You have {} in total.",
            humantime::format_duration(self.settings.duration)
        );
        let _ = writeln!(out, "You get one attempt per day. Type {QUIT_COMMAND} to leave.\n");
        if let Some(notice) = &self.notice {
            let _ = writeln!(out, "{}", theme.warn(notice));
        }
        out.push_str("Enter your email to begin: ");
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use gauntlet_core::AttemptDetail;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::background::SessionMessage;
    use crate::config::TokenSettings;
    use crate::notify::{LogNotifier, TokenSigner};
    use crate::step::StepKind;
    use crate::storage::MemoryStore;

    fn services(store: Arc<MemoryStore>) -> Services {
        Services {
            store,
            notifier: Arc::new(LogNotifier),
            signer: Arc::new(TokenSigner::ephemeral(TokenSettings::default())),
            settings: Arc::new(ChallengeSettings::default()),
            events: Arc::new(EventEmitter::noop()),
            theme: Theme::plain(),
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    fn controller(services: &Services) -> (Controller, mpsc::UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(
            Arc::clone(&services.store),
            Arc::clone(&services.notifier),
            Arc::clone(&services.signer),
            tx,
            CancellationToken::new(),
            services.abort.clone(),
            services.settings.background_timeout,
        );
        (
            Controller::new("s-1", services, coordinator, Instant::now()).with_seed(0),
            rx,
        )
    }

    #[tokio::test]
    async fn test_invalid_email_reprompts() {
        let svc = services(Arc::new(MemoryStore::new()));
        let (mut ctl, _rx) = controller(&svc);
        let outcome = ctl.identify("not-an-email").await;
        assert!(matches!(outcome, Identification::Invalid(_)));
        assert!(ctl.engine().is_none());
        assert!(ctl.render(&Theme::plain(), Instant::now()).contains("Please try again"));
    }

    #[tokio::test]
    async fn test_eligible_starts_at_step_zero() {
        let svc = services(Arc::new(MemoryStore::new()));
        let (mut ctl, _rx) = controller(&svc);
        assert_eq!(ctl.identify("E@F.com").await, Identification::Eligible);
        let engine = ctl.engine().unwrap();
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.len(), 7);
        assert_eq!(ctl.email().unwrap().as_str(), "e@f.com");
        assert!(ctl.is_active());
    }

    #[tokio::test]
    async fn test_already_failed_routes_without_puzzles() {
        let store = Arc::new(MemoryStore::new());
        let email = Email::parse("a@b.com").unwrap();
        store.seed_attempt(
            &email,
            true,
            AttemptDetail::new(1, Duration::from_secs(1), "x"),
            Utc::now() - ChronoDuration::hours(2),
        );
        let svc = services(store);
        let (mut ctl, _rx) = controller(&svc);
        assert_eq!(ctl.identify("a@b.com").await, Identification::AlreadyFailedToday);
        let engine = ctl.engine().unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.current_kind(), Some(StepKind::AlreadyFailedToday));
        assert!(!ctl.has_concluded());
    }

    #[tokio::test]
    async fn test_quit_while_active_records_abandonment_once() {
        let store = Arc::new(MemoryStore::new());
        let svc = services(store.clone());
        let (mut ctl, _rx) = controller(&svc);
        ctl.identify("q@b.com").await;
        ctl.handle_line(":quit").await;
        assert!(ctl.should_exit());
        ctl.abandon(Instant::now());

        for handle in ctl.take_pending() {
            handle.await.unwrap();
        }
        let attempts = store.attempts(&Email::parse("q@b.com").unwrap());
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].detail.message, ABANDONED_REASON);
    }

    #[tokio::test]
    async fn test_quit_before_identification_records_nothing() {
        let store = Arc::new(MemoryStore::new());
        let svc = services(store.clone());
        let (mut ctl, _rx) = controller(&svc);
        ctl.handle_line(":quit").await;
        assert!(ctl.should_exit());
        assert!(ctl.take_pending().is_empty());
        assert_eq!(store.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_exhausted_truncates_sequence() {
        let svc = services(Arc::new(MemoryStore::new()));
        let (mut ctl, _rx) = controller(&svc);
        ctl.identify("t@b.com").await;

        tokio::time::advance(svc.settings.duration).await;
        ctl.tick(Instant::now());

        let engine = ctl.engine().unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.current_kind(), Some(StepKind::Failure));
        assert!(engine.failure_reason().unwrap().to_lowercase().contains("time exhausted"));
        assert!(ctl.has_concluded());
        assert_eq!(ctl.take_pending().len(), 1);

        ctl.tick(Instant::now());
        assert!(ctl.take_pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_before_identification_exits() {
        let svc = services(Arc::new(MemoryStore::new()));
        let (mut ctl, _rx) = controller(&svc);
        tokio::time::advance(svc.settings.duration).await;
        ctl.tick(Instant::now());
        assert!(ctl.should_exit());
        assert!(!ctl.has_concluded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_after_grace_or_keypress() {
        let svc = services(Arc::new(MemoryStore::new()));
        let (mut ctl, _rx) = controller(&svc);
        ctl.identify("h@b.com").await;
        ctl.abandon(Instant::now());
        assert!(!ctl.should_exit());
        tokio::time::advance(svc.settings.exit_grace).await;
        ctl.tick(Instant::now());
        assert!(ctl.should_exit());

        let (mut ctl, _rx) = controller(&svc);
        ctl.identify("i@b.com").await;
        ctl.abandon(Instant::now());
        ctl.handle_line("anything").await;
        assert!(ctl.should_exit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_shows_budget_and_exit_countdown() {
        let svc = services(Arc::new(MemoryStore::new()));
        let (mut ctl, _rx) = controller(&svc);
        let frame = ctl.render(&Theme::plain(), Instant::now());
        assert!(frame.contains("[25:00 left]"));
        assert!(frame.contains("Enter your email"));

        ctl.identify("r@b.com").await;
        ctl.abandon(Instant::now());
        let frame = ctl.render(&Theme::plain(), Instant::now());
        assert!(frame.contains(ABANDONED_REASON));
        assert!(frame.contains("Closing in 00:10"));
    }
}
