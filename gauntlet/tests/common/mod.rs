//! Shared integration-test harness: in-process services with scriptable
//! stores and notifiers, winning inputs for every puzzle, and a helper for
//! running the `gauntlet` binary.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use gauntlet::background::{Coordinator, SessionMessage};
use gauntlet::config::{ChallengeSettings, TokenSettings};
use gauntlet::error::{NotifyError, StorageError};
use gauntlet::notify::{DeliveryReceipt, Notifier, TokenSigner};
use gauntlet::observability::EventEmitter;
use gauntlet::presentation::Theme;
use gauntlet::session::{Controller, Services};
use gauntlet::step::WordGuess;
use gauntlet::storage::{AttemptId, AttemptStore, MemoryStore, UserId};
use gauntlet_core::{AttemptDetail, Email};

/// Seed used by every scripted run.
pub const SEED: u64 = 42;

/// Passes every password rule.
pub const WINNING_PASSWORD: &str = "9998!XVtwentyRUSTEUGENIO";

/// Solves the grid.
pub const WINNING_PATH: &str = "DDRRDRDDRR";

/// Decodes the final message.
pub const DECODED: &str = "persistence beats talent when talent gives up";

/// 1-based position of the right answer for quiz question `index`.
pub fn quiz_answer(index: usize) -> String {
    ((4 - index % 4) % 4 + 1).to_string()
}

/// A wrong answer for quiz question `index`.
pub fn quiz_wrong(index: usize) -> String {
    (if quiz_answer(index) == "1" { "2" } else { "1" }).to_string()
}

/// Lines that win step 1 through step 6 for [`SEED`].
pub fn winning_lines(threshold: usize) -> Vec<String> {
    let mut lines = vec![WordGuess::seeded(SEED).answer().to_string()];
    lines.push(WINNING_PASSWORD.to_string());
    lines.extend((0..threshold).map(quiz_answer));
    lines.push("const results = await Promise.all(users.map(fetchUser));".to_string());
    lines.push(":submit".to_string());
    lines.push(WINNING_PATH.to_string());
    lines.push(DECODED.to_string());
    lines
}

/// Wraps a store and counts writes; can be slowed down or made to fail.
pub struct ScriptedStore {
    inner: MemoryStore,
    pub delay: Duration,
    pub read_delay: Duration,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub records: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            delay: Duration::ZERO,
            read_delay: Duration::ZERO,
            fail_reads: false,
            fail_writes: false,
            records: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn record_calls(&self) -> usize {
        self.records.load(Ordering::SeqCst)
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AttemptStore for ScriptedStore {
    async fn create_user(&self, email: &Email) -> Result<UserId, StorageError> {
        self.pause(self.delay).await;
        self.inner.create_user(email).await
    }

    async fn record_attempt(
        &self,
        email: &Email,
        failed: bool,
        detail: &AttemptDetail,
    ) -> Result<AttemptId, StorageError> {
        self.records.fetch_add(1, Ordering::SeqCst);
        self.pause(self.delay).await;
        if self.fail_writes {
            return Err(StorageError::Unavailable("write refused".into()));
        }
        self.inner.record_attempt(email, failed, detail).await
    }

    async fn has_failed_attempt_today(&self, email: &Email) -> Result<bool, StorageError> {
        self.pause(self.read_delay).await;
        if self.fail_reads {
            return Err(StorageError::Unavailable("read refused".into()));
        }
        self.inner.has_failed_attempt_today(email).await
    }

    async fn has_won(&self, email: &Email) -> Result<bool, StorageError> {
        self.pause(self.read_delay).await;
        if self.fail_reads {
            return Err(StorageError::Unavailable("read refused".into()));
        }
        self.inner.has_won(email).await
    }

    fn backend(&self) -> &'static str {
        "scripted"
    }
}

/// Counts notices; can be slowed down.
#[derive(Default)]
pub struct CountingNotifier {
    pub delay: Duration,
    pub sent: AtomicUsize,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send_completion_notice(
        &self,
        _to: &Email,
        _token: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReceipt {
            id: format!("msg-{}", self.count()),
            provider: "counting",
        })
    }

    fn provider(&self) -> &'static str {
        "counting"
    }
}

pub fn services(
    store: Arc<dyn AttemptStore>,
    notifier: Arc<dyn Notifier>,
    settings: ChallengeSettings,
) -> Services {
    Services {
        store,
        notifier,
        signer: Arc::new(TokenSigner::new(b"integration".to_vec(), TokenSettings::default()).unwrap()),
        settings: Arc::new(settings),
        events: Arc::new(EventEmitter::noop()),
        theme: Theme::plain(),
        shutdown: CancellationToken::new(),
        abort: CancellationToken::new(),
    }
}

/// A controller on `services` with a fixed seed, plus its report channel.
pub fn controller(services: &Services) -> (Controller, mpsc::UnboundedReceiver<SessionMessage>) {
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
    let controller = Controller::new("it", services, coordinator, Instant::now()).with_seed(SEED);
    (controller, rx)
}

/// Awaits every background task the controller has spawned so far.
pub async fn settle(controller: &mut Controller) {
    for handle in controller.take_pending() {
        handle.await.unwrap();
    }
}

/// Path to a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn command(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gauntlet"));
    cmd.args(args)
        .env_remove("DATABASE_URL")
        .env_remove("GAUNTLET_TOKEN_SECRET")
        .env_remove("GAUNTLET_CHALLENGE")
        .env_remove("RESEND_API_KEY")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Runs the `gauntlet` binary with `args` and no inherited configuration.
pub fn run_binary(args: &[&str]) -> Output {
    command(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run gauntlet")
}

/// Like [`run_binary`], feeding `input` on stdin.
pub fn run_binary_with_input(args: &[&str], input: &str) -> Output {
    let mut child = command(args)
        .stdin(Stdio::piped())
        .spawn()
        .expect("failed to spawn gauntlet");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for gauntlet")
}
