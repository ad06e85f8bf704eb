//! Session loop and accept loop.
//!
//! [`run_session`] is the single owner of a [`Controller`]: every input
//! line, tick, wake-up and background report is applied from its `select!`
//! loop, one at a time. [`serve`] accepts TCP connections and runs one
//! session task per connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::background::{Coordinator, SessionMessage};
use crate::error::GauntletError;
use crate::observability::{Event, metrics};
use crate::presentation::Theme;
use crate::session::{Controller, Services};
use crate::transport::{DEFAULT_MAX_LINE, LineTerminal, reject_busy, tcp_terminal};

/// Session loop pulse.
const TICK: Duration = Duration::from_secs(1);

/// Extra time granted to in-flight background tasks past their own timeout.
const BACKGROUND_SLACK: Duration = Duration::from_secs(1);

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The controller asked to exit.
    Exited,
    /// Input closed or a write failed.
    Disconnected,
    /// Process shutdown was requested.
    Shutdown,
}

impl CloseReason {
    /// Label used in logs and events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exited => "exited",
            Self::Disconnected => "disconnected",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Runs one session to completion on `terminal`.
pub async fn run_session<W>(terminal: LineTerminal<W>, services: Services) -> CloseReason
where
    W: AsyncWrite + Unpin + Send,
{
    run_session_with(terminal, services, None).await
}

/// Like [`run_session`], with a fixed puzzle seed.
pub async fn run_session_with<W>(
    mut terminal: LineTerminal<W>,
    services: Services,
    seed: Option<u64>,
) -> CloseReason
where
    W: AsyncWrite + Unpin + Send,
{
    let session_id = Uuid::new_v4().to_string();
    let span = info_span!("session", session_id = %session_id, peer = %terminal.peer());
    async move {
        info!(transport = %terminal.kind(), "session started");
        metrics::record_session_opened();
        services.events.emit(Event::SessionStarted {
            timestamp: Utc::now(),
            session_id: session_id.clone(),
            peer: terminal.peer().to_string(),
        });

        let session_token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(
            Arc::clone(&services.store),
            Arc::clone(&services.notifier),
            Arc::clone(&services.signer),
            tx.clone(),
            session_token.clone(),
            services.abort.clone(),
            services.settings.background_timeout,
        );
        let mut controller = Controller::new(session_id.clone(), &services, coordinator, Instant::now());
        if let Some(seed) = seed {
            controller = controller.with_seed(seed);
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pending = Vec::new();

        // After a failed write, lines already sent keep being applied until
        // the input side reports end of stream.
        let frame = controller.render(&services.theme, Instant::now());
        let mut output_open = write_frame(&mut terminal, &services.theme, &frame).await.is_ok();

        let reason = loop {
            tokio::select! {
                () = services.shutdown.cancelled() => break CloseReason::Shutdown,
                line = terminal.next_line() => match line {
                    Some(line) => controller.handle_line(&line).await,
                    None => break CloseReason::Disconnected,
                },
                Some(message) = rx.recv() => match message {
                    SessionMessage::Report(report) => controller.apply_report(&report),
                    SessionMessage::Wake => controller.wake(Instant::now()),
                },
                _ = ticker.tick() => controller.tick(Instant::now()),
            }

            for after in controller.take_scheduled() {
                schedule_wake(after, tx.clone(), session_token.clone());
            }
            pending.extend(controller.take_pending());

            if controller.should_exit() {
                break if output_open {
                    CloseReason::Exited
                } else {
                    CloseReason::Disconnected
                };
            }
            if output_open {
                let frame = controller.render(&services.theme, Instant::now());
                output_open = write_frame(&mut terminal, &services.theme, &frame).await.is_ok();
            }
        };

        controller.abandon(Instant::now());
        pending.extend(controller.take_pending());
        session_token.cancel();

        if reason != CloseReason::Disconnected {
            let _ = terminal.write_line("\nGoodbye!").await;
        }
        if let Err(e) = terminal.close().await {
            debug!(error = %e, "terminal close failed");
        }

        if !pending.is_empty() {
            let bound = services.settings.background_timeout + BACKGROUND_SLACK;
            if tokio::time::timeout(bound, futures::future::join_all(pending))
                .await
                .is_err()
            {
                warn!(?bound, "background tasks still running at session close");
            }
        }

        info!(reason = %reason, "session closed");
        services.events.emit(Event::SessionClosed {
            timestamp: Utc::now(),
            session_id: session_id.clone(),
            reason: reason.to_string(),
        });
        metrics::record_session_closed();
        reason
    }
    .instrument(span)
    .await
}

/// Writes a rendered frame. `Err` means the output side is gone.
async fn write_frame<W>(terminal: &mut LineTerminal<W>, theme: &Theme, frame: &str) -> Result<(), ()>
where
    W: AsyncWrite + Unpin + Send,
{
    terminal
        .write_frame(theme, frame)
        .await
        .map_err(|e| debug!(error = %e, "frame write failed; output closed"))
}

/// Posts a wake-up into the session after `after`, unless the session
/// closes first.
fn schedule_wake(
    after: Duration,
    tx: mpsc::UnboundedSender<SessionMessage>,
    session: CancellationToken,
) {
    debug!(?after, "follow-up scheduled");
    tokio::spawn(async move {
        tokio::select! {
            () = session.cancelled() => {}
            () = tokio::time::sleep(after) => {
                let _ = tx.send(SessionMessage::Wake);
            }
        }
    });
}

/// Accepts connections until shutdown, running one session per connection
/// with at most `max_sessions` at once.
///
/// After shutdown, live sessions get `drain` to finish; past that the
/// abort token is cancelled and the remaining tasks are dropped.
///
/// # Errors
///
/// Returns [`GauntletError::Usage`] if `max_sessions` is zero.
pub async fn serve(
    listener: TcpListener,
    services: Services,
    max_sessions: usize,
    drain: Duration,
) -> Result<(), GauntletError> {
    if max_sessions == 0 {
        return Err(GauntletError::Usage("--max-sessions must be at least 1".into()));
    }
    let limit = Arc::new(Semaphore::new(max_sessions));
    let mut sessions = JoinSet::new();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, max_sessions, "listening");
    }

    loop {
        tokio::select! {
            () = services.shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                    tokio::spawn(reject_busy(stream, peer));
                    continue;
                };
                let terminal = tcp_terminal(stream, peer, DEFAULT_MAX_LINE);
                let services = services.clone();
                sessions.spawn(async move {
                    let _permit = permit;
                    run_session(terminal, services).await
                });
            }
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "session task failed");
                }
            }
        }
    }

    info!(active = sessions.len(), "draining sessions");
    let drained = tokio::time::timeout(drain, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(remaining = sessions.len(), "drain period elapsed; aborting");
        services.abort.cancel();
        sessions.shutdown().await;
    }
    Ok(())
}
