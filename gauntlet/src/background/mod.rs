//! Background side effects
//!
//! When a run concludes, the [`Coordinator`] spawns the persistence task
//! and, for a win, the notification task. Each runs on its own tokio task
//! under a timeout and reports back to the owning session loop through the
//! session message channel. Once the session is torn down the tasks keep
//! running to completion, but their reports are dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gauntlet_core::Email;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::engine::Conclusion;
use crate::error::BackgroundError;
use crate::notify::{Notifier, TokenSigner};
use crate::observability::metrics;
use crate::storage::AttemptStore;

/// Which side effect a report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundTask {
    /// Writing the attempt record.
    Persist,
    /// Sending the completion notice.
    Notify,
}

impl BackgroundTask {
    /// Label used in logs, metrics and events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Persist => "persist",
            Self::Notify => "notify",
        }
    }
}

/// Outcome of one background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundReport {
    pub task: BackgroundTask,
    /// Short description on success.
    pub outcome: Result<String, BackgroundError>,
    pub duration: Duration,
}

/// Messages delivered into a session loop from outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// A background task finished.
    Report(BackgroundReport),
    /// A scheduled follow-up fired.
    Wake,
}

/// Spawns the side effects of a concluded run.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn AttemptStore>,
    notifier: Arc<dyn Notifier>,
    signer: Arc<TokenSigner>,
    reports: mpsc::UnboundedSender<SessionMessage>,
    session: CancellationToken,
    abort: CancellationToken,
    timeout: Duration,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("store", &self.store.backend())
            .field("notifier", &self.notifier.provider())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator for one session.
    ///
    /// `session` is cancelled at teardown and suppresses reports. `abort`
    /// is the process-wide hard stop and cancels the work itself.
    #[must_use]
    pub fn new(
        store: Arc<dyn AttemptStore>,
        notifier: Arc<dyn Notifier>,
        signer: Arc<TokenSigner>,
        reports: mpsc::UnboundedSender<SessionMessage>,
        session: CancellationToken,
        abort: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            signer,
            reports,
            session,
            abort,
            timeout,
        }
    }

    /// Spawns the side effects for `conclusion`. Never blocks.
    ///
    /// The caller is responsible for calling this at most once per run.
    pub fn record_conclusion(&self, email: &Email, conclusion: &Conclusion) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        let store = Arc::clone(&self.store);
        let failed = !conclusion.is_success();
        let detail = conclusion.detail();
        let who = email.clone();
        handles.push(self.spawn(BackgroundTask::Persist, email, async move {
            store.create_user(&who).await.map_err(|e| e.to_string())?;
            let id = store
                .record_attempt(&who, failed, &detail)
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(format!("attempt {id} recorded"))
        }));

        if conclusion.is_success() {
            let notifier = Arc::clone(&self.notifier);
            let signer = Arc::clone(&self.signer);
            let who = email.clone();
            handles.push(self.spawn(BackgroundTask::Notify, email, async move {
                let token = signer.issue(&who, Utc::now()).map_err(|e| e.to_string())?;
                let receipt = notifier
                    .send_completion_notice(&who, &token)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok::<_, String>(format!("{} delivery {}", receipt.provider, receipt.id))
            }));
        }

        handles
    }

    fn spawn<F>(&self, task: BackgroundTask, email: &Email, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<String, String>> + Send + 'static,
    {
        let reports = self.reports.clone();
        let session = self.session.clone();
        let abort = self.abort.clone();
        let timeout = self.timeout;
        let span = info_span!("background", task = task.label(), email = %email);

        tokio::spawn(
            async move {
                let started = Instant::now();
                let outcome = tokio::select! {
                    () = abort.cancelled() => Err(BackgroundError::Cancelled),
                    result = tokio::time::timeout(timeout, work) => match result {
                        Ok(Ok(detail)) => Ok(detail),
                        Ok(Err(message)) => Err(BackgroundError::Failed(message)),
                        Err(_) => Err(BackgroundError::TimedOut(timeout)),
                    },
                };
                let duration = started.elapsed();
                metrics::record_background_task(task.label(), outcome.is_ok(), duration);

                match &outcome {
                    Ok(detail) => debug!(detail = %detail, ?duration, "background task finished"),
                    Err(e) => warn!(error = %e, ?duration, "background task failed"),
                }

                if session.is_cancelled() {
                    debug!("session closed; report dropped");
                    return;
                }
                let _ = reports.send(SessionMessage::Report(BackgroundReport {
                    task,
                    outcome,
                    duration,
                }));
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use gauntlet_core::AttemptDetail;

    use super::*;
    use crate::config::TokenSettings;
    use crate::error::{NotifyError, StorageError};
    use crate::notify::{DeliveryReceipt, LogNotifier};
    use crate::storage::{AttemptId, MemoryStore, UserId};

    struct StuckStore;

    #[async_trait]
    impl AttemptStore for StuckStore {
        async fn create_user(&self, _: &Email) -> Result<UserId, StorageError> {
            std::future::pending().await
        }
        async fn record_attempt(
            &self,
            _: &Email,
            _: bool,
            _: &AttemptDetail,
        ) -> Result<AttemptId, StorageError> {
            std::future::pending().await
        }
        async fn has_failed_attempt_today(&self, _: &Email) -> Result<bool, StorageError> {
            Ok(false)
        }
        async fn has_won(&self, _: &Email) -> Result<bool, StorageError> {
            Ok(false)
        }
        fn backend(&self) -> &'static str {
            "stuck"
        }
    }

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_completion_notice(
            &self,
            _: &Email,
            token: &str,
        ) -> Result<DeliveryReceipt, NotifyError> {
            assert_eq!(token.split('.').count(), 3);
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryReceipt {
                id: "m1".into(),
                provider: "counting",
            })
        }
        fn provider(&self) -> &'static str {
            "counting"
        }
    }

    fn coordinator(
        store: Arc<dyn AttemptStore>,
        notifier: Arc<dyn Notifier>,
    ) -> (Coordinator, mpsc::UnboundedReceiver<SessionMessage>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = CancellationToken::new();
        let coordinator = Coordinator::new(
            store,
            notifier,
            Arc::new(TokenSigner::ephemeral(TokenSettings::default())),
            tx,
            session.clone(),
            CancellationToken::new(),
            Duration::from_secs(5),
        );
        (coordinator, rx, session)
    }

    fn email() -> Email {
        Email::parse("a@b.com").unwrap()
    }

    #[tokio::test]
    async fn test_failure_persists_without_notice() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (coord, mut rx, _session) = coordinator(store.clone(), notifier.clone());

        let conclusion = Conclusion::failure(2, Duration::from_secs(40), "nope");
        let handles = coord.record_conclusion(&email(), &conclusion);
        assert_eq!(handles.len(), 1);
        for h in handles {
            h.await.unwrap();
        }

        let Some(SessionMessage::Report(report)) = rx.recv().await else {
            panic!("expected a report");
        };
        assert_eq!(report.task, BackgroundTask::Persist);
        assert!(report.outcome.is_ok());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);

        let attempts = store.attempts(&email());
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].failed);
        assert_eq!(attempts[0].detail.step, 2);
        assert_eq!(attempts[0].detail.message, "nope");
    }

    #[tokio::test]
    async fn test_success_persists_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (coord, _rx, _session) = coordinator(store.clone(), notifier.clone());

        let handles = coord.record_conclusion(&email(), &Conclusion::success(7, Duration::from_secs(600)));
        assert_eq!(handles.len(), 2);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert!(!store.attempts(&email())[0].failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_store_times_out() {
        let (coord, mut rx, _session) = coordinator(Arc::new(StuckStore), Arc::new(LogNotifier));
        let handles = coord.record_conclusion(&email(), &Conclusion::failure(1, Duration::ZERO, "x"));
        for h in handles {
            h.await.unwrap();
        }
        let Some(SessionMessage::Report(report)) = rx.recv().await else {
            panic!("expected a report");
        };
        assert_eq!(
            report.outcome,
            Err(BackgroundError::TimedOut(Duration::from_secs(5)))
        );
    }

    #[tokio::test]
    async fn test_reports_dropped_after_teardown() {
        let store = Arc::new(MemoryStore::new());
        let (coord, mut rx, session) = coordinator(store.clone(), Arc::new(LogNotifier));
        session.cancel();
        for h in coord.record_conclusion(&email(), &Conclusion::failure(1, Duration::ZERO, "x")) {
            h.await.unwrap();
        }
        drop(coord);
        assert!(rx.recv().await.is_none());
        assert_eq!(store.attempt_count(), 1);
    }
}
