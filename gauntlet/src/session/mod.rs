//! Per-connection sessions
//!
//! A [`Controller`] owns everything about one candidate's run: the
//! identity, the global budget, the step engine and the conclusion latch.
//! It is driven by exactly one loop (see [`crate::server::run_session`]),
//! which feeds it input lines, one-second ticks and background reports.

pub mod controller;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ChallengeSettings;
use crate::notify::{Notifier, TokenSigner};
use crate::observability::EventEmitter;
use crate::presentation::Theme;
use crate::storage::AttemptStore;

pub use controller::{Controller, Identification};

/// Process-wide collaborators shared by every session.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn AttemptStore>,
    pub notifier: Arc<dyn Notifier>,
    pub signer: Arc<TokenSigner>,
    pub settings: Arc<ChallengeSettings>,
    pub events: Arc<EventEmitter>,
    pub theme: Theme,
    /// Graceful shutdown: stop accepting and wind sessions down.
    pub shutdown: CancellationToken,
    /// Hard stop: abandon in-flight background work.
    pub abort: CancellationToken,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("store", &self.store.backend())
            .field("notifier", &self.notifier.provider())
            .field("settings", &self.settings)
            .field("theme", &self.theme)
            .finish_non_exhaustive()
    }
}
