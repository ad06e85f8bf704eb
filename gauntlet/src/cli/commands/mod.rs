//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler and
//! assembles the process-wide [`Services`] for the run modes.

pub mod completions;
pub mod local;
pub mod serve;
pub mod token;
pub mod validate;
pub mod version;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::args::{Cli, Commands, RunArgs, TokenSubcommand};
use crate::config::{ChallengeSettings, load_challenge};
use crate::error::GauntletError;
use crate::notify::{NotifierOptions, TokenSigner, build_notifier};
use crate::observability::{EventEmitter, init_metrics};
use crate::presentation::Theme;
use crate::session::Services;
use crate::storage::open_store;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(
    cli: Cli,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> Result<(), GauntletError> {
    match cli.command {
        Commands::Local(args) => local::run(&args, cli.color, shutdown, abort).await,
        Commands::Serve(args) => serve::run(&args, shutdown, abort).await,
        Commands::Validate(args) => validate::run(&args),
        Commands::Token(cmd) => match cmd.subcommand {
            TokenSubcommand::Verify(args) => token::verify(&args),
        },
        Commands::Completions(args) => {
            completions::run(&args);
            Ok(())
        }
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

/// Loads the challenge file, if any.
///
/// # Errors
///
/// Returns a config error if the file is missing or invalid.
pub fn load_settings(run: &RunArgs) -> Result<ChallengeSettings, GauntletError> {
    let Some(path) = run.challenge.as_deref() else {
        return Ok(ChallengeSettings::default());
    };
    info!(challenge = %path.display(), "loading challenge file");
    Ok(load_challenge(path)?.settings)
}

/// Builds everything sessions share.
///
/// Startup is all-or-nothing: an unreadable challenge file, an unusable
/// store or a misconfigured notifier aborts before any session starts.
///
/// # Errors
///
/// Returns the first configuration, storage or notifier error.
pub async fn build_services(
    run: &RunArgs,
    theme: Theme,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> Result<Services, GauntletError> {
    let settings = load_settings(run)?;

    if let Some(port) = run.metrics_port {
        init_metrics(Some(port))?;
        info!(port, "Prometheus metrics endpoint started");
    }

    let events = match run.events_file.as_deref() {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    let store = open_store(run.database_url.as_deref()).await?;
    info!(backend = store.backend(), "attempt store ready");

    let notifier = build_notifier(
        &NotifierOptions {
            api_key: run.resend_api_key.clone(),
            emailer_host: run.emailer_host.clone(),
            from: run.notice_from.clone(),
            subject: settings.notice_subject.clone(),
        },
        settings.background_timeout,
    )?;

    let signer = match run.token_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(secret) => TokenSigner::new(secret.as_bytes().to_vec(), settings.token.clone())?,
        None => {
            warn!("no token secret configured; using a per-process secret, tokens cannot be verified after restart");
            TokenSigner::ephemeral(settings.token.clone())
        }
    };

    Ok(Services {
        store,
        notifier,
        signer: Arc::new(signer),
        settings: Arc::new(settings),
        events: Arc::new(events),
        theme,
        shutdown,
        abort,
    })
}
