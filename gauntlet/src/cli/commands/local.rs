//! `local`: one session on stdin/stdout.

use tokio_util::sync::CancellationToken;

use crate::cli::args::{ColorChoice, LocalArgs};
use crate::error::GauntletError;
use crate::presentation::Theme;
use crate::server::run_session;
use crate::transport::{DEFAULT_MAX_LINE, stdio_terminal};

use super::build_services;

/// Runs a single session on this terminal.
///
/// # Errors
///
/// Returns a startup error; once the session runs, it always ends `Ok`.
pub async fn run(
    args: &LocalArgs,
    color: ColorChoice,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> Result<(), GauntletError> {
    let theme = if color.enabled_for_stdout() {
        Theme::ansi()
    } else {
        Theme::plain()
    };
    let services = build_services(&args.run, theme, shutdown, abort).await?;
    let reason = run_session(stdio_terminal(DEFAULT_MAX_LINE), services).await;
    tracing::debug!(%reason, "local session finished");
    Ok(())
}
