//! `serve`: accept sessions over TCP.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::args::ServeArgs;
use crate::error::GauntletError;
use crate::presentation::Theme;
use crate::server;
use crate::transport::bind_listener;

use super::build_services;

/// Starts the listener and serves until shutdown.
///
/// # Errors
///
/// Returns a usage error for `--max-sessions 0`, a startup error from
/// [`build_services`], or a transport error if the address cannot be bound.
pub async fn run(
    args: &ServeArgs,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> Result<(), GauntletError> {
    if args.max_sessions == 0 {
        return Err(GauntletError::Usage("--max-sessions must be at least 1".into()));
    }
    let theme = if args.plain { Theme::plain() } else { Theme::ansi() };
    let services = build_services(&args.run, theme, shutdown, abort).await?;
    let listener = bind_listener(&args.listen).await?;

    server::serve(listener, services, args.max_sessions, args.drain).await?;
    info!("server stopped");
    Ok(())
}
