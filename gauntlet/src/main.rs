//! `Gauntlet` - timed, multi-stage terminal challenge

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use gauntlet::cli::args::Cli;
use gauntlet::cli::commands;
use gauntlet::error::ExitCode;
use gauntlet::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose, cli.quiet, cli.color);

    let shutdown = CancellationToken::new();
    let abort = CancellationToken::new();
    spawn_signal_handler(shutdown.clone(), abort.clone());

    let result = commands::dispatch(cli, shutdown, abort).await;

    // stdin is read on a blocking thread that cannot be cancelled, so
    // leave through process::exit rather than runtime shutdown.
    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// First Ctrl-C / SIGTERM asks for a graceful shutdown; a second one
/// abandons background work and exits immediately.
fn spawn_signal_handler(shutdown: CancellationToken, abort: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("shutdown requested");
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        shutdown.cancel();

        let code = tokio::select! {
            _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
            _ = sigterm.recv() => ExitCode::TERMINATED,
        };
        abort.cancel();
        std::process::exit(code);
    });
}
