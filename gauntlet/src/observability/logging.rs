//! Logging initialization.
//!
//! Diagnostics always go to stderr: in local mode stdout is the player's
//! terminal. `GAUNTLET_LOG_LEVEL` overrides the directive computed from
//! the command-line flags.

use tracing_subscriber::EnvFilter;

use crate::cli::args::{ColorChoice, LogFormat};

/// Environment variable that overrides the computed filter directive.
pub const LOG_LEVEL_ENV: &str = "GAUNTLET_LOG_LEVEL";

/// Maps `-v` occurrences and `--quiet` to a tracing directive.
///
/// `--quiet` wins over any verbosity. Otherwise 0 is `warn`, 1 `info`,
/// 2 `debug`, and anything above saturates at `trace`.
#[must_use]
pub const fn directive_for(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(format: LogFormat, verbosity: u8, quiet: bool, color: ColorChoice) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(directive_for(verbosity, quiet)));
    let show_target = verbosity >= 2;

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(color.enabled_for_stderr())
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(true)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
