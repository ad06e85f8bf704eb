//! Local terminal on stdin/stdout.

use tokio::io::Stdout;

use super::{LineTerminal, TransportKind};

/// Builds a terminal on the process's stdin and stdout.
///
/// Diagnostics go to stderr, so stdout carries nothing but frames.
#[must_use]
pub fn stdio_terminal(max_line: usize) -> LineTerminal<Stdout> {
    LineTerminal::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        TransportKind::Stdio,
        "stdio",
        max_line,
    )
}
