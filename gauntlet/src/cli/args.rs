//! CLI argument definitions
//!
//! All Clap derive structs for `gauntlet` command-line parsing. Process
//! settings are read once here, from flags or their environment
//! fallbacks, and never change afterwards.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// Root CLI
// ============================================================================

/// Timed, multi-stage terminal challenge.
#[derive(Parser, Debug)]
#[command(name = "gauntlet", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "GAUNTLET_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "GAUNTLET_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one session on this terminal.
    Local(LocalArgs),

    /// Accept challenge sessions over TCP.
    Serve(ServeArgs),

    /// Validate a challenge file without running anything.
    Validate(ValidateArgs),

    /// Completion token utilities.
    Token(TokenCommand),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Shared run settings
// ============================================================================

/// Settings shared by `local` and `serve`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Attempt store: `sqlite://PATH`, `sqlite::memory:` or `memory:`.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Challenge tuning file (YAML).
    #[arg(short, long, env = "GAUNTLET_CHALLENGE")]
    pub challenge: Option<PathBuf>,

    /// Resend API key; completion notices are only logged without it.
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Service that renders the completion email body.
    #[arg(long, env = "EMAILER_HOST")]
    pub emailer_host: Option<String>,

    /// Sender address for completion notices.
    #[arg(
        long,
        env = "GAUNTLET_NOTICE_FROM",
        default_value = "Gauntlet <noreply@gauntlet.local>"
    )]
    pub notice_from: String,

    /// Secret used to sign completion tokens.
    #[arg(long, env = "GAUNTLET_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Append session events as JSON lines to this file.
    #[arg(long, env = "GAUNTLET_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "GAUNTLET_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `local`.
#[derive(Args, Debug)]
pub struct LocalArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Address to listen on.
    #[arg(short, long, env = "GAUNTLET_LISTEN", default_value = "127.0.0.1:2222")]
    pub listen: String,

    /// Maximum concurrent sessions; extra connections are turned away.
    #[arg(long, env = "GAUNTLET_MAX_SESSIONS", default_value_t = 64)]
    pub max_sessions: usize,

    /// How long live sessions get to finish after shutdown is requested.
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub drain: std::time::Duration,

    /// Send plain frames without ANSI escapes.
    #[arg(long)]
    pub plain: bool,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Challenge file to validate.
    pub file: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Token Command
// ============================================================================

/// Completion token commands.
#[derive(Args, Debug)]
pub struct TokenCommand {
    /// Token subcommand.
    #[command(subcommand)]
    pub subcommand: TokenSubcommand,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
pub enum TokenSubcommand {
    /// Verify a completion token and print its claims.
    Verify(TokenVerifyArgs),
}

/// Arguments for `token verify`.
#[derive(Args, Debug)]
pub struct TokenVerifyArgs {
    /// The token to check.
    pub token: String,

    /// Secret the token was signed with.
    #[arg(long, env = "GAUNTLET_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: String,
}

// ============================================================================
// Completions / Version
// ============================================================================

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

impl ColorChoice {
    fn enabled_for(self, is_terminal: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => is_terminal && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    /// Whether log output on stderr should be colored.
    #[must_use]
    pub fn enabled_for_stderr(self) -> bool {
        self.enabled_for(std::io::stderr().is_terminal())
    }

    /// Whether the local terminal should use ANSI frames.
    #[must_use]
    pub fn enabled_for_stdout(self) -> bool {
        self.enabled_for(std::io::stdout().is_terminal())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["gauntlet", "serve"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.max_sessions, 64);
        assert_eq!(args.drain, Duration::from_secs(30));
        assert!(!args.plain);
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "gauntlet",
            "-vv",
            "serve",
            "--listen",
            "0.0.0.0:2323",
            "--max-sessions",
            "4",
            "--database-url",
            "sqlite://attempts.db",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen, "0.0.0.0:2323");
        assert_eq!(args.max_sessions, 4);
        assert_eq!(args.run.database_url.as_deref(), Some("sqlite://attempts.db"));
    }

    #[test]
    fn test_validate_requires_file() {
        assert!(Cli::try_parse_from(["gauntlet", "validate"]).is_err());
        assert!(Cli::try_parse_from(["gauntlet", "validate", "c.yaml"]).is_ok());
    }

    #[test]
    fn test_token_verify_parses() {
        let cli = Cli::try_parse_from([
            "gauntlet",
            "token",
            "verify",
            "a.b.c",
            "--token-secret",
            "s",
        ])
        .unwrap();
        let Commands::Token(cmd) = cli.command else {
            panic!("expected token");
        };
        let TokenSubcommand::Verify(args) = cmd.subcommand;
        assert_eq!(args.token, "a.b.c");
    }

    #[test]
    fn test_help_output() {
        let err = Cli::try_parse_from(["gauntlet", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_color_choice_overrides() {
        assert!(ColorChoice::Always.enabled_for(false));
        assert!(!ColorChoice::Never.enabled_for(true));
    }
}
