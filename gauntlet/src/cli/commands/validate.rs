//! `validate`: check a challenge file.

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::load_challenge;
use crate::error::{ConfigError, GauntletError};

/// Validates the file and prints the resolved settings.
///
/// # Errors
///
/// Returns the [`ConfigError`] describing every problem found.
pub fn run(args: &ValidateArgs) -> Result<(), GauntletError> {
    tracing::info!(file = %args.file.display(), "validating challenge file");
    let result = match load_challenge(&args.file) {
        Ok(result) => result,
        Err(e) => {
            if args.format == OutputFormat::Json {
                print_failure_json(&e);
            }
            return Err(e.into());
        }
    };
    let settings = &result.settings;

    match args.format {
        OutputFormat::Human => {
            for warning in &result.warnings {
                println!("{warning}");
            }
            println!("{}: ok", args.file.display());
            println!(
                "  duration {}, quiz {} with {} to pass, token ttl {}",
                humantime::format_duration(settings.duration),
                humantime::format_duration(settings.quiz_time_limit),
                settings.quiz_pass_threshold,
                humantime::format_duration(settings.token.ttl),
            );
        }
        OutputFormat::Json => {
            let doc = json!({
                "valid": true,
                "warnings": result.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "settings": {
                    "duration": humantime::format_duration(settings.duration).to_string(),
                    "exit_grace": humantime::format_duration(settings.exit_grace).to_string(),
                    "identify_timeout": humantime::format_duration(settings.identify_timeout).to_string(),
                    "background_timeout": humantime::format_duration(settings.background_timeout).to_string(),
                    "quiz_time_limit": humantime::format_duration(settings.quiz_time_limit).to_string(),
                    "quiz_pass_threshold": settings.quiz_pass_threshold,
                    "token_ttl": humantime::format_duration(settings.token.ttl).to_string(),
                    "token_issuer": settings.token.issuer,
                },
            });
            println!("{doc:#}");
        }
    }
    Ok(())
}

fn print_failure_json(error: &ConfigError) {
    let errors: Vec<String> = match error {
        ConfigError::ValidationError { errors, .. } => errors.iter().map(ToString::to_string).collect(),
        other => vec![other.to_string()],
    };
    println!("{:#}", json!({ "valid": false, "errors": errors }));
}
