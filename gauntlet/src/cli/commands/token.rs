//! `token verify`: check a completion token.

use chrono::Utc;

use crate::cli::args::TokenVerifyArgs;
use crate::config::TokenSettings;
use crate::error::GauntletError;
use crate::notify::TokenSigner;

/// Verifies the token and prints its claims as JSON.
///
/// # Errors
///
/// Returns a token error if the signature, algorithm or validity window
/// does not check out.
pub fn verify(args: &TokenVerifyArgs) -> Result<(), GauntletError> {
    let signer = TokenSigner::new(args.token_secret.as_bytes().to_vec(), TokenSettings::default())?;
    let claims = signer.verify(&args.token, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}
