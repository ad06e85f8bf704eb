//! Completion token signing.
//!
//! Tokens are compact HS256 JWTs. Signature and algorithm checks are left
//! to `jsonwebtoken`; the validity window is checked against an explicit
//! clock so callers control `now`.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenSettings;
use crate::error::TokenError;
use gauntlet_core::Email;

const ALGORITHM: Algorithm = Algorithm::HS256;
const SUBJECT: &str = "CandidateCompletion";

/// Claims carried by a completion token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub go_to_this_link: String,
    pub instructions: String,
    pub follow_me: String,
    /// One-time key the candidate quotes back.
    pub key: String,
    pub iss: String,
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

/// Issues and verifies completion tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    settings: TokenSettings,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.settings.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Creates a signer from a secret.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidKey`] if the secret is empty.
    pub fn new(secret: impl Into<Vec<u8>>, settings: TokenSettings) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::InvalidKey);
        }
        Ok(Self::from_secret(&secret, settings))
    }

    /// Creates a signer with a random 32-byte secret.
    #[must_use]
    pub fn ephemeral(settings: TokenSettings) -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self::from_secret(&secret, settings)
    }

    fn from_secret(secret: &[u8], settings: TokenSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            settings,
        }
    }

    /// Builds the claims for `email` issued at `now`.
    #[must_use]
    pub fn claims_for(&self, email: &Email, now: DateTime<Utc>) -> Claims {
        let iat = now.timestamp();
        let ttl = i64::try_from(self.settings.ttl.as_secs()).unwrap_or(i64::MAX);
        Claims {
            go_to_this_link: self.settings.link.clone(),
            instructions: self.settings.instructions.clone(),
            follow_me: self.settings.follow.clone(),
            key: Uuid::new_v4().to_string(),
            iss: self.settings.issuer.clone(),
            sub: SUBJECT.to_string(),
            email: email.to_string(),
            iat,
            nbf: iat,
            exp: iat.saturating_add(ttl),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Signs a fresh token for `email`.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the claims cannot be encoded.
    pub fn issue(&self, email: &Email, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.sign(&self.claims_for(email, now))
    }

    /// Signs arbitrary claims.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the claims cannot be encoded.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding).map_err(map_error)
    }

    /// Verifies `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] describing the first check that failed.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let token = token.trim();
        let header = jsonwebtoken::decode_header(token).map_err(map_error)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(map_error)?
            .claims;

        let now = now.timestamp();
        if now < claims.nbf {
            return Err(TokenError::NotYetValid(claims.nbf));
        }
        if now >= claims.exp {
            return Err(TokenError::Expired(claims.exp));
        }
        Ok(claims)
    }
}

fn map_error(error: jsonwebtoken::errors::Error) -> TokenError {
    match error.kind() {
        ErrorKind::InvalidToken => TokenError::Malformed("expected three dot-separated segments"),
        ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            TokenError::Malformed("segment is not base64url")
        }
        ErrorKind::Json(_) => TokenError::Malformed("header or claims are not valid JSON"),
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm(String::from("mismatch")),
        ErrorKind::InvalidKeyFormat => TokenError::InvalidKey,
        _ => TokenError::Jwt(error),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret".to_vec(), TokenSettings::default()).unwrap()
    }

    fn email() -> Email {
        Email::parse("winner@example.com").unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.issue(&email(), now).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = signer.verify(&token, now).unwrap();
        assert_eq!(claims.email, "winner@example.com");
        assert_eq!(claims.iss, "Gauntlet");
        assert_eq!(claims.sub, "CandidateCompletion");
        assert_eq!(claims.exp - claims.iat, 86_400);
        assert_ne!(claims.key, claims.jti);
    }

    #[test]
    fn test_claims_serialize_camel_case() {
        let claims = signer().claims_for(&email(), Utc::now());
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("goToThisLink").is_some());
        assert!(json.get("followMe").is_some());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = signer().issue(&email(), Utc::now()).unwrap();
        let other = TokenSigner::new(b"other".to_vec(), TokenSettings::default()).unwrap();
        assert!(matches!(
            other.verify(&token, Utc::now()),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = signer();
        let token = signer.issue(&email(), Utc::now()).unwrap();
        let mut claims = signer.claims_for(&Email::parse("thief@example.com").unwrap(), Utc::now());
        claims.exp += 1;
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(matches!(
            signer.verify(&forged, Utc::now()),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_expired_token() {
        let settings = TokenSettings {
            ttl: Duration::from_secs(60),
            ..TokenSettings::default()
        };
        let signer = TokenSigner::new(b"k".to_vec(), settings).unwrap();
        let issued = Utc::now();
        let token = signer.issue(&email(), issued).unwrap();
        let later = issued + chrono::Duration::seconds(61);
        assert!(matches!(
            signer.verify(&token, later),
            Err(TokenError::Expired(_))
        ));
    }

    #[test]
    fn test_not_yet_valid() {
        let signer = signer();
        let issued = Utc::now();
        let token = signer.issue(&email(), issued).unwrap();
        let earlier = issued - chrono::Duration::seconds(30);
        assert!(matches!(
            signer.verify(&token, earlier),
            Err(TokenError::NotYetValid(_))
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        let signer = signer();
        assert!(matches!(
            signer.verify("abc", Utc::now()),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            signer.verify("a.b.c.d", Utc::now()),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let claims = signer().claims_for(&email(), Utc::now());
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            signer().verify(&token, Utc::now()),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            TokenSigner::new(Vec::new(), TokenSettings::default()),
            Err(TokenError::InvalidKey)
        ));
    }

    #[test]
    fn test_ephemeral_signers_differ() {
        let a = TokenSigner::ephemeral(TokenSettings::default());
        let b = TokenSigner::ephemeral(TokenSettings::default());
        let token = a.issue(&email(), Utc::now()).unwrap();
        assert!(a.verify(&token, Utc::now()).is_ok());
        assert!(b.verify(&token, Utc::now()).is_err());
    }
}
