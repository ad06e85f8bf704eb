//! Completion notices
//!
//! A won session hands a signed completion token to a [`Notifier`]. Delivery
//! is fire-and-forget from the session's point of view: the result is only
//! logged.

pub mod resend;
pub mod token;

use std::sync::Arc;

use async_trait::async_trait;
use gauntlet_core::Email;
use tracing::{info, warn};

use crate::error::NotifyError;

pub use resend::ResendNotifier;
pub use token::{Claims, TokenSigner};

/// Proof of a delivery hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider-assigned message id.
    pub id: String,
    /// Name of the notifier that produced it.
    pub provider: &'static str,
}

/// Sends completion notices to candidates.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Delivers `token` to `to`.
    async fn send_completion_notice(
        &self,
        to: &Email,
        token: &str,
    ) -> Result<DeliveryReceipt, NotifyError>;

    /// Short provider name for logs.
    fn provider(&self) -> &'static str;
}

/// Notifier that only logs; used when no mail provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_completion_notice(
        &self,
        to: &Email,
        token: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        info!(email = %to, token_len = token.len(), "completion notice (log only)");
        Ok(DeliveryReceipt {
            id: format!("log-{}", uuid::Uuid::new_v4()),
            provider: self.provider(),
        })
    }

    fn provider(&self) -> &'static str {
        "log"
    }
}

/// Mail provider settings gathered from the command line.
#[derive(Debug, Clone, Default)]
pub struct NotifierOptions {
    pub api_key: Option<String>,
    pub emailer_host: Option<String>,
    pub from: String,
    pub subject: String,
}

/// Picks the notifier implied by `options`.
///
/// # Errors
///
/// Returns [`NotifyError::Misconfigured`] when an API key is given without
/// an emailer host, or the HTTP client cannot be built.
pub fn build_notifier(
    options: &NotifierOptions,
    timeout: std::time::Duration,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    let Some(api_key) = options.api_key.as_deref().filter(|k| !k.is_empty()) else {
        warn!("no mail API key configured; completion notices are only logged");
        return Ok(Arc::new(LogNotifier));
    };
    let host = options
        .emailer_host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| NotifyError::Misconfigured("EMAILER_HOST is required with RESEND_API_KEY".into()))?;
    Ok(Arc::new(ResendNotifier::new(
        api_key,
        host,
        &options.from,
        &options.subject,
        timeout,
    )?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_log_notifier_receipt() {
        let to = Email::parse("a@b.com").unwrap();
        let receipt = LogNotifier.send_completion_notice(&to, "t.o.k").await.unwrap();
        assert_eq!(receipt.provider, "log");
        assert!(receipt.id.starts_with("log-"));
    }

    #[test]
    fn test_build_without_key_logs() {
        let notifier = build_notifier(&NotifierOptions::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(notifier.provider(), "log");
    }

    #[test]
    fn test_build_key_without_host_fails() {
        let options = NotifierOptions {
            api_key: Some("re_123".into()),
            ..NotifierOptions::default()
        };
        assert!(matches!(
            build_notifier(&options, Duration::from_secs(1)),
            Err(NotifyError::Misconfigured(_))
        ));
    }

    #[test]
    fn test_build_resend() {
        let options = NotifierOptions {
            api_key: Some("re_123".into()),
            emailer_host: Some("http://localhost:3000".into()),
            from: "Gauntlet <noreply@example.com>".into(),
            subject: "Done".into(),
        };
        let notifier = build_notifier(&options, Duration::from_secs(1)).unwrap();
        assert_eq!(notifier.provider(), "resend");
    }
}
