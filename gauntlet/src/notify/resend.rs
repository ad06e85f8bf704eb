//! Resend-backed notifier.
//!
//! The email body is rendered by an external emailer service, then sent
//! through the Resend API.

use std::time::Duration;

use async_trait::async_trait;
use gauntlet_core::Email;
use reqwest::redirect;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{DeliveryReceipt, Notifier};
use crate::error::NotifyError;

/// Resend's send endpoint.
pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Longest error body kept in [`NotifyError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct RenderedBody {
    html: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Sends completion notices through Resend.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: String,
    emailer_url: String,
    endpoint: String,
    from: String,
    subject: String,
}

impl ResendNotifier {
    /// Creates a notifier whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Misconfigured`] if the HTTP client cannot be
    /// built.
    pub fn new(
        api_key: &str,
        emailer_host: &str,
        from: &str,
        subject: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Misconfigured(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            emailer_url: emailer_host.trim_end_matches('/').to_string(),
            endpoint: RESEND_ENDPOINT.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
        })
    }

    /// Overrides the send endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn render(&self, token: &str) -> Result<String, NotifyError> {
        debug!(url = %self.emailer_url, "rendering completion email");
        let response = self
            .client
            .post(&self.emailer_url)
            .json(&json!({ "token": token }))
            .send()
            .await?;
        let response = check_status("emailer", response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str::<RenderedBody>(&text).map_or(text, |body| body.html))
    }
}

async fn check_status(
    stage: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(NotifyError::Status {
        stage,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send_completion_notice(
        &self,
        to: &Email,
        token: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let html = self.render(token).await?;
        debug!(email = %to, "sending completion email");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to.as_str()],
                "subject": self.subject,
                "html": html,
            }))
            .send()
            .await?;
        let response = check_status("resend", response).await?;
        let sent: SendResponse = response.json().await?;
        Ok(DeliveryReceipt {
            id: sent.id,
            provider: self.provider(),
        })
    }

    fn provider(&self) -> &'static str {
        "resend"
    }
}
