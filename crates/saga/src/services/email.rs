//! Email provider trait, the Resend HTTP client and an in-memory provider.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A rendered message ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// What the provider returned for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SentEmail {
    pub message_id: Option<String>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// The provider answered with a non-success status.
    #[error("provider rejected message with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl EmailError {
    /// Rate limiting (429) and provider-side failures (5xx) are worth
    /// another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmailError::Rejected { status, .. } => *status == 429 || (500..600).contains(status),
            EmailError::Http(e) => e
                .status()
                .is_some_and(|s| s.as_u16() == 429 || s.is_server_error()),
            EmailError::Template(_) => false,
        }
    }
}

/// Sends transactional email.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, EmailError>;
}

#[async_trait]
impl<T: EmailProvider + ?Sized> EmailProvider for Arc<T> {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, EmailError> {
        (**self).send(email).await
    }
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

/// Resend API client.
#[derive(Clone)]
pub struct ResendClient {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
}

impl ResendClient {
    pub fn new(api_key: SecretString) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: RESEND_API_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl EmailProvider for ResendClient {
    #[tracing::instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, EmailError> {
        let body = ResendRequest {
            from: &email.from,
            to: [&email.to],
            reply_to: email.reply_to.as_deref(),
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ResendResponse = response.json().await?;
        Ok(SentEmail {
            message_id: parsed.id,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryEmailState {
    sent: Vec<OutgoingEmail>,
    /// Statuses to fail upcoming sends with, in order.
    failures: VecDeque<u16>,
    /// Recipients that always fail with the given status.
    failing_recipients: Vec<(String, u16)>,
    attempts: usize,
    /// Wait before each send.
    delay: Duration,
}

/// Provider that logs and keeps messages instead of sending them.
///
/// The default for local runs and the provider every notification test uses.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmailProvider {
    state: Arc<Mutex<InMemoryEmailState>>,
}

impl InMemoryEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next sends with these HTTP statuses, one per attempt.
    pub async fn fail_next(&self, statuses: impl IntoIterator<Item = u16>) {
        self.state.lock().await.failures.extend(statuses);
    }

    /// Fails every send to `recipient` with `status`.
    pub async fn fail_recipient(&self, recipient: impl Into<String>, status: u16) {
        self.state
            .lock()
            .await
            .failing_recipients
            .push((recipient.into(), status));
    }

    /// Makes every send wait before it completes.
    pub async fn set_send_delay(&self, delay: Duration) {
        self.state.lock().await.delay = delay;
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.state.lock().await.sent.clone()
    }

    /// Sends attempted, including failed ones.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }
}

#[async_trait]
impl EmailProvider for InMemoryEmailProvider {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, EmailError> {
        let delay = self.state.lock().await.delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.attempts += 1;

        let recipient_failure = state
            .failing_recipients
            .iter()
            .find(|(to, _)| to.eq_ignore_ascii_case(&email.to))
            .map(|(_, status)| *status);
        if let Some(status) = recipient_failure.or_else(|| state.failures.pop_front()) {
            return Err(EmailError::Rejected {
                status,
                message: format!("simulated provider failure ({status})"),
            });
        }

        state.sent.push(email.clone());
        let message_id = format!("mem-{:04}", state.sent.len());
        tracing::info!(to = %email.to, subject = %email.subject, %message_id, "email recorded");
        Ok(SentEmail {
            message_id: Some(message_id),
        })
    }
}
