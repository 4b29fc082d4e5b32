//! Order notification dispatch.
//!
//! Sends the customer confirmation and then the admin notification for an
//! order. Each track is idempotent on its stored status, retries transient
//! provider failures with a fixed backoff, and writes every attempt to the
//! email audit trail. The confirmation is claimed in the store before it is
//! sent, so concurrent calls for one order send it once.

use std::time::Duration;

use askama::Template;
use chrono::Utc;
use common::OrderId;
use domain::PricingConfig;
use order_store::{EmailKind, EmailStatus, NewEmailEvent, OrderStore, StoreError};
use serde::Serialize;
use thiserror::Error;

use crate::services::email::{EmailError, EmailProvider, OutgoingEmail, SentEmail};
use crate::templates::{AdminHtml, AdminText, ConfirmationHtml, ConfirmationText, EmailOrderView};

pub const DEFAULT_EMAIL_FROM: &str = "orders@bannersonthefly.com";
pub const DEFAULT_REPLY_TO: &str = "support@bannersonthefly.com";
pub const DEFAULT_ADMIN_EMAIL: &str = "info@bannersonthefly.com";
pub const DEFAULT_SITE_URL: &str = "https://www.bannersonthefly.com";

/// How often and how patiently a send is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before attempt `n + 2`; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Pause between the confirmation and the admin send.
    pub track_spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![Duration::from_secs(1), Duration::from_secs(3)],
            track_spacing: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Same attempt bound with no waiting.
    pub fn immediate() -> Self {
        Self {
            backoff: Vec::new(),
            track_spacing: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Addresses and links used in order emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub from: String,
    pub reply_to: Option<String>,
    pub admin_email: String,
    pub site_url: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            from: DEFAULT_EMAIL_FROM.to_string(),
            reply_to: Some(DEFAULT_REPLY_TO.to_string()),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The confirmation could not be delivered. The claim is released and
    /// the order stays unsent.
    #[error("email provider failed after {attempts} attempt(s): {message}")]
    ProviderFailed { attempts: u32, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// What happened on the admin track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminOutcome {
    Sent { message_id: Option<String> },
    AlreadySent,
    Failed { error: String },
    /// The confirmation was already sent, so nothing ran.
    Skipped,
}

/// Result of a notify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyOutcome {
    pub ok: bool,
    /// True when the confirmation had already gone out or another call
    /// holds the claim to send it.
    pub idempotent: bool,
    pub message_id: Option<String>,
    pub admin: AdminOutcome,
}

/// Sends order emails through a provider and records every attempt.
pub struct NotificationDispatcher<S: OrderStore, P: EmailProvider> {
    store: S,
    provider: P,
    pricing: PricingConfig,
    settings: NotificationSettings,
    retry: RetryPolicy,
}

impl<S: OrderStore, P: EmailProvider> NotificationDispatcher<S, P> {
    pub fn new(store: S, provider: P, pricing: PricingConfig, settings: NotificationSettings) -> Self {
        Self {
            store,
            provider,
            pricing,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Sends the confirmation and admin notification for an order.
    #[tracing::instrument(skip(self))]
    pub async fn notify(&self, order_id: OrderId) -> Result<NotifyOutcome, NotificationError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(NotificationError::OrderNotFound(order_id))?;

        if order.confirmation_sent() {
            tracing::info!("confirmation already sent, nothing to do");
            return Ok(NotifyOutcome {
                ok: true,
                idempotent: true,
                message_id: None,
                admin: AdminOutcome::Skipped,
            });
        }

        let items = self.store.get_order_items(order_id).await?;
        let pricing = self.pricing.price_stored(&order, &items);
        let view = EmailOrderView::build(
            &order,
            &items,
            &pricing,
            &self.pricing.shipping_method_label,
            &self.settings.site_url,
        );

        let confirmation = self.compose(
            &order.email,
            view.confirmation_subject(),
            ConfirmationHtml { order: &view }.render()?,
            ConfirmationText { order: &view }.render()?,
        );

        if !self.store.claim_confirmation(order_id).await? {
            metrics::counter!("notification_claims_lost_total").increment(1);
            tracing::info!("confirmation claimed by another dispatch, nothing to do");
            return Ok(NotifyOutcome {
                ok: true,
                idempotent: true,
                message_id: None,
                admin: AdminOutcome::Skipped,
            });
        }

        let sent = match self
            .send_with_retry(order_id, EmailKind::OrderConfirmation, &confirmation)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                if let Err(release) = self.store.release_confirmation(order_id).await {
                    tracing::error!(error = %release, "failed to release confirmation claim");
                }
                return Err(e);
            }
        };

        // The claim stays held if this fails, so no later call resends
        if let Err(e) = self.store.mark_confirmation_sent(order_id, Utc::now()).await {
            tracing::error!(error = %e, "confirmation sent but status update failed");
        }
        tracing::info!(message_id = ?sent.message_id, "order confirmation sent");

        let admin = if order.admin_notified() {
            AdminOutcome::AlreadySent
        } else {
            self.notify_admin(order_id, &view).await
        };

        Ok(NotifyOutcome {
            ok: true,
            idempotent: false,
            message_id: sent.message_id,
            admin,
        })
    }

    /// The admin track never fails the request.
    async fn notify_admin(&self, order_id: OrderId, view: &EmailOrderView) -> AdminOutcome {
        if !self.retry.track_spacing.is_zero() {
            tokio::time::sleep(self.retry.track_spacing).await;
        }

        let rendered = AdminHtml { order: view }
            .render()
            .and_then(|html| AdminText { order: view }.render().map(|text| (html, text)));
        let (html, text) = match rendered {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "admin notification template failed");
                return AdminOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let email = self.compose(&self.settings.admin_email, view.admin_subject(), html, text);
        match self
            .send_with_retry(order_id, EmailKind::AdminNotification, &email)
            .await
        {
            Ok(sent) => {
                if let Err(e) = self.store.mark_admin_notified(order_id, Utc::now()).await {
                    tracing::warn!(error = %e, "admin notified but status update failed");
                }
                AdminOutcome::Sent {
                    message_id: sent.message_id,
                }
            }
            Err(e) => {
                metrics::counter!("best_effort_step_failures_total", "step" => "admin_notification")
                    .increment(1);
                tracing::warn!(error = %e, "admin notification failed");
                AdminOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn compose(&self, to: &str, subject: String, html: String, text: String) -> OutgoingEmail {
        OutgoingEmail {
            from: self.settings.from.clone(),
            to: to.to_string(),
            reply_to: self.settings.reply_to.clone(),
            subject,
            html,
            text,
        }
    }

    /// Sends with retries, auditing each attempt.
    async fn send_with_retry(
        &self,
        order_id: OrderId,
        kind: EmailKind,
        email: &OutgoingEmail,
    ) -> Result<SentEmail, NotificationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::counter!("email_send_attempts_total", "kind" => kind.as_str()).increment(1);

            let result = self.provider.send(email).await;
            self.audit(order_id, kind, email, attempt, &result).await;

            match result {
                Ok(sent) => return Ok(sent),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        kind = kind.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "email send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(NotificationError::ProviderFailed {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn audit(
        &self,
        order_id: OrderId,
        kind: EmailKind,
        email: &OutgoingEmail,
        attempt: u32,
        result: &Result<SentEmail, EmailError>,
    ) {
        let event = NewEmailEvent {
            order_id,
            kind,
            recipient: email.to.clone(),
            status: if result.is_ok() {
                EmailStatus::Sent
            } else {
                EmailStatus::Error
            },
            provider_message_id: result.as_ref().ok().and_then(|s| s.message_id.clone()),
            error_message: result.as_ref().err().map(ToString::to_string),
            attempt: i32::try_from(attempt).unwrap_or(i32::MAX),
        };
        if let Err(e) = self.store.append_email_event(event).await {
            tracing::warn!(error = %e, attempt, "failed to record email event");
        }
    }
}
