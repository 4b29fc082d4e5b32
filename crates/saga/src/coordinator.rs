//! Checkout saga runner.
//!
//! A checkout is one mandatory core sequence (capture, verify, persist)
//! followed by named best-effort steps. Core failures abort and propagate.
//! Best-effort steps run inside their own boundary, panics included, and
//! only ever produce a [`StepReport`].

use std::future::Future;
use std::panic::AssertUnwindSafe;

use common::OrderId;
use domain::{
    DomainError, FinalizeOrder, FinalizedOrder, OrderService, PricingBreakdown, PricingConfig,
};
use futures_util::FutureExt;
use order_store::{ORDER_CURRENCY, OrderRecord, OrderStore};
use serde::Serialize;

use crate::capture::{CaptureReconciler, CaptureRecord};
use crate::checkout;
use crate::error::SagaError;
use crate::notifications::{NotificationDispatcher, NotificationSettings, RetryPolicy};
use crate::recovery::{AbandonedCartMatcher, RecoveryOutcome};
use crate::services::email::EmailProvider;
use crate::services::payment::{NewGatewayOrder, PaymentGateway};
use crate::state::{StepReport, StepStatus};

/// A cart to capture and persist as one checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub gateway_order_id: String,
    pub idempotency_key: Option<String>,
    pub order: FinalizeOrder,
}

/// A completed core sequence.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub capture: CaptureRecord,
    pub order: FinalizedOrder,
    pub steps: Vec<StepReport>,
}

/// A gateway order opened for a server-priced cart.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOrder {
    pub gateway_order_id: String,
    pub status: String,
    pub pricing: PricingBreakdown,
}

/// A capture linked onto an order that already exists.
#[derive(Debug, Clone, Serialize)]
pub struct LinkOutcome {
    pub capture: CaptureRecord,
    pub steps: Vec<StepReport>,
}

/// Orchestrates checkout across the gateway, the store and the email
/// provider.
pub struct CheckoutSaga<S, G, P>
where
    S: OrderStore + Clone,
    G: PaymentGateway,
    P: EmailProvider,
{
    orders: OrderService<S>,
    capture: CaptureReconciler<G, S>,
    notifications: NotificationDispatcher<S, P>,
    recovery: AbandonedCartMatcher<S>,
}

impl<S, G, P> CheckoutSaga<S, G, P>
where
    S: OrderStore + Clone,
    G: PaymentGateway,
    P: EmailProvider,
{
    /// Creates a new checkout saga.
    pub fn new(
        store: S,
        gateway: G,
        provider: P,
        pricing: PricingConfig,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            orders: OrderService::new(store.clone(), pricing.clone()),
            capture: CaptureReconciler::new(gateway, store.clone()),
            notifications: NotificationDispatcher::new(store.clone(), provider, pricing, settings),
            recovery: AbandonedCartMatcher::new(store),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.notifications = self.notifications.with_retry_policy(retry);
        self
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn capture_reconciler(&self) -> &CaptureReconciler<G, S> {
        &self.capture
    }

    pub fn notifications(&self) -> &NotificationDispatcher<S, P> {
        &self.notifications
    }

    /// Prices a cart and opens a gateway order for exactly that total.
    ///
    /// The buyer approves the returned order, so the amount later captured
    /// is the one computed here rather than one the client supplied.
    #[tracing::instrument(
        skip(self, cart),
        fields(saga_type = checkout::SAGA_TYPE, items = cart.items.len())
    )]
    pub async fn open_payment(&self, cart: &FinalizeOrder) -> Result<PaymentOrder, SagaError> {
        if cart.items.is_empty() {
            return Err(
                DomainError::Validation("an order needs at least one item".to_string()).into(),
            );
        }
        let pricing = self.orders.quote(&cart.items, cart.promo.clone());

        let request = NewGatewayOrder {
            amount_cents: pricing.total_cents,
            currency: ORDER_CURRENCY.to_string(),
            reference: Some(cart.order_id.to_string()),
        };
        let opened = core_step(
            checkout::STEP_OPEN_PAYMENT,
            self.capture.gateway().create_order(&request),
        )
        .await
        .inspect_err(|e| {
            metrics::counter!("payment_order_failures_total", "code" => e.code()).increment(1);
            tracing::warn!(code = e.code(), error = %e, "gateway order creation failed");
        })?;

        metrics::counter!("payment_orders_opened_total").increment(1);
        tracing::info!(
            gateway_order_id = %opened.id,
            total_cents = pricing.total_cents,
            "gateway order opened"
        );
        Ok(PaymentOrder {
            gateway_order_id: opened.id,
            status: opened.status,
            pricing,
        })
    }

    /// Captures the payment, checks the amount and persists the order.
    ///
    /// Nothing is written if the captured amount differs from what the
    /// cart prices to. Replaying a checkout converges on the same capture
    /// and the same order.
    #[tracing::instrument(
        skip(self, request),
        fields(saga_type = checkout::SAGA_TYPE, gateway_order_id = %request.gateway_order_id)
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, SagaError> {
        let start = std::time::Instant::now();
        let CheckoutRequest {
            gateway_order_id,
            idempotency_key,
            order: mut cmd,
        } = request;
        let mut steps = Vec::new();

        tracing::info!(step = checkout::STEP_CAPTURE_PAYMENT, "saga step started");
        let capture = core_step(
            checkout::STEP_CAPTURE_PAYMENT,
            self.capture
                .capture(&gateway_order_id, idempotency_key.as_deref()),
        )
        .await?;
        steps.push(StepReport::completed(
            checkout::STEP_CAPTURE_PAYMENT,
            Some(capture.capture_id.clone()),
        ));

        let expected = self.orders.quote(&cmd.items, cmd.promo.clone()).total_cents;
        if capture.amount_cents != Some(expected) {
            metrics::counter!("checkout_amount_mismatches_total").increment(1);
            tracing::error!(
                step = checkout::STEP_VERIFY_AMOUNT,
                expected,
                captured = ?capture.amount_cents,
                capture_id = %capture.capture_id,
                "captured amount does not match cart total"
            );
            return Err(SagaError::AmountMismatch {
                expected,
                captured: capture.amount_cents,
                capture: Box::new(capture),
            });
        }
        steps.push(StepReport::completed(checkout::STEP_VERIFY_AMOUNT, None));

        if cmd.email.as_deref().is_none_or(|e| e.trim().is_empty()) {
            cmd.email = capture.payer_email.clone();
        }
        if cmd.customer_name.is_none() {
            cmd.customer_name = capture.payer_name.clone();
        }
        cmd.gateway_order_id = Some(capture.gateway_order_id.clone());
        cmd.gateway_capture_id = Some(capture.capture_id.clone());

        tracing::info!(step = checkout::STEP_PERSIST_ORDER, "saga step started");
        let order = core_step(checkout::STEP_PERSIST_ORDER, self.orders.finalize(cmd)).await?;
        steps.push(StepReport::completed(
            checkout::STEP_PERSIST_ORDER,
            Some(order.order_id().to_string()),
        ));

        let duration = start.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        tracing::info!(order_id = %order.order_id(), created = order.created, duration, "checkout completed");

        Ok(CheckoutOutcome {
            capture,
            order,
            steps,
        })
    }

    /// Captures a payment for an order that already exists and links it.
    #[tracing::instrument(skip(self))]
    pub async fn capture_and_link(
        &self,
        gateway_order_id: &str,
        idempotency_key: Option<&str>,
        order_id: OrderId,
    ) -> Result<LinkOutcome, SagaError> {
        let capture = self.capture_only(gateway_order_id, idempotency_key).await?;
        let mut steps = vec![StepReport::completed(
            checkout::STEP_CAPTURE_PAYMENT,
            Some(capture.capture_id.clone()),
        )];

        let link = best_effort(checkout::STEP_LINK_CAPTURE, async {
            if self.capture.link_capture(order_id, &capture).await {
                StepReport::completed(checkout::STEP_LINK_CAPTURE, Some(order_id.to_string()))
            } else {
                StepReport::failed(checkout::STEP_LINK_CAPTURE, "capture not linked")
            }
        })
        .await;
        steps.push(link);

        Ok(LinkOutcome { capture, steps })
    }

    /// Captures a payment without touching any order.
    pub async fn capture_only(
        &self,
        gateway_order_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<CaptureRecord, SagaError> {
        core_step(
            checkout::STEP_CAPTURE_PAYMENT,
            self.capture.capture(gateway_order_id, idempotency_key),
        )
        .await
    }

    /// Runs the best-effort steps that follow a persisted order.
    ///
    /// Never fails. Each step reports its own outcome.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn follow_up(&self, order: &OrderRecord) -> Vec<StepReport> {
        let recover = best_effort(checkout::STEP_RECOVER_CART, async {
            match self
                .recovery
                .try_recover(order.user_id, &order.email, order.id)
                .await
            {
                RecoveryOutcome::Recovered { cart_id } => {
                    StepReport::completed(checkout::STEP_RECOVER_CART, Some(cart_id.to_string()))
                }
                RecoveryOutcome::AlreadyRecovered { cart_id } => StepReport::skipped(
                    checkout::STEP_RECOVER_CART,
                    format!("cart {cart_id} already recovered"),
                ),
                RecoveryOutcome::NoMatch => {
                    StepReport::skipped(checkout::STEP_RECOVER_CART, "no matching cart")
                }
                RecoveryOutcome::Failed { error } => {
                    StepReport::failed(checkout::STEP_RECOVER_CART, error)
                }
            }
        })
        .await;

        let notify = best_effort(checkout::STEP_NOTIFY, async {
            match self.notifications.notify(order.id).await {
                Ok(outcome) if outcome.idempotent => {
                    StepReport::skipped(checkout::STEP_NOTIFY, "confirmation already sent")
                }
                Ok(outcome) => StepReport::completed(checkout::STEP_NOTIFY, outcome.message_id),
                Err(e) => StepReport::failed(checkout::STEP_NOTIFY, e.to_string()),
            }
        })
        .await;

        vec![recover, notify]
    }
}

/// Runs a core step, turning a panic into [`SagaError::Crashed`].
async fn core_step<T, E, F>(step: &'static str, fut: F) -> Result<T, SagaError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<SagaError>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            metrics::counter!("saga_step_crashes_total", "step" => step).increment(1);
            tracing::error!(step, "core step panicked");
            Err(SagaError::Crashed { step })
        }
    }
}

/// Runs a best-effort step inside its own failure boundary.
async fn best_effort<F>(step: &'static str, fut: F) -> StepReport
where
    F: Future<Output = StepReport>,
{
    let report = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(report) => report,
        Err(_) => {
            tracing::error!(step, "best-effort step panicked");
            StepReport::crashed(step)
        }
    };

    match report.status {
        StepStatus::Failed | StepStatus::Crashed => {
            metrics::counter!("best_effort_step_failures_total", "step" => step).increment(1);
            tracing::warn!(step, status = %report.status, detail = ?report.detail, "best-effort step did not complete");
        }
        StepStatus::Completed | StepStatus::Skipped => {
            tracing::info!(step, status = %report.status, "best-effort step finished");
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn best_effort_contains_panics() {
        let report = best_effort("exploding_step", async {
            if true {
                panic!("boom");
            }
            StepReport::completed("exploding_step", None)
        })
        .await;
        assert_eq!(report.status, StepStatus::Crashed);
        assert_eq!(report.step, "exploding_step");
    }

    #[tokio::test]
    async fn core_step_maps_panics_to_crash() {
        let result: Result<(), SagaError> = core_step("exploding_step", async {
            if true {
                panic!("boom");
            }
            Ok::<(), SagaError>(())
        })
        .await;
        assert!(matches!(result, Err(SagaError::Crashed { step: "exploding_step" })));
        assert_eq!(result.unwrap_err().code(), "FUNCTION_CRASH");
    }
}
