//! Payment capture reconciliation.
//!
//! Captures an approved gateway order under an idempotency key, turns the
//! gateway's reply into a [`CaptureRecord`] and links captures onto orders.

use std::str::FromStr;

use common::OrderId;
use order_store::{OrderStore, StoreError};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value;

use crate::services::payment::{FailureFamily, GatewayReply, PaymentError, PaymentGateway};

/// A completed capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureRecord {
    pub gateway_order_id: String,
    pub capture_id: String,
    /// Captured amount in cents, when the gateway reported one.
    pub amount_cents: Option<i64>,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
    pub idempotency_key: String,
    /// The gateway's response as received.
    pub raw: Value,
}

/// Default idempotency key for a gateway order.
pub fn default_idempotency_key(gateway_order_id: &str) -> String {
    format!("cap_{gateway_order_id}")
}

/// Captures payments and records them against orders.
pub struct CaptureReconciler<G: PaymentGateway, S: OrderStore> {
    gateway: G,
    store: S,
}

impl<G: PaymentGateway, S: OrderStore> CaptureReconciler<G, S> {
    pub fn new(gateway: G, store: S) -> Self {
        Self { gateway, store }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Captures a gateway order.
    ///
    /// Without an explicit key the capture uses `cap_<gateway_order_id>`,
    /// so retries of the same checkout converge on one capture.
    #[tracing::instrument(skip(self))]
    pub async fn capture(
        &self,
        gateway_order_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<CaptureRecord, PaymentError> {
        let gateway_order_id = gateway_order_id.trim();
        if gateway_order_id.is_empty() {
            return Err(PaymentError::MissingOrderId);
        }
        let key = idempotency_key
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_idempotency_key(gateway_order_id));

        let result = match self.gateway.capture_order(gateway_order_id, &key).await {
            Ok(reply) => interpret_reply(gateway_order_id, &key, reply),
            Err(e) => Err(e),
        };

        match &result {
            Ok(record) => {
                metrics::counter!("payment_captures_total").increment(1);
                tracing::info!(
                    capture_id = %record.capture_id,
                    amount_cents = ?record.amount_cents,
                    "payment captured"
                );
            }
            Err(e) => {
                metrics::counter!("payment_capture_failures_total", "code" => e.code())
                    .increment(1);
                tracing::warn!(code = e.code(), error = %e, "payment capture failed");
            }
        }
        result
    }

    /// Records a capture on an existing order.
    ///
    /// Best-effort: failures are logged and counted, never returned. Returns
    /// whether the order now carries the capture.
    #[tracing::instrument(skip(self, record), fields(capture_id = %record.capture_id))]
    pub async fn link_capture(&self, order_id: OrderId, record: &CaptureRecord) -> bool {
        match self
            .store
            .link_capture(order_id, &record.gateway_order_id, &record.capture_id)
            .await
        {
            Ok(true) => {
                tracing::info!(%order_id, "capture linked to order");
                true
            }
            Ok(false) => {
                metrics::counter!("best_effort_step_failures_total", "step" => "link_capture")
                    .increment(1);
                tracing::error!(%order_id, "cannot link capture, order not found");
                false
            }
            Err(StoreError::OrderAlreadyCaptured {
                existing_capture_id,
                ..
            }) => {
                metrics::counter!("best_effort_step_failures_total", "step" => "link_capture")
                    .increment(1);
                tracing::error!(
                    %order_id,
                    %existing_capture_id,
                    "order already carries a different capture, refusing to relink"
                );
                false
            }
            Err(e) => {
                metrics::counter!("best_effort_step_failures_total", "step" => "link_capture")
                    .increment(1);
                tracing::error!(%order_id, error = %e, "failed to link capture");
                false
            }
        }
    }
}

/// Turns a raw capture reply into a record or a classified failure.
///
/// A body naming an `INTERNAL` error is a failure even on a 2xx status.
pub fn interpret_reply(
    gateway_order_id: &str,
    idempotency_key: &str,
    reply: GatewayReply,
) -> Result<CaptureRecord, PaymentError> {
    let error_name = reply.body.get("name").and_then(Value::as_str).unwrap_or("");

    if !reply.is_success() || error_name.contains("INTERNAL") {
        let status = if reply.is_success() { 502 } else { reply.status };
        return Err(PaymentError::CaptureFailed {
            status,
            family: FailureFamily::classify(error_name),
            details: reply.body,
        });
    }

    let capture = reply
        .body
        .pointer("/purchase_units/0/payments/captures/0")
        .cloned()
        .unwrap_or(Value::Null);

    let Some(capture_id) = capture
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
    else {
        return Err(PaymentError::IncompleteCapture {
            details: reply.body,
        });
    };

    let amount_cents = capture
        .pointer("/amount/value")
        .and_then(Value::as_str)
        .and_then(parse_amount_cents);

    let payer_email = reply
        .body
        .pointer("/payer/email_address")
        .and_then(Value::as_str)
        .map(str::to_string);

    let payer_name = {
        let given = reply.body.pointer("/payer/name/given_name").and_then(Value::as_str);
        let surname = reply.body.pointer("/payer/name/surname").and_then(Value::as_str);
        let joined = [given, surname]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.trim().is_empty()).then_some(joined)
    };

    Ok(CaptureRecord {
        gateway_order_id: gateway_order_id.to_string(),
        capture_id,
        amount_cents,
        payer_email,
        payer_name,
        idempotency_key: idempotency_key.to_string(),
        raw: reply.body,
    })
}

/// Parses a decimal money string such as `"33.56"` into cents.
fn parse_amount_cents(value: &str) -> Option<i64> {
    let amount = Decimal::from_str(value.trim()).ok()?;
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}
