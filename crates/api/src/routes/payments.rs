//! Payment endpoints: open a gateway order, then capture it.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{FinalizeOrder, LineItem, PricingBreakdown, PromoDiscount};
use order_store::OrderStore;
use saga::{CheckoutRequest, StepReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::orders::{AppState, ShippingFields, parse_order_id, parse_user_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct OpenPaymentRequest {
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub promo: Option<PromoDiscount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPaymentResponse {
    pub ok: bool,
    #[serde(rename = "paypalOrderId")]
    pub gateway_order_id: String,
    pub status: String,
    pub pricing: PricingBreakdown,
}

/// POST /payments/order: price a cart and open a gateway order for it.
///
/// The amount comes from the server-side pricing, never from the client.
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn open<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<OpenPaymentRequest>,
) -> Result<Json<OpenPaymentResponse>, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".to_string()));
    }
    let mut cart = FinalizeOrder::new(req.items);
    cart.promo = req.promo;

    let opened = state.saga.open_payment(&cart).await?;
    Ok(Json(OpenPaymentResponse {
        ok: true,
        gateway_order_id: opened.gateway_order_id,
        status: opened.status,
        pricing: opened.pricing,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    /// The gateway's order id.
    #[serde(rename = "orderID", default)]
    pub gateway_order_id: String,
    /// An existing order to link the capture onto.
    pub order_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub cart_items: Option<Vec<LineItem>>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub customer_name: Option<String>,
    pub promo: Option<PromoDiscount>,
    #[serde(flatten)]
    pub shipping: ShippingFields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub ok: bool,
    /// The gateway's capture response.
    pub data: Value,
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
}

/// POST /payments/capture: capture an approved payment.
///
/// With `cartItems` the capture and the order are one checkout. With
/// `orderId` the capture is linked onto that order. Otherwise only the
/// capture runs.
#[tracing::instrument(skip(state, req), fields(gateway_order_id = %req.gateway_order_id))]
pub async fn capture<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(mut req): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>, ApiError> {
    if let Some(items) = req.cart_items.take().filter(|items| !items.is_empty()) {
        metrics::counter!("capture_requests_total", "mode" => "checkout").increment(1);
        let mut order = FinalizeOrder::new(items).with_shipping(req.shipping.into_address());
        order.user_id = parse_user_id(req.user_id.as_deref())?;
        order.email = req.user_email;
        order.customer_name = req.customer_name;
        order.promo = req.promo;

        let outcome = state
            .saga
            .checkout(CheckoutRequest {
                gateway_order_id: req.gateway_order_id,
                idempotency_key: req.idempotency_key,
                order,
            })
            .await?;
        state.follow_up(outcome.order.order.clone()).await;

        return Ok(Json(CaptureResponse {
            ok: true,
            data: outcome.capture.raw,
            order_id: Some(outcome.order.order_id().to_string()),
            steps: outcome.steps,
        }));
    }

    let key = req.idempotency_key.as_deref();
    if let Some(order_id) = req.order_id.as_deref() {
        metrics::counter!("capture_requests_total", "mode" => "link").increment(1);
        let order_id = parse_order_id(order_id)?;
        let outcome = state
            .saga
            .capture_and_link(&req.gateway_order_id, key, order_id)
            .await?;
        return Ok(Json(CaptureResponse {
            ok: true,
            data: outcome.capture.raw,
            order_id: Some(order_id.to_string()),
            steps: outcome.steps,
        }));
    }

    metrics::counter!("capture_requests_total", "mode" => "capture_only").increment(1);
    let capture = state.saga.capture_only(&req.gateway_order_id, key).await?;
    Ok(Json(CaptureResponse {
        ok: true,
        data: capture.raw,
        order_id: None,
        steps: Vec::new(),
    }))
}
