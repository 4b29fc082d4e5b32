//! Order finalization and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, UserId};
use domain::{FinalizeOrder, FinalizedOrder, LineItem, PricingBreakdown, PromoDiscount};
use order_store::{OrderItemRecord, OrderRecord, OrderStore, ShippingAddress};
use saga::{CheckoutSaga, EmailProvider, PaymentGateway};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// The checkout saga as the API wires it.
pub type AppSaga<S> = CheckoutSaga<S, Arc<dyn PaymentGateway>, Arc<dyn EmailProvider>>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore + Clone> {
    pub saga: AppSaga<S>,
    pub store: S,
    /// Run follow-up steps before responding instead of in the background.
    pub await_follow_up: bool,
}

impl<S: OrderStore + Clone + 'static> AppState<S> {
    /// Runs the best-effort steps for a persisted order.
    ///
    /// By default they are spawned so the response does not wait on email
    /// delivery.
    pub async fn follow_up(self: &Arc<Self>, order: OrderRecord) {
        if self.await_follow_up {
            self.saga.follow_up(&order).await;
            return;
        }
        let state = Arc::clone(self);
        tokio::spawn(async move {
            state.saga.follow_up(&order).await;
        });
    }
}

// -- Request types --

/// Flat `shipping_*` fields as the storefront sends them.
#[derive(Debug, Default, Deserialize)]
pub struct ShippingFields {
    pub shipping_name: Option<String>,
    pub shipping_street: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_zip: Option<String>,
    pub shipping_country: Option<String>,
}

impl ShippingFields {
    pub fn into_address(self) -> ShippingAddress {
        let defaults = ShippingAddress::default();
        ShippingAddress {
            name: self.shipping_name,
            street: self.shipping_street,
            city: self.shipping_city,
            state: self.shipping_state,
            zip: self.shipping_zip,
            country: self.shipping_country.unwrap_or(defaults.country),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FinalizeOrderRequest {
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub customer_name: Option<String>,
    #[serde(flatten)]
    pub shipping: ShippingFields,
    pub paypal_order_id: Option<String>,
    pub paypal_capture_id: Option<String>,
    pub promo: Option<PromoDiscount>,
}

// -- Response types --

/// An order with its items and the pricing behind its totals.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
    pub pricing: PricingBreakdown,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sanitized_fields: Vec<String>,
}

impl From<FinalizedOrder> for OrderResponse {
    fn from(finalized: FinalizedOrder) -> Self {
        Self {
            order: finalized.order,
            items: finalized.items,
            pricing: finalized.pricing,
            dropped_fields: finalized.dropped_fields,
            sanitized_fields: finalized.sanitized_fields,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub ok: bool,
    pub order_id: String,
    pub created: bool,
    pub order: OrderResponse,
}

// -- Handlers --

/// POST /orders: finalize a cart into a persisted order.
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<FinalizeOrderRequest>,
) -> Result<Json<OrderCreatedResponse>, ApiError> {
    let mut cmd = FinalizeOrder::new(req.items).with_shipping(req.shipping.into_address());
    cmd.user_id = parse_user_id(req.user_id.as_deref())?;
    cmd.email = req.email;
    cmd.customer_name = req.customer_name;
    cmd.gateway_order_id = req.paypal_order_id;
    cmd.gateway_capture_id = req.paypal_capture_id;
    cmd.promo = req.promo;

    let finalized = state.saga.orders().finalize(cmd).await?;
    state.follow_up(finalized.order.clone()).await;

    Ok(Json(OrderCreatedResponse {
        ok: true,
        order_id: finalized.order_id().to_string(),
        created: finalized.created,
        order: finalized.into(),
    }))
}

/// GET /orders/{id}: load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let items = state.store.get_order_items(order_id).await?;
    let pricing = state.saga.orders().pricing().price_stored(&order, &items);

    Ok(Json(OrderResponse {
        order,
        items,
        pricing,
        dropped_fields: Vec::new(),
        sanitized_fields: Vec::new(),
    }))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id.trim()).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

pub(crate) fn parse_user_id(id: Option<&str>) -> Result<Option<UserId>, ApiError> {
    id.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            UserId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid user id: {e}")))
        })
        .transpose()
}
