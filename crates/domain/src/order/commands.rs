//! Order finalization input and output.

use common::{OrderId, UserId};
use order_store::{OrderItemRecord, OrderRecord, ShippingAddress};
use serde::Serialize;

use super::LineItem;
use crate::pricing::{PricingBreakdown, PromoDiscount};

/// Request to turn a cart into a persisted order.
#[derive(Debug, Clone)]
pub struct FinalizeOrder {
    /// The order ID to create.
    pub order_id: OrderId,

    pub items: Vec<LineItem>,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub customer_name: Option<String>,
    pub shipping: ShippingAddress,

    /// Gateway identifiers, when the payment was captured before finalizing.
    pub gateway_order_id: Option<String>,
    pub gateway_capture_id: Option<String>,

    pub promo: Option<PromoDiscount>,
}

impl FinalizeOrder {
    /// Creates a request with a generated order ID.
    pub fn new(items: Vec<LineItem>) -> Self {
        Self {
            order_id: OrderId::new(),
            items,
            user_id: None,
            email: None,
            customer_name: None,
            shipping: ShippingAddress::default(),
            gateway_order_id: None,
            gateway_capture_id: None,
            promo: None,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_shipping(mut self, shipping: ShippingAddress) -> Self {
        self.shipping = shipping;
        self
    }

    /// Attaches the gateway capture this order pays for.
    pub fn with_capture(
        mut self,
        gateway_order_id: impl Into<String>,
        capture_id: impl Into<String>,
    ) -> Self {
        self.gateway_order_id = Some(gateway_order_id.into());
        self.gateway_capture_id = Some(capture_id.into());
        self
    }

    pub fn with_promo(mut self, promo: PromoDiscount) -> Self {
        self.promo = Some(promo);
        self
    }
}

/// A persisted order and how it was priced.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizedOrder {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
    pub pricing: PricingBreakdown,
    /// False when an order for the same capture already existed.
    pub created: bool,
    /// Item fields the store could not write at its schema level.
    pub dropped_fields: Vec<String>,
    /// Artwork references nulled before the write.
    pub sanitized_fields: Vec<String>,
}

impl FinalizedOrder {
    pub fn order_id(&self) -> OrderId {
        self.order.id
    }
}
