//! Row shapes for every table the store owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CartId, EmailEventId, OrderId, OrderItemId, UserId};

/// Currency every order is recorded in.
pub const ORDER_CURRENCY: &str = "USD";

/// A customer profile. Profiles are the only source of identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
}

/// Lifecycle status of an order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(OrderStatus::Paid),
            "shipped" => Some(OrderStatus::Shipped),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Delivery state of one notification track on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    #[default]
    Unsent,
    /// Claimed by a dispatch that has not finished.
    Sending,
    Sent,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unsent => "unsent",
            NotificationStatus::Sending => "sending",
            NotificationStatus::Sent => "sent",
        }
    }

    /// Unknown values read back as `Unsent` so a later notify retries.
    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => NotificationStatus::Sent,
            "sending" => NotificationStatus::Sending,
            _ => NotificationStatus::Unsent,
        }
    }
}

/// Where the order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

impl Default for ShippingAddress {
    fn default() -> Self {
        Self {
            name: None,
            street: None,
            city: None,
            state: None,
            zip: None,
            country: default_country(),
        }
    }
}

/// Monetary columns of an order, all in integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub min_order_adjustment_cents: i64,
    pub discount_cents: i64,
    pub discount_label: Option<String>,
    /// `none`, `quantity` or `promo`.
    pub discount_source: String,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

/// Manufacturing and artwork attributes of one order line.
///
/// Field names match the `order_items` columns. Columns beyond the core set
/// are listed in [`crate::schema::EXTENDED_ITEM_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub width_in: f64,
    pub height_in: f64,
    pub quantity: i32,
    pub material: String,
    pub grommets: String,
    pub rope_feet: f64,
    pub pole_pockets: bool,
    pub pole_pocket_position: Option<String>,
    pub pole_pocket_size: Option<String>,
    pub pole_pocket_cost_cents: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub file_key: Option<String>,
    pub file_url: Option<String>,
    pub print_ready_url: Option<String>,
    pub web_preview_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub text_elements: Value,
    pub overlay_image: Option<Value>,
    pub overlay_images: Option<Value>,
    pub canvas_background_color: String,
    pub design_service_enabled: bool,
    pub design_request_text: Option<String>,
    pub design_draft_preference: Option<String>,
    pub design_draft_contact: Option<String>,
    pub design_uploaded_assets: Option<Value>,
}

pub const DEFAULT_MATERIAL: &str = "13oz";
pub const DEFAULT_GROMMETS: &str = "none";
pub const DEFAULT_CANVAS_BACKGROUND: &str = "#FFFFFF";

impl Default for ItemAttributes {
    fn default() -> Self {
        Self {
            width_in: 0.0,
            height_in: 0.0,
            quantity: 1,
            material: DEFAULT_MATERIAL.to_string(),
            grommets: DEFAULT_GROMMETS.to_string(),
            rope_feet: 0.0,
            pole_pockets: false,
            pole_pocket_position: None,
            pole_pocket_size: None,
            pole_pocket_cost_cents: 0,
            unit_price_cents: 0,
            line_total_cents: 0,
            file_key: None,
            file_url: None,
            print_ready_url: None,
            web_preview_url: None,
            thumbnail_url: None,
            text_elements: Value::Array(Vec::new()),
            overlay_image: None,
            overlay_images: None,
            canvas_background_color: DEFAULT_CANVAS_BACKGROUND.to_string(),
            design_service_enabled: false,
            design_request_text: None,
            design_draft_preference: None,
            design_draft_contact: None,
            design_uploaded_assets: None,
        }
    }
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// Zero-based line number within the order.
    pub position: i32,
    #[serde(flatten)]
    pub attributes: ItemAttributes,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to write an order and its items in one transaction.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub email: String,
    pub customer_name: Option<String>,
    pub totals: OrderTotals,
    pub gateway_order_id: Option<String>,
    pub gateway_capture_id: Option<String>,
    pub shipping: ShippingAddress,
    pub items: Vec<ItemAttributes>,
}

/// A persisted order row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub email: String,
    pub customer_name: Option<String>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub currency: String,
    pub status: OrderStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_capture_id: Option<String>,
    pub shipping: ShippingAddress,
    pub confirmation_email_status: NotificationStatus,
    pub confirmation_emailed_at: Option<DateTime<Utc>>,
    pub admin_notification_status: NotificationStatus,
    pub admin_notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Builds the row a fresh insert produces.
    pub fn from_new(order: &NewOrder, created_at: DateTime<Utc>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            email: order.email.clone(),
            customer_name: order.customer_name.clone(),
            totals: order.totals.clone(),
            currency: ORDER_CURRENCY.to_string(),
            status: OrderStatus::Paid,
            gateway_order_id: order.gateway_order_id.clone(),
            gateway_capture_id: order.gateway_capture_id.clone(),
            shipping: order.shipping.clone(),
            confirmation_email_status: NotificationStatus::Unsent,
            confirmation_emailed_at: None,
            admin_notification_status: NotificationStatus::Unsent,
            admin_notification_sent_at: None,
            created_at,
        }
    }

    /// True once the customer confirmation has gone out.
    pub fn confirmation_sent(&self) -> bool {
        self.confirmation_email_status == NotificationStatus::Sent
            || self.confirmation_emailed_at.is_some()
    }

    /// True once the admin notification has gone out.
    pub fn admin_notified(&self) -> bool {
        self.admin_notification_status == NotificationStatus::Sent
            || self.admin_notification_sent_at.is_some()
    }
}

/// Recovery state of a cart snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Active,
    Abandoned,
    Recovered,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Active => "active",
            RecoveryStatus::Abandoned => "abandoned",
            RecoveryStatus::Recovered => "recovered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RecoveryStatus::Active),
            "abandoned" => Some(RecoveryStatus::Abandoned),
            "recovered" => Some(RecoveryStatus::Recovered),
            _ => None,
        }
    }

    /// Whether a cart in this state may still be matched to an order.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecoveryStatus::Active | RecoveryStatus::Abandoned)
    }
}

/// A cart snapshot to seed into the store.
#[derive(Debug, Clone)]
pub struct NewAbandonedCart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub cart_contents: Value,
    pub total_value_cents: i64,
    pub recovery_status: RecoveryStatus,
    pub last_activity_at: DateTime<Utc>,
}

/// A persisted cart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbandonedCart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub cart_contents: Value,
    pub total_value_cents: i64,
    pub recovery_status: RecoveryStatus,
    pub last_activity_at: DateTime<Utc>,
    pub recovered_at: Option<DateTime<Utc>>,
    pub recovered_order_id: Option<OrderId>,
}

impl From<NewAbandonedCart> for AbandonedCart {
    fn from(cart: NewAbandonedCart) -> Self {
        Self {
            id: cart.id,
            user_id: cart.user_id,
            email: cart.email,
            cart_contents: cart.cart_contents,
            total_value_cents: cart.total_value_cents,
            recovery_status: cart.recovery_status,
            last_activity_at: cart.last_activity_at,
            recovered_at: None,
            recovered_order_id: None,
        }
    }
}

/// Which notification an email event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailKind {
    #[serde(rename = "order.confirmation")]
    OrderConfirmation,
    #[serde(rename = "order.admin_notification")]
    AdminNotification,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::OrderConfirmation => "order.confirmation",
            EmailKind::AdminNotification => "order.admin_notification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "order.confirmation" => Some(EmailKind::OrderConfirmation),
            "order.admin_notification" => Some(EmailKind::AdminNotification),
            _ => None,
        }
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sent,
    Error,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Sent => "sent",
            EmailStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(EmailStatus::Sent),
            "error" => Some(EmailStatus::Error),
            _ => None,
        }
    }
}

/// One send attempt to append to the audit trail.
#[derive(Debug, Clone)]
pub struct NewEmailEvent {
    pub order_id: OrderId,
    pub kind: EmailKind,
    pub recipient: String,
    pub status: EmailStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub attempt: i32,
}

/// An audit row. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: EmailEventId,
    pub order_id: OrderId,
    pub kind: EmailKind,
    pub recipient: String,
    pub status: EmailStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
}

impl EmailEvent {
    pub fn from_new(event: NewEmailEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EmailEventId::new(),
            order_id: event.order_id,
            kind: event.kind,
            recipient: event.recipient,
            status: event.status,
            provider_message_id: event.provider_message_id,
            error_message: event.error_message,
            attempt: event.attempt,
            created_at,
        }
    }
}
