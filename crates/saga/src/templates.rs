//! Email view models and their askama templates.

use askama::Template;
use domain::{Money, PricingBreakdown};
use order_store::{OrderItemRecord, OrderRecord};

const BRAND: &str = "Banners On The Fly";
const DEFAULT_CUSTOMER_NAME: &str = "Valued Customer";

/// One line as shown in an email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailItemView {
    pub name: String,
    pub quantity: i32,
    pub options: String,
    pub price: String,
    pub thumbnail_url: Option<String>,
    pub design_service: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailDiscountView {
    pub label: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailAddressView {
    pub name: String,
    pub street: Option<String>,
    pub locality: Option<String>,
    /// Only set for addresses outside the US.
    pub country: Option<String>,
}

/// Everything the order emails display.
///
/// Money is formatted from a pricing breakdown, never from stored totals,
/// so the emails agree with what checkout charged.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailOrderView {
    pub id: String,
    pub number: String,
    pub customer_name: String,
    pub email: String,
    pub items: Vec<EmailItemView>,
    pub subtotal: String,
    pub min_order_adjustment: Option<String>,
    pub discount: Option<EmailDiscountView>,
    pub tax: Option<String>,
    pub shipping: String,
    pub shipping_method: String,
    pub total: String,
    pub address: Option<EmailAddressView>,
    pub invoice_url: String,
}

impl EmailOrderView {
    pub fn build(
        order: &OrderRecord,
        items: &[OrderItemRecord],
        pricing: &PricingBreakdown,
        shipping_method: &str,
        site_url: &str,
    ) -> Self {
        let money = |cents: i64| Money::from_cents(cents).to_string();

        let address = order.shipping.name.as_ref().map(|name| {
            let locality = [
                order.shipping.city.as_deref(),
                order.shipping.state.as_deref(),
                order.shipping.zip.as_deref(),
            ]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ");
            EmailAddressView {
                name: name.clone(),
                street: order.shipping.street.clone(),
                locality: (!locality.is_empty()).then_some(locality),
                country: (order.shipping.country != "US").then(|| order.shipping.country.clone()),
            }
        });

        Self {
            id: order.id.to_string(),
            number: order.id.short_number(),
            customer_name: order
                .customer_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
            email: order.email.clone(),
            items: items.iter().map(item_view).collect(),
            subtotal: money(pricing.raw_subtotal_cents),
            min_order_adjustment: (pricing.min_order_adjustment_cents > 0)
                .then(|| money(pricing.min_order_adjustment_cents)),
            discount: (pricing.discount_cents > 0).then(|| EmailDiscountView {
                label: pricing
                    .discount_label
                    .clone()
                    .unwrap_or_else(|| "Discount".to_string()),
                amount: money(pricing.discount_cents),
            }),
            tax: (pricing.tax_cents > 0).then(|| money(pricing.tax_cents)),
            shipping: if pricing.shipping_cents == 0 {
                "Free".to_string()
            } else {
                money(pricing.shipping_cents)
            },
            shipping_method: shipping_method.to_string(),
            total: money(pricing.total_cents),
            address,
            invoice_url: format!("{}/orders/{}", site_url.trim_end_matches('/'), order.id),
        }
    }

    pub fn confirmation_subject(&self) -> String {
        format!("Order Confirmation #{} - {BRAND}", self.number)
    }

    pub fn admin_subject(&self) -> String {
        format!("New Order #{} - {}", self.number, self.total)
    }
}

fn item_view(item: &OrderItemRecord) -> EmailItemView {
    let a = &item.attributes;

    let mut options = vec![format!("Material: {}", a.material)];
    if !a.grommets.is_empty() && a.grommets != "none" {
        options.push(format!("Grommets: {}", a.grommets));
    }
    if a.rope_feet > 0.0 {
        options.push(format!("Rope: {:.1} ft", a.rope_feet));
    }
    match a.pole_pocket_position.as_deref() {
        Some(position) if position != "none" => {
            let size = a
                .pole_pocket_size
                .as_deref()
                .map(|size| format!(" ({size} inch)"))
                .unwrap_or_default();
            options.push(format!("Pole Pockets: {position}{size}"));
        }
        _ if a.pole_pockets => options.push("Pole Pockets: Yes".to_string()),
        _ => {}
    }
    if let Some(file_key) = &a.file_key {
        options.push(format!("File: {file_key}"));
    }
    if a.design_service_enabled {
        options.push("Design Service Order".to_string());
    }

    EmailItemView {
        name: format!("Custom Banner {}\"×{}\"", a.width_in, a.height_in),
        quantity: a.quantity,
        options: options.join(" • "),
        price: Money::from_cents(a.line_total_cents).to_string(),
        thumbnail_url: a
            .thumbnail_url
            .clone()
            .or_else(|| a.web_preview_url.clone())
            .or_else(|| a.print_ready_url.clone()),
        design_service: a.design_service_enabled,
    }
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
pub struct ConfirmationHtml<'a> {
    pub order: &'a EmailOrderView,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
pub struct ConfirmationText<'a> {
    pub order: &'a EmailOrderView,
}

#[derive(Template)]
#[template(path = "email/admin_notification.html")]
pub struct AdminHtml<'a> {
    pub order: &'a EmailOrderView,
}

#[derive(Template)]
#[template(path = "email/admin_notification.txt")]
pub struct AdminText<'a> {
    pub order: &'a EmailOrderView,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::OrderId;
    use domain::PricingConfig;
    use order_store::{ItemAttributes, NewOrder, OrderItemId, ShippingAddress};
    use uuid::Uuid;

    use super::*;

    fn fixture() -> (OrderRecord, Vec<OrderItemRecord>, PricingBreakdown) {
        let attributes = ItemAttributes {
            width_in: 36.0,
            height_in: 72.0,
            quantity: 2,
            grommets: "every-2-3ft".into(),
            rope_feet: 12.0,
            pole_pockets: true,
            pole_pocket_position: Some("top".into()),
            pole_pocket_size: Some("3".into()),
            line_total_cents: 3333,
            thumbnail_url: Some("https://cdn.banners.test/thumb.png".into()),
            ..ItemAttributes::default()
        };
        let pricing = PricingConfig::default().price(&[attributes.clone()], None);
        let id = OrderId::from_uuid(Uuid::parse_str("0b8f2c1e-5d4a-4e3b-9c2d-1a2b3c4d5e6f").unwrap());
        let new = NewOrder {
            id,
            user_id: None,
            email: "buyer@banners.test".into(),
            customer_name: Some("Pat Doe".into()),
            totals: pricing.to_order_totals(),
            gateway_order_id: None,
            gateway_capture_id: None,
            shipping: ShippingAddress {
                name: Some("Pat Doe".into()),
                street: Some("1 Main St".into()),
                city: Some("Springfield".into()),
                state: Some("IL".into()),
                zip: Some("62701".into()),
                country: "US".into(),
            },
            items: vec![attributes.clone()],
        };
        let order = OrderRecord::from_new(&new, Utc::now());
        let items = vec![OrderItemRecord {
            id: OrderItemId::new(),
            order_id: id,
            position: 0,
            attributes,
            created_at: Utc::now(),
        }];
        (order, items, pricing)
    }

    #[test]
    fn view_formats_money_and_options() {
        let (order, items, pricing) = fixture();
        let view = EmailOrderView::build(&order, &items, &pricing, "Free Next-Day Air", "https://banners.test/");

        assert_eq!(view.number, "3C4D5E6F");
        assert_eq!(view.subtotal, "$33.33");
        assert_eq!(view.discount.as_ref().unwrap().amount, "$1.67");
        assert_eq!(view.tax.as_deref(), Some("$1.90"));
        assert_eq!(view.total, "$33.56");
        assert_eq!(view.shipping, "Free");
        assert_eq!(view.invoice_url, format!("https://banners.test/orders/{}", order.id));
        assert_eq!(
            view.items[0].options,
            "Material: 13oz • Grommets: every-2-3ft • Rope: 12.0 ft • Pole Pockets: top (3 inch)"
        );
        let address = view.address.as_ref().unwrap();
        assert_eq!(address.locality.as_deref(), Some("Springfield, IL, 62701"));
        assert_eq!(address.country, None);
    }

    #[test]
    fn subjects() {
        let (order, items, pricing) = fixture();
        let view = EmailOrderView::build(&order, &items, &pricing, "Free Next-Day Air", "https://banners.test");

        assert_eq!(
            view.confirmation_subject(),
            "Order Confirmation #3C4D5E6F - Banners On The Fly"
        );
        assert_eq!(view.admin_subject(), "New Order #3C4D5E6F - $33.56");
    }

    #[test]
    fn templates_render_order_details() {
        let (order, items, pricing) = fixture();
        let view = EmailOrderView::build(&order, &items, &pricing, "Free Next-Day Air", "https://banners.test");

        let html = ConfirmationHtml { order: &view }.render().unwrap();
        assert!(html.contains("Hello Pat Doe"));
        assert!(html.contains("$33.56"));
        assert!(html.contains("cdn.banners.test"));

        let text = ConfirmationText { order: &view }.render().unwrap();
        assert!(text.contains("Order Number: #3C4D5E6F"));
        assert!(text.contains("Total: $33.56"));

        let admin = AdminText { order: &view }.render().unwrap();
        assert!(admin.contains("buyer@banners.test"));
        let admin_html = AdminHtml { order: &view }.render().unwrap();
        assert!(admin_html.contains("New Order Received"));
    }
}
