use order_store::{OrderItemRecord, OrderRecord};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::promo::PromoDiscount;
use super::resolver::{DiscountSource, PricedLine, PricingBreakdown, PricingOptions, resolve};

pub const DEFAULT_TAX_RATE: Decimal = dec!(0.06);
pub const DEFAULT_MIN_ORDER_CENTS: i64 = 2000;
pub const DEFAULT_SHIPPING_METHOD_LABEL: &str = "Free Next-Day Air";

/// The single home of the storefront's pricing constants.
///
/// Persistence, capture verification and email display all price through
/// [`PricingConfig::price`], so they cannot disagree on tax or the floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub free_shipping: bool,
    pub min_order_floor_enabled: bool,
    pub min_order_cents: i64,
    pub shipping_method_label: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: DEFAULT_TAX_RATE,
            free_shipping: false,
            min_order_floor_enabled: false,
            min_order_cents: DEFAULT_MIN_ORDER_CENTS,
            shipping_method_label: DEFAULT_SHIPPING_METHOD_LABEL.to_string(),
        }
    }
}

impl PricingConfig {
    /// Resolver options for this configuration.
    pub fn options(&self, promo: Option<PromoDiscount>) -> PricingOptions {
        PricingOptions {
            free_shipping: self.free_shipping,
            min_floor_cents: if self.min_order_floor_enabled {
                self.min_order_cents
            } else {
                0
            },
            promo,
        }
    }

    /// Prices lines under this configuration.
    pub fn price<T: PricedLine>(
        &self,
        items: &[T],
        promo: Option<PromoDiscount>,
    ) -> PricingBreakdown {
        resolve(items, self.tax_rate, &self.options(promo))
    }

    /// Re-prices a stored order from its persisted line totals.
    ///
    /// Promo terms are not stored, so a promo that won at checkout is
    /// replayed as a fixed amount equal to the stored discount, keeping its
    /// original label.
    pub fn price_stored(&self, order: &OrderRecord, items: &[OrderItemRecord]) -> PricingBreakdown {
        let stored_source = DiscountSource::parse(&order.totals.discount_source);
        let promo = (stored_source == DiscountSource::Promo).then(|| {
            let code = order
                .totals
                .discount_label
                .as_deref()
                .and_then(|label| label.split(" (").next())
                .unwrap_or("PROMO");
            PromoDiscount::fixed(code, order.totals.discount_cents)
        });

        let mut breakdown = self.price(items, promo);
        if breakdown.discount_source == DiscountSource::Promo
            && let Some(label) = order.totals.discount_label.clone()
        {
            breakdown.discount_label = Some(label);
        }
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::OrderId;
    use order_store::{ItemAttributes, NewOrder, OrderItemId, ShippingAddress};

    use super::*;

    fn line(cents: i64) -> ItemAttributes {
        ItemAttributes {
            line_total_cents: cents,
            ..ItemAttributes::default()
        }
    }

    #[test]
    fn defaults() {
        let config = PricingConfig::default();
        assert_eq!(config.tax_rate, dec!(0.06));
        assert_eq!(config.min_order_cents, 2000);
        assert_eq!(config.shipping_method_label, "Free Next-Day Air");
        assert!(!config.min_order_floor_enabled);
    }

    #[test]
    fn floor_only_applies_when_enabled() {
        let mut config = PricingConfig::default();
        assert_eq!(config.price(&[line(1500)], None).adjusted_subtotal_cents, 1500);

        config.min_order_floor_enabled = true;
        let breakdown = config.price(&[line(1500)], None);
        assert_eq!(breakdown.adjusted_subtotal_cents, 2000);
        assert_eq!(breakdown.min_order_adjustment_cents, 500);
    }

    fn stored(totals_from: &PricingBreakdown, lines: &[i64]) -> (OrderRecord, Vec<OrderItemRecord>) {
        let new = NewOrder {
            id: OrderId::new(),
            user_id: None,
            email: "a@b.co".into(),
            customer_name: None,
            totals: totals_from.to_order_totals(),
            gateway_order_id: None,
            gateway_capture_id: None,
            shipping: ShippingAddress::default(),
            items: lines.iter().map(|c| line(*c)).collect(),
        };
        let order = OrderRecord::from_new(&new, Utc::now());
        let items = new
            .items
            .into_iter()
            .zip(0..)
            .map(|(attributes, position)| OrderItemRecord {
                id: OrderItemId::new(),
                order_id: order.id,
                position,
                attributes,
                created_at: Utc::now(),
            })
            .collect();
        (order, items)
    }

    #[test]
    fn stored_quantity_order_reprices_identically() {
        let config = PricingConfig::default();
        let items = [line(1500), line(1833)];
        let original = config.price(&items, None);
        let (order, records) = stored(&original, &[1500, 1833]);

        assert_eq!(config.price_stored(&order, &records), original);
    }

    #[test]
    fn stored_promo_keeps_amount_and_label() {
        let config = PricingConfig::default();
        let promo = PromoDiscount::percentage("SAVE10", dec!(10));
        let original = config.price(&[line(5000)], Some(promo));
        assert_eq!(original.discount_cents, 500);
        let (order, records) = stored(&original, &[5000]);

        let replayed = config.price_stored(&order, &records);
        assert_eq!(replayed.discount_cents, 500);
        assert_eq!(replayed.total_cents, original.total_cents);
        assert_eq!(replayed.discount_label.as_deref(), Some("SAVE10 (10% off)"));
    }
}
