//! The pricing resolver.
//!
//! Turns priced lines into a [`PricingBreakdown`]. It is pure and total:
//! negative inputs clamp to zero, sums saturate, and every amount it
//! returns is a non-negative integer number of cents.

use order_store::{ItemAttributes, OrderItemRecord, OrderTotals};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::promo::PromoDiscount;
use super::tiers::DiscountTierTable;

/// Shipping charged when free shipping is off. No carrier charge exists yet.
pub const STANDARD_SHIPPING_CENTS: i64 = 0;

const NO_STACKING_MESSAGE: &str = "Discounts can't be combined, so we applied the best one.";

/// A line the resolver can price.
pub trait PricedLine {
    fn line_total_cents(&self) -> i64;
    fn quantity(&self) -> i64;
}

impl PricedLine for ItemAttributes {
    fn line_total_cents(&self) -> i64 {
        self.line_total_cents
    }

    fn quantity(&self) -> i64 {
        i64::from(self.quantity)
    }
}

impl PricedLine for OrderItemRecord {
    fn line_total_cents(&self) -> i64 {
        self.attributes.line_total_cents
    }

    fn quantity(&self) -> i64 {
        i64::from(self.attributes.quantity)
    }
}

impl<T: PricedLine> PricedLine for &T {
    fn line_total_cents(&self) -> i64 {
        (**self).line_total_cents()
    }

    fn quantity(&self) -> i64 {
        (**self).quantity()
    }
}

/// Which candidate discount was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    #[default]
    None,
    Quantity,
    Promo,
}

impl DiscountSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountSource::None => "none",
            DiscountSource::Quantity => "quantity",
            DiscountSource::Promo => "promo",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "quantity" => DiscountSource::Quantity,
            "promo" => DiscountSource::Promo,
            _ => DiscountSource::None,
        }
    }
}

/// Inputs to a resolution beyond the lines and tax rate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingOptions {
    pub free_shipping: bool,
    /// Minimum subtotal in cents; zero disables the floor.
    pub min_floor_cents: i64,
    pub promo: Option<PromoDiscount>,
}

/// Every amount a checkout needs, derived from one set of lines.
///
/// `total = raw_subtotal + min_order_adjustment - discount + tax + shipping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub raw_subtotal_cents: i64,
    pub adjusted_subtotal_cents: i64,
    pub min_order_adjustment_cents: i64,
    pub total_quantity: i64,
    pub discount_rate: Decimal,
    pub discount_cents: i64,
    pub discount_source: DiscountSource,
    pub discount_label: Option<String>,
    /// What the quantity tier alone would have taken off.
    pub quantity_discount_cents: i64,
    /// Set when more than one discount was available.
    pub helper_message: Option<String>,
    pub post_discount_subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

impl PricingBreakdown {
    /// Monetary columns as persisted on an order.
    pub fn to_order_totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal_cents: self.raw_subtotal_cents,
            min_order_adjustment_cents: self.min_order_adjustment_cents,
            discount_cents: self.discount_cents,
            discount_label: self.discount_label.clone(),
            discount_source: self.discount_source.as_str().to_string(),
            tax_cents: self.tax_cents,
            shipping_cents: self.shipping_cents,
            total_cents: self.total_cents,
        }
    }
}

/// `cents × rate`, rounded half away from zero, saturating on overflow.
pub(crate) fn round_half_up(cents: i64, rate: Decimal) -> i64 {
    Decimal::from(cents)
        .checked_mul(rate)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64())
        .unwrap_or(if rate.is_sign_negative() { 0 } else { i64::MAX })
}

/// Resolves pricing against the standard tier table.
pub fn resolve<T: PricedLine>(
    items: &[T],
    tax_rate: Decimal,
    options: &PricingOptions,
) -> PricingBreakdown {
    resolve_with_tiers(DiscountTierTable::standard(), items, tax_rate, options)
}

/// Resolves pricing against an explicit tier table.
pub fn resolve_with_tiers<T: PricedLine>(
    tiers: &DiscountTierTable,
    items: &[T],
    tax_rate: Decimal,
    options: &PricingOptions,
) -> PricingBreakdown {
    let raw_subtotal_cents = items
        .iter()
        .map(|item| item.line_total_cents().max(0))
        .fold(0i64, i64::saturating_add);

    let floor = options.min_floor_cents.max(0);
    let adjusted_subtotal_cents = raw_subtotal_cents.max(floor);
    let min_order_adjustment_cents = adjusted_subtotal_cents - raw_subtotal_cents;

    let total_quantity = items
        .iter()
        .map(|item| item.quantity().max(0))
        .fold(0i64, i64::saturating_add);

    let tier_rate = tiers
        .rate_for(total_quantity)
        .clamp(Decimal::ZERO, Decimal::ONE);
    let quantity_discount_cents = round_half_up(adjusted_subtotal_cents, tier_rate);

    let promo = options
        .promo
        .as_ref()
        .and_then(|promo| promo.evaluate(adjusted_subtotal_cents))
        .filter(|candidate| candidate.amount_cents > 0);

    let helper_message = (quantity_discount_cents > 0 && promo.is_some())
        .then(|| NO_STACKING_MESSAGE.to_string());

    let (discount_source, discount_cents, discount_rate, discount_label) = match promo {
        Some(candidate) if candidate.amount_cents > quantity_discount_cents => (
            DiscountSource::Promo,
            candidate.amount_cents,
            candidate.rate,
            Some(candidate.label),
        ),
        _ if quantity_discount_cents > 0 => (
            DiscountSource::Quantity,
            quantity_discount_cents,
            tier_rate,
            Some(format!(
                "Quantity discount ({}% off)",
                (tier_rate * dec!(100)).round()
            )),
        ),
        _ => (DiscountSource::None, 0, Decimal::ZERO, None),
    };

    let discount_cents = discount_cents.min(adjusted_subtotal_cents);
    let post_discount_subtotal_cents = adjusted_subtotal_cents - discount_cents;

    let shipping_cents = if options.free_shipping {
        0
    } else {
        STANDARD_SHIPPING_CENTS
    };

    let tax_cents = round_half_up(post_discount_subtotal_cents, tax_rate.max(Decimal::ZERO));

    let total_cents = post_discount_subtotal_cents
        .saturating_add(tax_cents)
        .saturating_add(shipping_cents);

    PricingBreakdown {
        raw_subtotal_cents,
        adjusted_subtotal_cents,
        min_order_adjustment_cents,
        total_quantity,
        discount_rate,
        discount_cents,
        discount_source,
        discount_label,
        quantity_discount_cents,
        helper_message,
        post_discount_subtotal_cents,
        tax_cents,
        shipping_cents,
        total_cents,
    }
}
