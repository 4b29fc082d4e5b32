//! Pricing: discount tiers, promo candidates and the resolver.

mod config;
mod promo;
mod resolver;
mod tiers;

pub use config::{
    DEFAULT_MIN_ORDER_CENTS, DEFAULT_SHIPPING_METHOD_LABEL, DEFAULT_TAX_RATE, PricingConfig,
};
pub use promo::PromoDiscount;
pub use resolver::{
    DiscountSource, PricedLine, PricingBreakdown, PricingOptions, STANDARD_SHIPPING_CENTS,
    resolve, resolve_with_tiers,
};
pub use tiers::{DiscountTier, DiscountTierTable, TierTableError};
