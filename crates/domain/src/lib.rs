//! Domain layer for order finalization.
//!
//! This crate provides:
//! - The pricing resolver and the discount tier table
//! - Cart line items and their normalization into stored item attributes
//! - Identity resolution and artwork reference sanitization
//! - `OrderService`, which persists a priced cart as an order

pub mod error;
pub mod order;
pub mod pricing;

pub use error::DomainError;
pub use order::{
    FinalizeOrder, FinalizedOrder, ItemConfiguration, LineItem, Money, OrderService, PolePockets,
    ResolvedIdentity, resolve_identity,
};
pub use pricing::{
    DiscountSource, DiscountTier, DiscountTierTable, PricedLine, PricingBreakdown, PricingConfig,
    PricingOptions, PromoDiscount,
};
