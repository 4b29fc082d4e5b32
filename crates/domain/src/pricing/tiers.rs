//! Quantity discount tiers ("buy more, save more").

use std::sync::LazyLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of the quantity discount schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTier {
    pub min_quantity: i64,
    pub discount_rate: Decimal,
    pub label: String,
}

impl DiscountTier {
    pub fn new(min_quantity: i64, discount_rate: Decimal, label: impl Into<String>) -> Self {
        Self {
            min_quantity,
            discount_rate,
            label: label.into(),
        }
    }
}

/// Reasons a tier table is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierTableError {
    #[error("tier table is empty")]
    Empty,

    #[error("tier thresholds must be strictly ascending (at {min_quantity})")]
    NotAscending { min_quantity: i64 },

    #[error("tier rates must be non-decreasing (at {min_quantity})")]
    RateDecreases { min_quantity: i64 },

    #[error("tier rate {rate} is outside [0, 1]")]
    RateOutOfRange { rate: Decimal },
}

/// An ordered, validated set of discount tiers.
///
/// Thresholds ascend strictly and rates never decrease, so the applicable
/// rate is monotonically non-decreasing in quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountTierTable {
    tiers: Vec<DiscountTier>,
}

static STANDARD: LazyLock<DiscountTierTable> = LazyLock::new(|| DiscountTierTable {
    tiers: vec![
        DiscountTier::new(1, dec!(0.00), "0% OFF"),
        DiscountTier::new(2, dec!(0.05), "5% OFF"),
        DiscountTier::new(3, dec!(0.07), "7% OFF"),
        DiscountTier::new(4, dec!(0.10), "10% OFF"),
        DiscountTier::new(5, dec!(0.13), "13% OFF"),
    ],
});

impl DiscountTierTable {
    /// Builds a table, rejecting schedules that break the ordering rules.
    pub fn new(tiers: Vec<DiscountTier>) -> Result<Self, TierTableError> {
        if tiers.is_empty() {
            return Err(TierTableError::Empty);
        }
        for tier in &tiers {
            if tier.discount_rate < Decimal::ZERO || tier.discount_rate > Decimal::ONE {
                return Err(TierTableError::RateOutOfRange {
                    rate: tier.discount_rate,
                });
            }
        }
        for pair in tiers.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.min_quantity <= prev.min_quantity {
                return Err(TierTableError::NotAscending {
                    min_quantity: next.min_quantity,
                });
            }
            if next.discount_rate < prev.discount_rate {
                return Err(TierTableError::RateDecreases {
                    min_quantity: next.min_quantity,
                });
            }
        }
        Ok(Self { tiers })
    }

    /// The storefront's schedule: 1→0%, 2→5%, 3→7%, 4→10%, 5+→13%.
    pub fn standard() -> &'static DiscountTierTable {
        &STANDARD
    }

    /// The last tier whose threshold is at most `total_quantity`.
    pub fn tier_for(&self, total_quantity: i64) -> Option<&DiscountTier> {
        self.tiers
            .iter()
            .take_while(|tier| tier.min_quantity <= total_quantity)
            .last()
    }

    /// Discount rate for a total quantity; zero when no tier applies.
    pub fn rate_for(&self, total_quantity: i64) -> Decimal {
        self.tier_for(total_quantity)
            .map(|tier| tier.discount_rate)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn tiers(&self) -> &[DiscountTier] {
        &self.tiers
    }
}

impl Default for DiscountTierTable {
    fn default() -> Self {
        Self::standard().clone()
    }
}
