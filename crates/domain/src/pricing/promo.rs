use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::resolver::round_half_up;
use crate::Money;

/// A promotional code offered as a discount candidate.
///
/// A positive `percentage` wins over `amount_cents` when both are given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoDiscount {
    pub code: String,
    /// Percent off, e.g. `20` for 20%.
    #[serde(default, alias = "discountPercentage")]
    pub percentage: Option<Decimal>,
    /// Fixed amount off in cents.
    #[serde(default, alias = "discountAmountCents")]
    pub amount_cents: Option<i64>,
}

/// What a promo is worth against a particular subtotal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PromoCandidate {
    pub amount_cents: i64,
    pub rate: Decimal,
    pub label: String,
}

impl PromoDiscount {
    pub fn percentage(code: impl Into<String>, percentage: Decimal) -> Self {
        Self {
            code: code.into(),
            percentage: Some(percentage),
            amount_cents: None,
        }
    }

    pub fn fixed(code: impl Into<String>, amount_cents: i64) -> Self {
        Self {
            code: code.into(),
            percentage: None,
            amount_cents: Some(amount_cents),
        }
    }

    pub(crate) fn evaluate(&self, subtotal_cents: i64) -> Option<PromoCandidate> {
        let subtotal_cents = subtotal_cents.max(0);

        if let Some(pct) = self.percentage.filter(|p| *p > Decimal::ZERO) {
            let pct = pct.min(dec!(100));
            let rate = pct / dec!(100);
            return Some(PromoCandidate {
                amount_cents: round_half_up(subtotal_cents, rate),
                rate,
                label: format!("{} ({}% off)", self.code, pct.normalize()),
            });
        }

        let fixed = self.amount_cents.filter(|c| *c > 0)?;
        let amount_cents = fixed.min(subtotal_cents);
        let rate = if subtotal_cents > 0 {
            (Decimal::from(amount_cents) / Decimal::from(subtotal_cents)).round_dp(4)
        } else {
            Decimal::ZERO
        };
        Some(PromoCandidate {
            amount_cents,
            rate,
            label: format!("{} ({} off)", self.code, Money::from_cents(amount_cents)),
        })
    }
}
