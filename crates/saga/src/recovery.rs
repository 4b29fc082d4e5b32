//! Abandoned cart recovery.

use chrono::Utc;
use common::{CartId, OrderId, UserId};
use order_store::OrderStore;
use serde::Serialize;

/// What the matcher did for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered { cart_id: CartId },
    /// A matching cart was recovered by another order first.
    AlreadyRecovered { cart_id: CartId },
    NoMatch,
    Failed { error: String },
}

/// Marks the buyer's most recent open cart as recovered by an order.
pub struct AbandonedCartMatcher<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> AbandonedCartMatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Never fails; errors come back as [`RecoveryOutcome::Failed`].
    #[tracing::instrument(skip(self))]
    pub async fn try_recover(
        &self,
        user_id: Option<UserId>,
        email: &str,
        order_id: OrderId,
    ) -> RecoveryOutcome {
        let cart = match self.store.find_recoverable_cart(user_id, email).await {
            Ok(Some(cart)) => cart,
            Ok(None) => return RecoveryOutcome::NoMatch,
            Err(e) => {
                tracing::warn!(error = %e, "abandoned cart lookup failed");
                return RecoveryOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        match self
            .store
            .mark_cart_recovered(cart.id, order_id, Utc::now())
            .await
        {
            Ok(true) => {
                metrics::counter!("abandoned_carts_recovered_total").increment(1);
                tracing::info!(cart_id = %cart.id, "abandoned cart recovered");
                RecoveryOutcome::Recovered { cart_id: cart.id }
            }
            Ok(false) => RecoveryOutcome::AlreadyRecovered { cart_id: cart.id },
            Err(e) => {
                tracing::warn!(cart_id = %cart.id, error = %e, "failed to mark cart recovered");
                RecoveryOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
