//! Order service: the persistence engine behind checkout.

use order_store::{NewOrder, OrderStore, SchemaLevel, schema::populated_extended_fields};

use crate::error::DomainError;
use crate::pricing::{PricingBreakdown, PricingConfig, PromoDiscount};

use super::{FinalizeOrder, FinalizedOrder, LineItem, resolve_identity, sanitize_item};

/// Service for finalizing orders.
///
/// Prices the cart, resolves the owner, strips unsafe artwork references
/// and writes the order with its items in one transaction. Totals always
/// come from the resolver, never from the client.
pub struct OrderService<S: OrderStore> {
    store: S,
    pricing: PricingConfig,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S, pricing: PricingConfig) -> Self {
        Self { store, pricing }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Prices a cart without writing anything.
    pub fn quote(&self, items: &[LineItem], promo: Option<PromoDiscount>) -> PricingBreakdown {
        self.pricing.price(items, promo)
    }

    /// Finalizes a cart into a persisted order.
    ///
    /// A cart whose gateway capture already produced an order returns that
    /// order with `created == false`.
    #[tracing::instrument(
        skip(self, cmd),
        fields(order_id = %cmd.order_id, items = cmd.items.len())
    )]
    pub async fn finalize(&self, cmd: FinalizeOrder) -> Result<FinalizedOrder, DomainError> {
        if cmd.items.is_empty() {
            return Err(DomainError::Validation(
                "an order needs at least one item".to_string(),
            ));
        }

        let identity = resolve_identity(&self.store, cmd.user_id, cmd.email.as_deref()).await?;

        let pricing = self.pricing.price(&cmd.items, cmd.promo.clone());

        let mut sanitized_fields = Vec::new();
        let items: Vec<_> = cmd
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let mut attributes = item.into_attributes();
                sanitized_fields.extend(
                    sanitize_item(&mut attributes)
                        .into_iter()
                        .map(|path| format!("items[{index}].{path}")),
                );
                attributes
            })
            .collect();

        if !sanitized_fields.is_empty() {
            tracing::info!(fields = ?sanitized_fields, "cleared unsafe artwork references");
        }

        let dropped_fields: Vec<String> = match self.store.schema_level() {
            SchemaLevel::Full => Vec::new(),
            SchemaLevel::Core => populated_extended_fields(&items)
                .into_iter()
                .map(str::to_string)
                .collect(),
        };
        if !dropped_fields.is_empty() {
            tracing::warn!(fields = ?dropped_fields, "schema is at core level, extended item fields not stored");
        }

        let new_order = NewOrder {
            id: cmd.order_id,
            user_id: identity.user_id,
            email: identity.email.into(),
            customer_name: cmd.customer_name,
            totals: pricing.to_order_totals(),
            gateway_order_id: cmd.gateway_order_id,
            gateway_capture_id: cmd.gateway_capture_id,
            shipping: cmd.shipping,
            items,
        };

        let (order, items, created) = self.store.insert_order(new_order).await?.into_parts();

        if created {
            metrics::counter!("orders_finalized_total").increment(1);
            tracing::info!(order_id = %order.id, total_cents = order.totals.total_cents, "order finalized");
            Ok(FinalizedOrder {
                order,
                items,
                pricing,
                created,
                dropped_fields,
                sanitized_fields,
            })
        } else {
            metrics::counter!("orders_deduplicated_total").increment(1);
            tracing::info!(
                order_id = %order.id,
                capture_id = order.gateway_capture_id.as_deref().unwrap_or_default(),
                "capture already finalized, returning existing order"
            );
            let pricing = self.pricing.price_stored(&order, &items);
            Ok(FinalizedOrder {
                order,
                items,
                pricing,
                created,
                dropped_fields: Vec::new(),
                sanitized_fields: Vec::new(),
            })
        }
    }
}
