use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AbandonedCart, CartId, EmailEvent, NewEmailEvent, NewOrder, OrderId, OrderItemRecord,
    OrderRecord, Profile, Result, SchemaLevel, StoreError, UserId,
};

/// Result of a transactional order insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The order and all its items were written.
    Created {
        order: OrderRecord,
        items: Vec<OrderItemRecord>,
    },
    /// An order with the same gateway capture id already existed; nothing
    /// was written and the stored order is returned instead.
    Existing {
        order: OrderRecord,
        items: Vec<OrderItemRecord>,
    },
}

impl InsertOutcome {
    pub fn created(&self) -> bool {
        matches!(self, InsertOutcome::Created { .. })
    }

    pub fn order(&self) -> &OrderRecord {
        match self {
            InsertOutcome::Created { order, .. } | InsertOutcome::Existing { order, .. } => order,
        }
    }

    pub fn into_parts(self) -> (OrderRecord, Vec<OrderItemRecord>, bool) {
        match self {
            InsertOutcome::Created { order, items } => (order, items, true),
            InsertOutcome::Existing { order, items } => (order, items, false),
        }
    }
}

/// Persistence seam for orders, profiles, cart snapshots and the email
/// audit trail.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Which item columns this store can write.
    fn schema_level(&self) -> SchemaLevel;

    /// Looks up a profile by id.
    async fn find_profile(&self, user_id: UserId) -> Result<Option<Profile>>;

    /// Looks up a profile by email, case-insensitively.
    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>>;

    /// Writes an order and all of its items atomically.
    ///
    /// If `gateway_capture_id` is already recorded on another order, nothing
    /// is written and that order is returned as [`InsertOutcome::Existing`].
    /// At [`SchemaLevel::Core`] extended item fields are not written.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOutcome>;

    /// Retrieves an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Retrieves an order's items in insertion order.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Finds the order carrying a gateway capture id.
    async fn find_order_by_capture(&self, capture_id: &str) -> Result<Option<OrderRecord>>;

    /// Records gateway identifiers on an existing order.
    ///
    /// Returns false if the order does not exist. Relinking the capture the
    /// order already carries succeeds; a different capture fails with
    /// [`StoreError::OrderAlreadyCaptured`] and leaves the order unchanged.
    async fn link_capture(
        &self,
        order_id: OrderId,
        gateway_order_id: &str,
        capture_id: &str,
    ) -> Result<bool>;

    /// Moves the confirmation track from `unsent` to `sending`.
    ///
    /// Returns false if the track was not `unsent`, so at most one caller
    /// holds the claim. A claim that is never released or completed keeps
    /// later callers from sending.
    async fn claim_confirmation(&self, order_id: OrderId) -> Result<bool>;

    /// Moves a claimed confirmation track back to `unsent`.
    async fn release_confirmation(&self, order_id: OrderId) -> Result<()>;

    /// Marks the customer confirmation as sent.
    async fn mark_confirmation_sent(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()>;

    /// Marks the admin notification as sent.
    async fn mark_admin_notified(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()>;

    /// Most recently active recoverable cart matching the user id or email.
    async fn find_recoverable_cart(
        &self,
        user_id: Option<UserId>,
        email: &str,
    ) -> Result<Option<AbandonedCart>>;

    /// Moves a cart to `recovered` if it is still recoverable.
    ///
    /// Returns false if another order already recovered it.
    async fn mark_cart_recovered(
        &self,
        cart_id: CartId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Appends one row to the email audit trail.
    async fn append_email_event(&self, event: NewEmailEvent) -> Result<EmailEvent>;

    /// All audit rows for an order, oldest first.
    async fn email_events_for_order(&self, order_id: OrderId) -> Result<Vec<EmailEvent>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    fn schema_level(&self) -> SchemaLevel {
        (**self).schema_level()
    }

    async fn find_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        (**self).find_profile(user_id).await
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        (**self).find_profile_by_email(email).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOutcome> {
        (**self).insert_order(order).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        (**self).get_order(order_id).await
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        (**self).get_order_items(order_id).await
    }

    async fn find_order_by_capture(&self, capture_id: &str) -> Result<Option<OrderRecord>> {
        (**self).find_order_by_capture(capture_id).await
    }

    async fn link_capture(
        &self,
        order_id: OrderId,
        gateway_order_id: &str,
        capture_id: &str,
    ) -> Result<bool> {
        (**self)
            .link_capture(order_id, gateway_order_id, capture_id)
            .await
    }

    async fn claim_confirmation(&self, order_id: OrderId) -> Result<bool> {
        (**self).claim_confirmation(order_id).await
    }

    async fn release_confirmation(&self, order_id: OrderId) -> Result<()> {
        (**self).release_confirmation(order_id).await
    }

    async fn mark_confirmation_sent(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()> {
        (**self).mark_confirmation_sent(order_id, at).await
    }

    async fn mark_admin_notified(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()> {
        (**self).mark_admin_notified(order_id, at).await
    }

    async fn find_recoverable_cart(
        &self,
        user_id: Option<UserId>,
        email: &str,
    ) -> Result<Option<AbandonedCart>> {
        (**self).find_recoverable_cart(user_id, email).await
    }

    async fn mark_cart_recovered(
        &self,
        cart_id: CartId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        (**self).mark_cart_recovered(cart_id, order_id, at).await
    }

    async fn append_email_event(&self, event: NewEmailEvent) -> Result<EmailEvent> {
        (**self).append_email_event(event).await
    }

    async fn email_events_for_order(&self, order_id: OrderId) -> Result<Vec<EmailEvent>> {
        (**self).email_events_for_order(order_id).await
    }
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order together with its items.
    async fn load_order(&self, order_id: OrderId) -> Result<(OrderRecord, Vec<OrderItemRecord>)> {
        let order = self
            .get_order(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let items = self.get_order_items(order_id).await?;
        Ok((order, items))
    }

    /// Checks whether an order exists.
    async fn order_exists(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.get_order(order_id).await?.is_some())
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Rejects orders the store must never write.
pub(crate) fn validate_new_order(order: &NewOrder) -> Result<()> {
    if order.items.is_empty() {
        return Err(StoreError::InvalidRecord(
            "an order needs at least one item".to_string(),
        ));
    }
    if order.email.trim().is_empty() {
        return Err(StoreError::InvalidRecord(
            "an order needs an email address".to_string(),
        ));
    }
    if common::is_placeholder(&order.email) {
        return Err(StoreError::InvalidRecord(
            "placeholder guest address cannot own an order".to_string(),
        ));
    }
    if order
        .gateway_capture_id
        .as_deref()
        .is_some_and(|id| id.trim().is_empty())
    {
        return Err(StoreError::InvalidRecord(
            "gateway capture id must not be blank".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ItemAttributes, OrderTotals, ShippingAddress};

    fn order(email: &str, items: usize) -> NewOrder {
        NewOrder {
            id: OrderId::new(),
            user_id: None,
            email: email.to_string(),
            customer_name: None,
            totals: OrderTotals::default(),
            gateway_order_id: None,
            gateway_capture_id: None,
            shipping: ShippingAddress::default(),
            items: vec![ItemAttributes::default(); items],
        }
    }

    #[test]
    fn validate_rejects_empty_items() {
        assert!(matches!(
            validate_new_order(&order("a@b.co", 0)),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn validate_rejects_placeholder_email() {
        assert!(validate_new_order(&order("guest@example.com", 1)).is_err());
        assert!(validate_new_order(&order("  ", 1)).is_err());
    }

    #[test]
    fn validate_rejects_blank_capture_id() {
        let mut new = order("a@b.co", 1);
        new.gateway_capture_id = Some(" ".into());
        assert!(validate_new_order(&new).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_order() {
        assert!(validate_new_order(&order("a@b.co", 2)).is_ok());
    }
}
