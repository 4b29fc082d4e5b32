use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AbandonedCart, CartId, EmailEvent, InsertOutcome, NewAbandonedCart, NewEmailEvent, NewOrder,
    NotificationStatus, OrderId, OrderItemId, OrderItemRecord, OrderRecord, OrderStore, Profile,
    RecoveryStatus, Result, SchemaLevel, StoreError, UserId,
    schema::strip_extended,
    store::validate_new_order,
};

#[derive(Default)]
struct State {
    profiles: HashMap<UserId, Profile>,
    orders: HashMap<OrderId, OrderRecord>,
    items: Vec<OrderItemRecord>,
    carts: HashMap<CartId, AbandonedCart>,
    email_events: Vec<EmailEvent>,
}

#[derive(Default)]
struct Faults {
    core_only: AtomicBool,
    fail_item_insert: AtomicBool,
    fail_link_capture: AtomicBool,
    fail_cart_lookup: AtomicBool,
    fail_email_event: AtomicBool,
    fail_mark_confirmation: AtomicBool,
}

/// In-memory order store implementation for testing.
///
/// Mirrors the PostgreSQL store's semantics, including the capture id
/// uniqueness constraint and core-level column stripping. Individual
/// operations can be made to fail to exercise best-effort paths.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Faults>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store at [`SchemaLevel::Full`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches the schema level reported and honored by this store.
    pub fn set_schema_level(&self, level: SchemaLevel) {
        self.faults
            .core_only
            .store(level == SchemaLevel::Core, Ordering::SeqCst);
    }

    /// Makes the item write of every insert fail, rolling back the order.
    pub fn set_fail_on_item_insert(&self, fail: bool) {
        self.faults.fail_item_insert.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_link_capture(&self, fail: bool) {
        self.faults.fail_link_capture.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_cart_lookup(&self, fail: bool) {
        self.faults.fail_cart_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_email_event(&self, fail: bool) {
        self.faults.fail_email_event.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_mark_confirmation(&self, fail: bool) {
        self.faults
            .fail_mark_confirmation
            .store(fail, Ordering::SeqCst);
    }

    /// Seeds a profile.
    pub async fn insert_profile(&self, profile: Profile) {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.id, profile);
    }

    /// Seeds a cart snapshot.
    pub async fn insert_abandoned_cart(&self, cart: NewAbandonedCart) {
        let cart = AbandonedCart::from(cart);
        self.state.write().await.carts.insert(cart.id, cart);
    }

    /// Reads a cart snapshot back.
    pub async fn get_cart(&self, cart_id: CartId) -> Option<AbandonedCart> {
        self.state.read().await.carts.get(&cart_id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn item_count(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn email_event_count(&self) -> usize {
        self.state.read().await.email_events.len()
    }

    fn fails(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("simulated {what} failure")));
        }
        Ok(())
    }

    fn items_for(state: &State, order_id: OrderId) -> Vec<OrderItemRecord> {
        state
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    fn schema_level(&self) -> SchemaLevel {
        if self.faults.core_only.load(Ordering::SeqCst) {
            SchemaLevel::Core
        } else {
            SchemaLevel::Full
        }
    }

    async fn find_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let email = email.trim();
        Ok(self
            .state
            .read()
            .await
            .profiles
            .values()
            .find(|profile| profile.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOutcome> {
        validate_new_order(&order)?;
        let level = self.schema_level();

        let mut state = self.state.write().await;

        // Unique constraint on gateway_capture_id
        if let Some(capture_id) = order.gateway_capture_id.as_deref()
            && let Some(existing) = state
                .orders
                .values()
                .find(|o| o.gateway_capture_id.as_deref() == Some(capture_id))
        {
            let existing = existing.clone();
            let items = Self::items_for(&state, existing.id);
            return Ok(InsertOutcome::Existing {
                order: existing,
                items,
            });
        }

        if state.orders.contains_key(&order.id) {
            return Err(StoreError::InvalidRecord(format!(
                "order {} already exists",
                order.id
            )));
        }

        // Nothing is written before this point, so a failure here leaves no rows
        Self::fails(&self.faults.fail_item_insert, "order item insert")?;

        let now = Utc::now();
        let record = OrderRecord::from_new(&order, now);
        let items: Vec<OrderItemRecord> = order
            .items
            .into_iter()
            .zip(0..)
            .map(|(mut attributes, position)| {
                if level == SchemaLevel::Core {
                    strip_extended(&mut attributes);
                }
                OrderItemRecord {
                    id: OrderItemId::new(),
                    order_id: record.id,
                    position,
                    attributes,
                    created_at: now,
                }
            })
            .collect();

        state.orders.insert(record.id, record.clone());
        state.items.extend(items.iter().cloned());

        Ok(InsertOutcome::Created {
            order: record,
            items,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(Self::items_for(&*self.state.read().await, order_id))
    }

    async fn find_order_by_capture(&self, capture_id: &str) -> Result<Option<OrderRecord>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.gateway_capture_id.as_deref() == Some(capture_id))
            .cloned())
    }

    async fn link_capture(
        &self,
        order_id: OrderId,
        gateway_order_id: &str,
        capture_id: &str,
    ) -> Result<bool> {
        Self::fails(&self.faults.fail_link_capture, "capture link")?;

        let mut state = self.state.write().await;
        if let Some(other) = state
            .orders
            .values()
            .find(|o| o.id != order_id && o.gateway_capture_id.as_deref() == Some(capture_id))
        {
            return Err(StoreError::CaptureAlreadyLinked {
                capture_id: capture_id.to_string(),
                existing: other.id,
            });
        }

        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if let Some(existing) = order.gateway_capture_id.as_deref()
            && existing != capture_id
        {
            return Err(StoreError::OrderAlreadyCaptured {
                order_id,
                existing_capture_id: existing.to_string(),
            });
        }
        order.gateway_order_id = Some(gateway_order_id.to_string());
        order.gateway_capture_id = Some(capture_id.to_string());
        Ok(true)
    }

    async fn claim_confirmation(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if order.confirmation_email_status != NotificationStatus::Unsent
            || order.confirmation_emailed_at.is_some()
        {
            return Ok(false);
        }
        order.confirmation_email_status = NotificationStatus::Sending;
        Ok(true)
    }

    async fn release_confirmation(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if order.confirmation_email_status == NotificationStatus::Sending {
            order.confirmation_email_status = NotificationStatus::Unsent;
        }
        Ok(())
    }

    async fn mark_confirmation_sent(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()> {
        Self::fails(&self.faults.fail_mark_confirmation, "confirmation update")?;

        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.confirmation_email_status = NotificationStatus::Sent;
        order.confirmation_emailed_at = Some(at);
        Ok(())
    }

    async fn mark_admin_notified(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.admin_notification_status = NotificationStatus::Sent;
        order.admin_notification_sent_at = Some(at);
        Ok(())
    }

    async fn find_recoverable_cart(
        &self,
        user_id: Option<UserId>,
        email: &str,
    ) -> Result<Option<AbandonedCart>> {
        Self::fails(&self.faults.fail_cart_lookup, "cart lookup")?;

        let email = email.trim();
        Ok(self
            .state
            .read()
            .await
            .carts
            .values()
            .filter(|cart| cart.recovery_status.is_recoverable())
            .filter(|cart| {
                let user_match = user_id.is_some() && cart.user_id == user_id;
                let email_match = cart
                    .email
                    .as_deref()
                    .is_some_and(|e| !email.is_empty() && e.eq_ignore_ascii_case(email));
                user_match || email_match
            })
            .max_by_key(|cart| cart.last_activity_at)
            .cloned())
    }

    async fn mark_cart_recovered(
        &self,
        cart_id: CartId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.carts.get_mut(&cart_id) {
            Some(cart) if cart.recovery_status.is_recoverable() => {
                cart.recovery_status = RecoveryStatus::Recovered;
                cart.recovered_at = Some(at);
                cart.recovered_order_id = Some(order_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_email_event(&self, event: NewEmailEvent) -> Result<EmailEvent> {
        Self::fails(&self.faults.fail_email_event, "email event append")?;

        let event = EmailEvent::from_new(event, Utc::now());
        self.state.write().await.email_events.push(event.clone());
        Ok(event)
    }

    async fn email_events_for_order(&self, order_id: OrderId) -> Result<Vec<EmailEvent>> {
        Ok(self
            .state
            .read()
            .await
            .email_events
            .iter()
            .filter(|event| event.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::{
        EmailKind, EmailStatus, ItemAttributes, OrderStoreExt, OrderTotals, ShippingAddress,
    };

    fn new_order(capture_id: Option<&str>) -> NewOrder {
        NewOrder {
            id: OrderId::new(),
            user_id: None,
            email: "buyer@banners.test".into(),
            customer_name: Some("Buyer".into()),
            totals: OrderTotals {
                subtotal_cents: 2000,
                total_cents: 2120,
                tax_cents: 120,
                discount_source: "none".into(),
                ..OrderTotals::default()
            },
            gateway_order_id: Some("PP-ORDER".into()),
            gateway_capture_id: capture_id.map(str::to_string),
            shipping: ShippingAddress::default(),
            items: vec![ItemAttributes {
                line_total_cents: 2000,
                file_url: Some("https://cdn.test/art.png".into()),
                text_elements: json!([{ "text": "HELLO" }]),
                ..ItemAttributes::default()
            }],
        }
    }

    fn cart(email: &str, status: RecoveryStatus, minutes_ago: i64) -> NewAbandonedCart {
        NewAbandonedCart {
            id: CartId::new(),
            user_id: None,
            email: Some(email.into()),
            cart_contents: json!([]),
            total_value_cents: 1000,
            recovery_status: status,
            last_activity_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn insert_and_load_order() {
        let store = InMemoryOrderStore::new();
        let outcome = store.insert_order(new_order(Some("CAP-1"))).await.unwrap();
        assert!(outcome.created());

        let (order, items) = store.load_order(outcome.order().id).await.unwrap();
        assert_eq!(order.totals.total_cents, 2120);
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].attributes.file_url.as_deref(),
            Some("https://cdn.test/art.png")
        );
    }

    #[tokio::test]
    async fn duplicate_capture_returns_existing() {
        let store = InMemoryOrderStore::new();
        let first = store.insert_order(new_order(Some("CAP-1"))).await.unwrap();
        let second = store.insert_order(new_order(Some("CAP-1"))).await.unwrap();

        assert!(!second.created());
        assert_eq!(second.order().id, first.order().id);
        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn orders_without_capture_never_collide() {
        let store = InMemoryOrderStore::new();
        store.insert_order(new_order(None)).await.unwrap();
        store.insert_order(new_order(None)).await.unwrap();
        assert_eq!(store.order_count().await, 2);
    }

    #[tokio::test]
    async fn item_failure_leaves_no_rows() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_item_insert(true);

        let result = store.insert_order(new_order(Some("CAP-1"))).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.item_count().await, 0);
    }

    #[tokio::test]
    async fn core_level_strips_extended_fields() {
        let store = InMemoryOrderStore::new();
        store.set_schema_level(SchemaLevel::Core);

        let outcome = store.insert_order(new_order(None)).await.unwrap();
        let (_, items, _) = outcome.into_parts();
        assert_eq!(items[0].attributes.file_url, None);
        assert_eq!(items[0].attributes.text_elements, json!([]));
        assert_eq!(items[0].attributes.line_total_cents, 2000);
    }

    #[tokio::test]
    async fn link_capture_rejects_capture_owned_elsewhere() {
        let store = InMemoryOrderStore::new();
        let owner = store.insert_order(new_order(Some("CAP-1"))).await.unwrap();
        let other = store.insert_order(new_order(None)).await.unwrap();

        let result = store
            .link_capture(other.order().id, "PP-ORDER", "CAP-1")
            .await;
        assert!(matches!(
            result,
            Err(StoreError::CaptureAlreadyLinked { existing, .. }) if existing == owner.order().id
        ));

        // Relinking the owner is a no-op success
        assert!(
            store
                .link_capture(owner.order().id, "PP-ORDER", "CAP-1")
                .await
                .unwrap()
        );
        assert!(
            !store
                .link_capture(OrderId::new(), "PP-ORDER", "CAP-2")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn link_capture_keeps_the_original_capture() {
        let store = InMemoryOrderStore::new();
        let order = store
            .insert_order(new_order(Some("CAP-ORIGINAL")))
            .await
            .unwrap();
        let id = order.order().id;

        let result = store.link_capture(id, "PP-B", "CAP-OTHER").await;
        assert!(matches!(
            result,
            Err(StoreError::OrderAlreadyCaptured { order_id, ref existing_capture_id })
                if order_id == id && existing_capture_id == "CAP-ORIGINAL"
        ));

        let stored = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(stored.gateway_capture_id.as_deref(), Some("CAP-ORIGINAL"));
        assert_eq!(stored.gateway_order_id.as_deref(), Some("PP-ORDER"));
        assert_eq!(
            store
                .find_order_by_capture("CAP-ORIGINAL")
                .await
                .unwrap()
                .map(|o| o.id),
            Some(id)
        );
        assert!(store.find_order_by_capture("CAP-OTHER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirmation_claim_is_exclusive() {
        let store = InMemoryOrderStore::new();
        let id = store.insert_order(new_order(None)).await.unwrap().order().id;

        assert!(store.claim_confirmation(id).await.unwrap());
        assert!(!store.claim_confirmation(id).await.unwrap());

        store.release_confirmation(id).await.unwrap();
        assert!(store.claim_confirmation(id).await.unwrap());

        store.mark_confirmation_sent(id, Utc::now()).await.unwrap();
        store.release_confirmation(id).await.unwrap();
        assert!(!store.claim_confirmation(id).await.unwrap());
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.confirmation_email_status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn most_recent_recoverable_cart_wins() {
        let store = InMemoryOrderStore::new();
        let old = cart("buyer@banners.test", RecoveryStatus::Abandoned, 60);
        let recent = cart("BUYER@banners.test", RecoveryStatus::Active, 5);
        let done = cart("buyer@banners.test", RecoveryStatus::Recovered, 1);
        let recent_id = recent.id;
        for c in [old, recent, done] {
            store.insert_abandoned_cart(c).await;
        }

        let found = store
            .find_recoverable_cart(None, "buyer@banners.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, recent_id);
    }

    #[tokio::test]
    async fn cart_is_recovered_at_most_once() {
        let store = InMemoryOrderStore::new();
        let c = cart("buyer@banners.test", RecoveryStatus::Active, 5);
        let cart_id = c.id;
        store.insert_abandoned_cart(c).await;

        let first = OrderId::new();
        assert!(
            store
                .mark_cart_recovered(cart_id, first, Utc::now())
                .await
                .unwrap()
        );
        assert!(
            !store
                .mark_cart_recovered(cart_id, OrderId::new(), Utc::now())
                .await
                .unwrap()
        );
        let stored = store.get_cart(cart_id).await.unwrap();
        assert_eq!(stored.recovered_order_id, Some(first));
    }

    #[tokio::test]
    async fn email_events_are_appended_per_order() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        for attempt in 1..=2 {
            store
                .append_email_event(NewEmailEvent {
                    order_id,
                    kind: EmailKind::OrderConfirmation,
                    recipient: "buyer@banners.test".into(),
                    status: EmailStatus::Error,
                    provider_message_id: None,
                    error_message: Some("503".into()),
                    attempt,
                })
                .await
                .unwrap();
        }

        let events = store.email_events_for_order(order_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].attempt, 2);
        assert!(
            store
                .email_events_for_order(OrderId::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn profile_lookup_by_email_ignores_case() {
        let store = InMemoryOrderStore::new();
        let profile = Profile {
            id: UserId::new(),
            email: "Jane@Banners.test".into(),
            username: Some("jane".into()),
        };
        store.insert_profile(profile.clone()).await;

        let found = store
            .find_profile_by_email(" jane@banners.test ")
            .await
            .unwrap();
        assert_eq!(found, Some(profile));
    }
}
