//! Relational persistence for finalized orders.
//!
//! The [`OrderStore`] trait is the only seam the rest of the workspace
//! talks to. Two implementations share its semantics:
//! - [`PostgresOrderStore`] for production, backed by versioned migrations
//! - [`InMemoryOrderStore`] for tests and local runs

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod schema;
pub mod store;

pub use common::{CartId, EmailEventId, OrderId, OrderItemId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use records::{
    AbandonedCart, EmailEvent, EmailKind, EmailStatus, ItemAttributes, NewAbandonedCart,
    NewEmailEvent, NewOrder, NotificationStatus, ORDER_CURRENCY, OrderItemRecord, OrderRecord,
    OrderStatus, OrderTotals, Profile, RecoveryStatus, ShippingAddress,
};
pub use schema::SchemaLevel;
pub use store::{InsertOutcome, OrderStore, OrderStoreExt};
