use thiserror::Error;

use crate::OrderId;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A gateway capture id is already linked to a different order.
    #[error("Capture {capture_id} is already linked to order {existing}")]
    CaptureAlreadyLinked {
        capture_id: String,
        existing: OrderId,
    },

    /// The order already carries a different gateway capture.
    #[error("Order {order_id} already carries capture {existing_capture_id}")]
    OrderAlreadyCaptured {
        order_id: OrderId,
        existing_capture_id: String,
    },

    /// The record handed to the store is not writable as-is.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A stored value could not be mapped back into a record.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// The backend refused or failed the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
