//! Shared types for the checkout workspace.

pub mod email;
pub mod types;

pub use email::{Email, EmailError, PLACEHOLDER_GUEST_EMAIL, is_placeholder};
pub use types::{CartId, EmailEventId, OrderId, OrderItemId, UserId};
