//! Order finalization: cart lines, identity, sanitization and persistence.

mod commands;
mod identity;
mod line_item;
mod sanitize;
mod service;
mod value_objects;

pub use commands::{FinalizeOrder, FinalizedOrder};
pub use identity::{ResolvedIdentity, resolve_identity};
pub use line_item::{ItemConfiguration, LineItem, PolePockets};
pub use sanitize::{MAX_REFERENCE_LEN, is_unsafe_reference, sanitize_item};
pub use service::OrderService;
pub use value_objects::Money;
