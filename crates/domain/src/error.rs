//! Domain error types.

use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while finalizing an order.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request cannot be finalized as submitted. Nothing was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable identity could be attached to the order.
    #[error("Identity resolution failed: {0}")]
    IdentityResolution(String),

    /// The order could not be written. Nothing was persisted.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl DomainError {
    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::IdentityResolution(_) => "IDENTITY_RESOLUTION_ERROR",
            DomainError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}
