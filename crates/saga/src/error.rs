//! Saga error types.

use domain::DomainError;
use thiserror::Error;

use crate::capture::CaptureRecord;
use crate::services::payment::PaymentError;

/// Errors that abort a checkout saga.
///
/// Only core steps produce these. Best-effort steps report through
/// [`StepReport`](crate::state::StepReport) instead.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The payment could not be captured.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The captured amount differs from the cart total. No order was written.
    #[error("captured amount {captured:?} does not match the order total of {expected} cents")]
    AmountMismatch {
        expected: i64,
        captured: Option<i64>,
        capture: Box<CaptureRecord>,
    },

    /// The order could not be finalized.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A core step panicked.
    #[error("saga step '{step}' crashed")]
    Crashed { step: &'static str },
}

impl SagaError {
    /// Machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SagaError::Payment(e) => e.code(),
            SagaError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            SagaError::Domain(e) => e.code(),
            SagaError::Crashed { .. } => "FUNCTION_CRASH",
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SagaError::Payment(e) => e.hint(),
            SagaError::AmountMismatch { .. } => {
                Some("The payment was captured but does not match the cart. Review it before refunding.")
            }
            SagaError::Domain(_) => None,
            SagaError::Crashed { .. } => Some("Unexpected failure. Check the server logs."),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
