//! API error types with HTTP response mapping.
//!
//! Every failure renders as `{ok: false, error, details, hint?}` where
//! `error` is a stable machine-readable code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use order_store::StoreError;
use saga::{NotificationError, PaymentError, SagaError};
use serde::Serialize;
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order finalization error.
    Domain(DomainError),
    /// Checkout saga error.
    Saga(SagaError),
    /// Notification error.
    Notification(NotificationError),
    /// Store error outside a finalization.
    Store(StoreError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
    details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl ErrorBody {
    fn new(error: &'static str, details: impl Into<Value>) -> Self {
        Self {
            ok: false,
            error,
            details: details.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: Option<&'static str>) -> Self {
        self.hint = hint;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::new("NOT_FOUND", msg)),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new("BAD_REQUEST", msg))
            }
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Notification(err) => notification_error_to_response(err),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("PERSISTENCE_ERROR", err.to_string()),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, ErrorBody) {
    let status = match &err {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::IdentityResolution(_) | DomainError::Persistence(_) => {
            tracing::error!(error = %err, "order finalization failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, ErrorBody::new(err.code(), err.to_string()))
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, ErrorBody) {
    match err {
        SagaError::Payment(e) => payment_error_to_response(e),
        SagaError::Domain(e) => domain_error_to_response(e),
        SagaError::AmountMismatch {
            expected,
            captured,
            ref capture,
        } => {
            let details = json!({
                "expected_cents": expected,
                "captured_cents": captured,
                "capture_id": capture.capture_id,
                "gateway_order_id": capture.gateway_order_id,
            });
            (
                StatusCode::CONFLICT,
                ErrorBody::new(err.code(), details).with_hint(err.hint()),
            )
        }
        SagaError::Crashed { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new(err.code(), err.to_string()).with_hint(err.hint()),
        ),
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, ErrorBody) {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let details = err
        .details()
        .cloned()
        .unwrap_or_else(|| Value::String(err.to_string()));
    (
        status,
        ErrorBody::new(err.code(), details).with_hint(err.hint()),
    )
}

fn notification_error_to_response(err: NotificationError) -> (StatusCode, ErrorBody) {
    match &err {
        NotificationError::OrderNotFound(_) => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("ORDER_NOT_FOUND", err.to_string()),
        ),
        NotificationError::ProviderFailed { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("EMAIL_SEND_FAILED", err.to_string()),
        ),
        NotificationError::Store(_) | NotificationError::Template(_) => {
            tracing::error!(error = %err, "notification failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("NOTIFICATION_ERROR", err.to_string()),
            )
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        ApiError::Notification(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
