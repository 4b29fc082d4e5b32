//! Order notification endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use order_store::OrderStore;
use saga::AdminOutcome;
use serde::{Deserialize, Serialize};

use super::orders::{AppState, parse_order_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub ok: bool,
    /// Provider message id of the confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub idempotent: bool,
    pub admin: AdminOutcome,
}

/// POST /notifications/order: send the order emails once.
#[tracing::instrument(skip(state, req))]
pub async fn order<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let order_id = req
        .order_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("orderId is required".to_string()))
        .and_then(parse_order_id)?;

    let outcome = state.saga.notifications().notify(order_id).await?;
    Ok(Json(NotifyResponse {
        ok: outcome.ok,
        id: outcome.message_id,
        idempotent: outcome.idempotent,
        admin: outcome.admin,
    }))
}
