//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use order_store::{OrderStore, SchemaLevel};
use serde::Serialize;

use super::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `core` means extended item fields are being dropped on write.
    pub schema: SchemaLevel,
}

/// GET /health: liveness plus the order store's schema level.
pub async fn check<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let schema = state.store.schema_level();
    Json(HealthResponse {
        status: match schema {
            SchemaLevel::Full => "ok",
            SchemaLevel::Core => "degraded",
        },
        schema,
    })
}
