//! HTTP API for order finalization, payment capture and notifications.
//!
//! Provides the storefront's checkout endpoints with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use saga::{CheckoutSaga, EmailProvider, PaymentGateway, RetryPolicy};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/payments/order", post(routes::payments::open::<S>))
        .route("/payments/capture", post(routes::payments::capture::<S>))
        .route(
            "/notifications/order",
            post(routes::notifications::order::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store, a gateway and an email
/// provider.
pub fn create_state<S: OrderStore + Clone + 'static>(
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    provider: Arc<dyn EmailProvider>,
    config: &Config,
) -> Arc<AppState<S>> {
    let saga = CheckoutSaga::new(
        store.clone(),
        gateway,
        provider,
        config.pricing.clone(),
        config.notifications.clone(),
    )
    .with_retry_policy(RetryPolicy::default());

    Arc::new(AppState {
        saga,
        store,
        await_follow_up: false,
    })
}
