//! HTTP API server for the blind-box marketplace.
//!
//! Exposes checkout, seller fulfillment, promotions and trade negotiation
//! as REST endpoints, with structured logging (tracing) and Prometheus
//! metrics. Callers identify themselves with the `x-account-id` header.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, Seed, SeedError, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Orders
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/direct", post(routes::orders::create_direct::<S>))
        .route("/orders/cart", post(routes::orders::create_from_cart::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route("/orders/{id}/confirm", post(routes::orders::confirm::<S>))
        .route("/orders/{id}/process", post(routes::orders::process::<S>))
        .route(
            "/orders/{id}/ship-complete",
            post(routes::orders::seller_complete::<S>),
        )
        .route("/orders/{id}/complete", post(routes::orders::complete::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/seller-cancel",
            post(routes::orders::seller_cancel::<S>),
        )
        .route(
            "/orders/{id}/refunds/settle",
            post(routes::orders::settle_refunds::<S>),
        )
        // Promotions
        .route("/promotions", post(routes::promotions::create::<S>))
        .route("/promotions/{id}", get(routes::promotions::get::<S>))
        .route(
            "/promotions/{id}/active",
            post(routes::promotions::set_active::<S>),
        )
        // Trades
        .route(
            "/trades",
            get(routes::trades::list::<S>).post(routes::trades::create::<S>),
        )
        .route("/trades/{id}", get(routes::trades::get::<S>))
        .route("/trades/{id}/moderate", post(routes::trades::moderate::<S>))
        .route("/trades/{id}/proposals", post(routes::trades::propose::<S>))
        .route("/proposals/{id}/counter", post(routes::trades::counter::<S>))
        .route("/proposals/{id}/accept", post(routes::trades::accept::<S>))
        .route("/proposals/{id}/reject", post(routes::trades::reject::<S>))
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
