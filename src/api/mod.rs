//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use routes::{create_router, AppState};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let api_router =
        create_router().layer(axum::middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(routes::health_check))
        .route("/metrics", get(routes::metrics_handler))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
