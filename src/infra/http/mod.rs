//! HTTP surface: the blog JSON API.

pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};

use axum::{Router, middleware as axum_middleware};

/// Assemble the full application router with response logging.
pub fn build_router(state: ApiState) -> Router {
    build_api_router()
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
}
