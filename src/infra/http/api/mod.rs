pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    routing::{get, post},
};

pub const API_PREFIX: &str = "/api/v1/blog";

pub fn build_api_router() -> Router<ApiState> {
    let routes = Router::new()
        .route("/categories", get(handlers::list_categories))
        .route("/articles", get(handlers::list_articles))
        .route("/articles/{*id}", get(handlers::get_article))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/clear", post(handlers::clear_cache))
        .route("/cache/invalidate", post(handlers::invalidate_cache))
        .route("/cache/warmup", post(handlers::warm_up_cache));

    Router::new().nest(API_PREFIX, routes)
}
