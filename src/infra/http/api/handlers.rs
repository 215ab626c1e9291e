use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::content::ArticleFilter;

use super::error::ApiError;
use super::models::{CategoriesQuery, ClearedCache, Envelope, InvalidateRequest, Invalidated};
use super::state::ApiState;

pub async fn list_categories(
    State(state): State<ApiState>,
    Query(query): Query<CategoriesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state.blog.categories(query.clear_cache).await?;
    Ok(Json(Envelope::cached(categories.value, categories.cached)))
}

pub async fn list_articles(
    State(state): State<ApiState>,
    Query(filter): Query<ArticleFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let articles = state.blog.articles(&filter).await?;
    Ok(Json(Envelope::cached(articles.value, articles.cached)))
}

pub async fn get_article(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state.blog.article(id.trim_matches('/')).await?;
    Ok(Json(Envelope::cached(article.value, article.cached)))
}

pub async fn cache_stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(Envelope::ok(state.blog.stats().await))
}

pub async fn clear_cache(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let cleared_keys = state.blog.clear_cache().await?;
    Ok(Json(Envelope::ok(ClearedCache {
        message: "cache cleared",
        cleared_keys,
    })))
}

pub async fn invalidate_cache(
    State(state): State<ApiState>,
    Json(request): Json<InvalidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let removed_keys = match (request.article_id.as_deref(), request.category.as_deref()) {
        (Some(id), category) => state.blog.article_changed(id, category).await?,
        (None, Some(category)) => state.blog.category_changed(category).await?,
        (None, None) => {
            return Err(ApiError::bad_request(
                "Nothing to invalidate",
                "expected `article_id` or `category`",
            ));
        }
    };
    Ok(Json(Envelope::ok(Invalidated { removed_keys })))
}

pub async fn warm_up_cache(State(state): State<ApiState>) -> Response {
    let report = state.blog.warm_up().await;
    if report.success {
        return Json(Envelope::ok(report)).into_response();
    }

    let detail = report.message.clone();
    let body = Envelope {
        success: false,
        data: report,
        cached: None,
    };
    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    ErrorReport::from_message(
        "infra::http::api::warm_up_cache",
        StatusCode::SERVICE_UNAVAILABLE,
        detail,
    )
    .attach(&mut response);
    response
}
