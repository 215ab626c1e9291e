use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::blog::BlogError;
use crate::application::error::ErrorReport;
use crate::cache::CacheError;
use crate::content::ContentError;

pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const CONTENT: &str = "content_error";
    pub const CACHE_UNAVAILABLE: &str = "cache_unavailable";
    pub const CACHE: &str = "cache_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            report: ErrorReport::from_message("infra::http::api", status, detail),
        }
    }

    pub fn from_error(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            code,
            message,
            report: ErrorReport::from_error("infra::http::api", status, error),
        }
    }

    pub fn not_found(message: &'static str, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, detail)
    }

    pub fn bad_request(message: &'static str, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BlogError> for ApiError {
    fn from(error: BlogError) -> Self {
        match &error {
            BlogError::NotFound(id) => {
                Self::not_found("Article not found", format!("article `{id}` not found"))
            }
            BlogError::Content(ContentError::NotFound(id)) => {
                Self::not_found("Article not found", format!("article `{id}` not found"))
            }
            BlogError::Content(ContentError::InvalidId(_)) => Self::from_error(
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "Invalid article id",
                &error,
            ),
            BlogError::Content(_) => Self::from_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::CONTENT,
                "Failed to load content",
                &error,
            ),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        match &error {
            CacheError::Unavailable => Self::from_error(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CACHE_UNAVAILABLE,
                "Cache backend unavailable",
                &error,
            ),
            _ => Self::from_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::CACHE,
                "Cache operation failed",
                &error,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: self.message.to_string(),
            code: self.code.to_string(),
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
