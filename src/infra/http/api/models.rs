use serde::{Deserialize, Serialize};

/// Success body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            cached: None,
        }
    }

    pub fn cached(data: T, cached: bool) -> Self {
        Self {
            success: true,
            data,
            cached: Some(cached),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CategoriesQuery {
    pub clear_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearedCache {
    pub message: &'static str,
    pub cleared_keys: u64,
}

/// Body of `POST /cache/invalidate`. With an article id the article's entries
/// go, plus its category's lists when a category is given; a category alone
/// drops that category's lists.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvalidateRequest {
    pub article_id: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Invalidated {
    pub removed_keys: u64,
}
