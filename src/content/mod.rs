//! Where articles come from and how their Markdown becomes HTML.
//!
//! The cache never reads content itself; [`ContentSource`] is the collaborator
//! that the blog service and warm-up fall back to on a miss.

mod directory;
mod render;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use directory::MarkdownDirectorySource;
pub use render::{MarkdownRenderer, RenderError, extract_headings, renderer};

use crate::domain::articles::{Article, CategoryMap};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("article `{0}` not found")]
    NotFound(String),
    #[error("invalid article id `{0}`")]
    InvalidId(String),
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ContentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Narrowing applied to article lists. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub tag: Option<String>,
}

impl ArticleFilter {
    pub fn category(name: impl Into<String>) -> Self {
        Self {
            category: Some(name.into()),
            ..Self::default()
        }
    }

    /// Category parameter as used in cache keys; absent reads as `""`.
    pub fn category_param(&self) -> &str {
        non_blank(self.category.as_deref())
    }

    pub fn search_param(&self) -> &str {
        non_blank(self.search.as_deref())
    }

    pub fn tag_param(&self) -> &str {
        non_blank(self.tag.as_deref())
    }

    pub fn matches(&self, article: &Article) -> bool {
        let category = self.category_param();
        if !category.is_empty() && article.category.as_deref() != Some(category) {
            return false;
        }

        let tag = self.tag_param();
        if !tag.is_empty() && !article.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }

        let search = self.search_param();
        if !search.is_empty() {
            let needle = search.to_lowercase();
            let hit = article.title.to_lowercase().contains(&needle)
                || article.description.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }

        true
    }
}

fn non_blank(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or_default()
}

/// Provider of blog content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Every category with its articles, content omitted.
    async fn list_categories(&self) -> Result<CategoryMap, ContentError>;

    /// Article summaries matching `filter`, newest first.
    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, ContentError>;

    /// One article including its Markdown body, or `None` when unknown.
    async fn get_article(&self, id: &str) -> Result<Option<Article>, ContentError>;

    fn render_to_html(&self, markdown: &str) -> Result<String, ContentError> {
        Ok(renderer().render(markdown)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, category: Option<&str>, tags: &[&str]) -> Article {
        Article {
            id: title.to_lowercase(),
            title: title.to_string(),
            description: "Notes on ownership".to_string(),
            category: category.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            content: None,
            created_at: None,
            updated_at: None,
            reading_time: 0,
            word_count: 0,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ArticleFilter::default();
        assert!(filter.matches(&article("Any", None, &[])));
        assert_eq!(filter.category_param(), "");
    }

    #[test]
    fn category_must_match_exactly() {
        let filter = ArticleFilter::category("Rust");
        assert!(filter.matches(&article("Borrowing", Some("Rust"), &[])));
        assert!(!filter.matches(&article("Goroutines", Some("Go"), &[])));
        assert!(!filter.matches(&article("Loose", None, &[])));
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let filter = ArticleFilter {
            search: Some("OWNERSHIP".to_string()),
            ..ArticleFilter::default()
        };
        assert!(filter.matches(&article("Borrowing", None, &[])));

        let filter = ArticleFilter {
            search: Some("borrow".to_string()),
            ..ArticleFilter::default()
        };
        assert!(filter.matches(&article("Borrowing", None, &[])));
    }

    #[test]
    fn tag_filter_ignores_case() {
        let filter = ArticleFilter {
            tag: Some("async".to_string()),
            ..ArticleFilter::default()
        };
        assert!(filter.matches(&article("Tokio", None, &["Async"])));
        assert!(!filter.matches(&article("Tokio", None, &["sync"])));
    }

    #[test]
    fn blank_parameters_are_ignored() {
        let filter = ArticleFilter {
            category: Some("  ".to_string()),
            ..ArticleFilter::default()
        };
        assert_eq!(filter.category_param(), "");
        assert!(filter.matches(&article("Any", Some("Go"), &[])));
    }
}
