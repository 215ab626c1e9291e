//! Blog articles and the category groupings built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Characters read per minute when estimating reading time.
const READING_CHARS_PER_MINUTE: usize = 250;

/// Articles grouped by category name.
pub type CategoryMap = BTreeMap<String, Vec<Article>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Markdown source; omitted from list payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub reading_time: usize,
    #[serde(default)]
    pub word_count: usize,
}

impl Article {
    /// Copy without the Markdown body, as served in lists.
    pub fn summary(&self) -> Self {
        Self {
            content: None,
            ..self.clone()
        }
    }

    /// Fill `word_count` and `reading_time` from the Markdown body.
    pub fn with_metrics(mut self) -> Self {
        let (reading_time, word_count) = content_metrics(self.content.as_deref());
        self.reading_time = reading_time;
        self.word_count = word_count;
        self
    }
}

/// Reading time in minutes and character count for a Markdown body.
pub fn content_metrics(content: Option<&str>) -> (usize, usize) {
    match content {
        Some(body) if !body.is_empty() => {
            let chars = body.chars().count();
            ((chars / READING_CHARS_PER_MINUTE).max(1), chars)
        }
        _ => (0, 0),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub count: usize,
    pub articles: Vec<Article>,
}

impl CategorySummary {
    pub fn from_map(categories: &CategoryMap) -> Vec<Self> {
        categories
            .iter()
            .map(|(name, articles)| Self {
                name: name.clone(),
                count: articles.len(),
                articles: articles.iter().map(Article::summary).collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub title: String,
    pub anchor: String,
}

/// Article with its rendered body, as served by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub html_content: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
}
