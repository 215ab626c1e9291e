//! Cache configuration.
//!
//! Holds the key namespace and the per-kind TTL table. Built from the
//! `[cache]` section of `blog-cache.toml`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::keys::{ContentKind, DEFAULT_PREFIX};

// Default lifetimes in seconds
const DEFAULT_CATEGORIES_TTL_SECS: u64 = 3600;
const DEFAULT_ARTICLES_TTL_SECS: u64 = 1800;
const DEFAULT_ARTICLE_DETAIL_TTL_SECS: u64 = 7200;
const DEFAULT_ARTICLE_HTML_TTL_SECS: u64 = 14_400;

/// Time-to-live per content kind, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    pub categories: u64,
    pub articles: u64,
    pub article_detail: u64,
    pub article_html: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES_TTL_SECS,
            articles: DEFAULT_ARTICLES_TTL_SECS,
            article_detail: DEFAULT_ARTICLE_DETAIL_TTL_SECS,
            article_html: DEFAULT_ARTICLE_HTML_TTL_SECS,
        }
    }
}

impl TtlPolicy {
    pub fn seconds(&self, kind: ContentKind) -> u64 {
        match kind {
            ContentKind::Categories => self.categories,
            ContentKind::Articles => self.articles,
            ContentKind::ArticleDetail => self.article_detail,
            ContentKind::ArticleHtml => self.article_html,
        }
    }

    pub fn for_kind(&self, kind: ContentKind) -> Duration {
        Duration::from_secs(self.seconds(kind))
    }

    /// Lifetime used for writes whose key carries no known kind.
    pub fn fallback(&self) -> Duration {
        ContentKind::ALL
            .into_iter()
            .map(|kind| self.for_kind(kind))
            .min()
            .unwrap_or(Duration::from_secs(DEFAULT_ARTICLES_TTL_SECS))
    }

    /// Longest lifetime among `kinds`, used for index sets spanning them.
    pub fn longest(&self, kinds: &[ContentKind]) -> Duration {
        kinds
            .iter()
            .map(|kind| self.for_kind(*kind))
            .max()
            .unwrap_or_else(|| self.fallback())
    }

    /// Token → seconds, as reported by cache stats.
    pub fn table(&self) -> BTreeMap<&'static str, u64> {
        ContentKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), self.seconds(kind)))
            .collect()
    }
}

/// Cache configuration from `blog-cache.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace prefix for every key this cache writes.
    pub prefix: String,
    /// Per-kind lifetimes.
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            ttl: TtlPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            prefix: settings.prefix.clone(),
            ttl: TtlPolicy {
                categories: settings.categories_ttl.as_secs(),
                articles: settings.articles_ttl.as_secs(),
                article_detail: settings.article_detail_ttl.as_secs(),
                article_html: settings.article_html_ttl.as_secs(),
            },
        }
    }
}
