//! Blog read paths served through the content cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{
    CacheResult, CacheStats, Cached, ContentCache, ContentKind, Lookup, WarmUpReport,
    content_digest,
};
use crate::content::{ArticleFilter, ContentError, ContentSource, extract_headings};
use crate::domain::articles::{Article, ArticleDetail, CategorySummary};

const LOG_TARGET: &str = "blog_cache::application::blog";

#[derive(Debug, Error)]
pub enum BlogError {
    #[error("article `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Content(#[from] ContentError),
}

#[derive(Clone)]
pub struct BlogService {
    cache: Arc<ContentCache>,
    source: Arc<dyn ContentSource>,
}

impl BlogService {
    pub fn new(cache: Arc<ContentCache>, source: Arc<dyn ContentSource>) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Category listing; `clear` drops the cached listing first.
    pub async fn categories(&self, clear: bool) -> Result<Cached<Vec<CategorySummary>>, BlogError> {
        let key = self.cache.keys().categories();
        if clear {
            let _ = self.cache.delete(key.as_str()).await;
        }

        let ttl = self.cache.ttl_policy().for_kind(ContentKind::Categories);
        self.cache
            .read_through(key.as_str(), Some(ttl), || async {
                let categories = self.source.list_categories().await?;
                Ok::<_, BlogError>(CategorySummary::from_map(&categories))
            })
            .await
    }

    /// Article summaries. Lists narrowed by tag are never cached.
    pub async fn articles(&self, filter: &ArticleFilter) -> Result<Cached<Vec<Article>>, BlogError> {
        if !filter.tag_param().is_empty() {
            let value = self.source.list_articles(filter).await?;
            return Ok(Cached {
                value,
                cached: false,
            });
        }

        let category = filter.category_param();
        let search = filter.search_param();
        if let Lookup::Hit(value) = self.cache.get_articles(category, search).await {
            return Ok(Cached {
                value,
                cached: true,
            });
        }

        let value = self.source.list_articles(filter).await?;
        let _ = self.cache.set_articles(&value, category, search).await;
        Ok(Cached {
            value,
            cached: false,
        })
    }

    /// Full article with rendered HTML and its heading outline.
    ///
    /// Rendered HTML is cached separately under the digest of the Markdown
    /// body, so an edited article never serves stale HTML once its detail
    /// entry is gone.
    pub async fn article(&self, id: &str) -> Result<Cached<ArticleDetail>, BlogError> {
        if let Lookup::Hit(value) = self.cache.get_article(id).await {
            debug!(target = LOG_TARGET, id, "article served from cache");
            return Ok(Cached {
                value,
                cached: true,
            });
        }

        let article = self
            .source
            .get_article(id)
            .await?
            .ok_or_else(|| BlogError::NotFound(id.to_string()))?;

        let markdown = article.content.as_deref().unwrap_or_default();
        let digest = content_digest(markdown);
        let html_content = match self.cache.get_article_html(id, &digest).await {
            Lookup::Hit(html) => html,
            Lookup::Miss | Lookup::Failed(_) => {
                let html = self.source.render_to_html(markdown)?;
                let _ = self.cache.set_article_html(id, &html, &digest).await;
                html
            }
        };
        let headings = extract_headings(&html_content).map_err(ContentError::from)?;

        let detail = ArticleDetail {
            article: article.with_metrics(),
            html_content,
            headings,
        };
        let _ = self.cache.set_article(id, &detail).await;
        Ok(Cached {
            value: detail,
            cached: false,
        })
    }

    pub async fn warm_up(&self) -> WarmUpReport {
        let everything = ArticleFilter::default();
        self.cache
            .warm_up(
                || self.source.list_categories(),
                || self.source.list_articles(&everything),
            )
            .await
    }

    /// Drop every cached entry; returns how many were removed.
    pub async fn clear_cache(&self) -> CacheResult<u64> {
        let removed = self.cache.invalidate_all().await?;
        info!(target = LOG_TARGET, removed, "content cache cleared");
        Ok(removed)
    }

    /// Forget one article after it was edited; its lists are dropped too when
    /// it belongs to a category.
    pub async fn article_changed(&self, id: &str, category: Option<&str>) -> CacheResult<u64> {
        let mut removed = self.cache.invalidate_article(id).await?;
        if let Some(category) = category {
            removed += self.cache.invalidate_category(category).await?;
        }
        Ok(removed)
    }

    /// Forget the article lists of one category. An empty name drops every
    /// list and the category listing.
    pub async fn category_changed(&self, category: &str) -> CacheResult<u64> {
        self.cache.invalidate_category(category).await
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}
