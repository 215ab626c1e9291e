//! Read-through cache in front of the content source.
//!
//! Every public operation is total: with the store missing, unreachable, or
//! holding garbage, callers get `Lookup::Miss`/`Lookup::Failed`, an `Err`
//! value, or `available: false`, never a panic. Staleness within a TTL window
//! is accepted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use super::codec;
use super::config::{CacheConfig, TtlPolicy};
use super::error::{CacheError, CacheResult, Lookup};
use super::keys::{CacheKey, ContentKind, KeyBuilder};
use super::store::{KeyValueStore, MemoryStore, RedisStore, StoreInfo};
use crate::config::{CacheBackend, CacheSettings, RedisSettings};
use crate::domain::articles::{Article, ArticleDetail, CategorySummary};

pub(crate) const METRIC_HIT: &str = "blog_cache_hit_total";
pub(crate) const METRIC_MISS: &str = "blog_cache_miss_total";
pub(crate) const METRIC_ERROR: &str = "blog_cache_error_total";
pub(crate) const METRIC_INVALIDATED: &str = "blog_cache_invalidated_total";

const LOG_TARGET: &str = "blog_cache::cache";
const UNKNOWN_KIND: &str = "other";

/// A value together with whether it was served from cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cached<T> {
    pub value: T,
    pub cached: bool,
}

/// Snapshot reported by [`ContentCache::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub available: bool,
    pub prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<u64>,
    pub ttl_table: BTreeMap<&'static str, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct ContentCache {
    store: Option<Arc<dyn KeyValueStore>>,
    keys: KeyBuilder,
    ttl: TtlPolicy,
}

impl fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCache")
            .field("backend", &self.store.as_ref().map(|store| store.backend()))
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ContentCache {
    /// Wrap an existing store handle; `None` yields a disabled cache.
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, config: &CacheConfig) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(config.prefix.clone()),
            ttl: config.ttl,
        }
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self::new(Some(store), config)
    }

    /// A cache whose every operation is a reported no-op.
    pub fn disabled(config: &CacheConfig) -> Self {
        Self::new(None, config)
    }

    /// Connect to Redis, degrading to a disabled cache when that fails.
    pub async fn connect(redis: &RedisSettings, config: &CacheConfig) -> Self {
        match RedisStore::connect(redis).await {
            Ok(store) => Self::with_store(Arc::new(store), config),
            Err(err) => {
                warn!(
                    target = LOG_TARGET,
                    error = %err,
                    host = %redis.host,
                    port = redis.port,
                    "Redis unreachable; caching disabled"
                );
                Self::disabled(config)
            }
        }
    }

    /// Build the cache selected by configuration.
    pub async fn open(settings: &CacheSettings, redis: &RedisSettings) -> Self {
        let config = CacheConfig::from(settings);
        match settings.backend {
            CacheBackend::Redis => Self::connect(redis, &config).await,
            CacheBackend::Memory => {
                info!(target = LOG_TARGET, "Using in-process memory cache");
                Self::with_store(Arc::new(MemoryStore::new()), &config)
            }
            CacheBackend::Disabled => {
                info!(target = LOG_TARGET, "Caching disabled by configuration");
                Self::disabled(&config)
            }
        }
    }

    /// Whether a store handle is present. A present store may still fail calls.
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    fn store(&self) -> CacheResult<&dyn KeyValueStore> {
        self.store.as_deref().ok_or(CacheError::Unavailable)
    }

    fn kind_label(&self, key: &str) -> &'static str {
        CacheKey::raw(key)
            .kind(self.keys.prefix())
            .map_or(UNKNOWN_KIND, ContentKind::as_str)
    }

    fn default_ttl(&self, key: &str) -> Duration {
        CacheKey::raw(key)
            .kind(self.keys.prefix())
            .map_or_else(|| self.ttl.fallback(), |kind| self.ttl.for_kind(kind))
    }

    fn report(&self, op: &'static str, key: &str, err: CacheError) -> CacheError {
        if matches!(err, CacheError::Unavailable) {
            debug!(target = LOG_TARGET, op, key, "Cache disabled; skipping");
            return err;
        }
        counter!(METRIC_ERROR, "op" => op, "reason" => err.reason()).increment(1);
        warn!(
            target = LOG_TARGET,
            op,
            key,
            reason = err.reason(),
            error = %err,
            "Cache operation failed"
        );
        err
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Read and decode a value. Store and decode errors come back as
    /// [`Lookup::Failed`] and should be handled like a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let store = match self.store() {
            Ok(store) => store,
            Err(err) => return Lookup::Failed(self.report("get", key, err)),
        };
        let kind = self.kind_label(key);

        let payload = match store.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                counter!(METRIC_MISS, "kind" => kind).increment(1);
                return Lookup::Miss;
            }
            Err(err) => return Lookup::Failed(self.report("get", key, err.into())),
        };

        match codec::decode(&payload) {
            Ok(value) => {
                counter!(METRIC_HIT, "kind" => kind).increment(1);
                Lookup::Hit(value)
            }
            Err(err) => Lookup::Failed(self.report("get", key, err.into())),
        }
    }

    /// Encode and store a value. `ttl: None` applies the default for the
    /// key's kind, so no write is ever made without an expiry.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let store = self.store().map_err(|err| self.report("set", key, err))?;
        let payload = codec::encode(value).map_err(|err| self.report("set", key, err.into()))?;
        let ttl = ttl.unwrap_or_else(|| self.default_ttl(key));

        store
            .set_with_ttl(key, &payload, ttl)
            .await
            .map_err(|err| self.report("set", key, err.into()))
    }

    /// Remove one key; `Ok(false)` when it was already absent.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let store = self.store().map_err(|err| self.report("delete", key, err))?;
        store
            .delete(key)
            .await
            .map_err(|err| self.report("delete", key, err.into()))
    }

    /// Remove every key matching a glob and return how many were removed.
    pub async fn delete_matching(&self, pattern: &str) -> CacheResult<u64> {
        let store = self
            .store()
            .map_err(|err| self.report("delete_matching", pattern, err))?;
        store
            .delete_matching(pattern)
            .await
            .map_err(|err| self.report("delete_matching", pattern, err.into()))
    }

    /// Serve `key` from cache or compute it with `produce` and store it.
    ///
    /// Cache failures never surface here: a failed read runs the producer and
    /// a failed write is only logged. Producer errors are returned unchanged.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        produce: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Lookup::Hit(value) = self.get(key).await {
            return Ok(Cached {
                value,
                cached: true,
            });
        }

        let value = produce().await?;
        let _ = self.set(key, &value, ttl).await;
        Ok(Cached {
            value,
            cached: false,
        })
    }

    // ========================================================================
    // Domain accessors
    // ========================================================================

    pub async fn get_categories(&self) -> Lookup<Vec<CategorySummary>> {
        self.get(self.keys.categories().as_str()).await
    }

    pub async fn set_categories(&self, categories: &[CategorySummary]) -> CacheResult<()> {
        let ttl = self.ttl.for_kind(ContentKind::Categories);
        self.set(self.keys.categories().as_str(), categories, Some(ttl))
            .await
    }

    pub async fn get_articles(&self, category: &str, search: &str) -> Lookup<Vec<Article>> {
        self.get(self.keys.articles(category, search).as_str())
            .await
    }

    /// Store an article list; lists filtered by category are indexed under it.
    pub async fn set_articles(
        &self,
        articles: &[Article],
        category: &str,
        search: &str,
    ) -> CacheResult<()> {
        let key = self.keys.articles(category, search);
        let ttl = self.ttl.for_kind(ContentKind::Articles);
        if !category.is_empty() {
            self.index(&self.keys.category_index(category), &key, ttl, ttl)
                .await?;
        }
        self.set(key.as_str(), articles, Some(ttl)).await
    }

    pub async fn get_article(&self, article_id: &str) -> Lookup<ArticleDetail> {
        self.get(self.keys.article_detail(article_id).as_str())
            .await
    }

    pub async fn set_article(&self, article_id: &str, detail: &ArticleDetail) -> CacheResult<()> {
        let key = self.keys.article_detail(article_id);
        let ttl = self.ttl.for_kind(ContentKind::ArticleDetail);
        self.index(
            &self.keys.article_index(article_id),
            &key,
            ttl,
            self.article_index_ttl(),
        )
        .await?;
        self.set(key.as_str(), detail, Some(ttl)).await
    }

    pub async fn get_article_html(&self, article_id: &str, content_digest: &str) -> Lookup<String> {
        self.get(self.keys.article_html(article_id, content_digest).as_str())
            .await
    }

    pub async fn set_article_html(
        &self,
        article_id: &str,
        html: &str,
        content_digest: &str,
    ) -> CacheResult<()> {
        let key = self.keys.article_html(article_id, content_digest);
        let ttl = self.ttl.for_kind(ContentKind::ArticleHtml);
        self.index(
            &self.keys.article_index(article_id),
            &key,
            ttl,
            self.article_index_ttl(),
        )
        .await?;
        self.set(key.as_str(), html, Some(ttl)).await
    }

    fn article_index_ttl(&self) -> Duration {
        self.ttl
            .longest(&[ContentKind::ArticleDetail, ContentKind::ArticleHtml])
    }

    /// Record `key` in an index before the entry itself is written, so every
    /// stored entry is reachable from its index. The member lapses with the
    /// entry's own TTL.
    async fn index(
        &self,
        index: &CacheKey,
        key: &CacheKey,
        ttl: Duration,
        index_ttl: Duration,
    ) -> CacheResult<()> {
        let store = self
            .store()
            .map_err(|err| self.report("index", index.as_str(), err))?;
        store
            .index_add(index.as_str(), key.as_str(), ttl, index_ttl)
            .await
            .map_err(|err| self.report("index", index.as_str(), err.into()))
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Drop the detail entry and every rendered HTML variant of one article.
    pub async fn invalidate_article(&self, article_id: &str) -> CacheResult<u64> {
        let detail = self.keys.article_detail(article_id);
        let removed = self
            .delete_indexed(&self.keys.article_index(article_id), Some(detail))
            .await?;
        self.record_invalidation("article", removed);
        Ok(removed)
    }

    /// With a name, drop the article lists filtered by that category. With an
    /// empty name, drop the category listing and every article list.
    pub async fn invalidate_category(&self, category: &str) -> CacheResult<u64> {
        let removed = if category.is_empty() {
            let listing = u64::from(self.delete(self.keys.categories().as_str()).await?);
            let lists = self
                .delete_matching(&self.keys.pattern(ContentKind::Articles))
                .await?;
            self.sweep_bookkeeping(&self.keys.category_index_pattern())
                .await;
            listing + lists
        } else {
            self.delete_indexed(&self.keys.category_index(category), None)
                .await?
        };
        self.record_invalidation("category", removed);
        Ok(removed)
    }

    /// Drop everything under the namespace and return the number of content
    /// entries removed. Index sets are cleared too but not counted.
    pub async fn invalidate_all(&self) -> CacheResult<u64> {
        self.sweep_bookkeeping(&self.keys.index_pattern()).await;
        let removed = self
            .delete_matching(&self.keys.namespace_pattern())
            .await?;
        self.record_invalidation("all", removed);
        info!(target = LOG_TARGET, removed, "Cleared content cache");
        Ok(removed)
    }

    async fn delete_indexed(&self, index: &CacheKey, extra: Option<CacheKey>) -> CacheResult<u64> {
        let store = self
            .store()
            .map_err(|err| self.report("invalidate", index.as_str(), err))?;

        let mut targets: BTreeSet<String> = store
            .index_members(index.as_str())
            .await
            .map_err(|err| self.report("invalidate", index.as_str(), err.into()))?
            .into_iter()
            .collect();
        targets.extend(extra.map(CacheKey::into_string));

        let mut removed = 0;
        for key in &targets {
            let deleted = store.delete(key).await.map_err(|err| {
                warn!(
                    target = LOG_TARGET,
                    index = index.as_str(),
                    removed,
                    "Invalidation interrupted"
                );
                self.report("invalidate", key, err.into())
            })?;
            if deleted {
                removed += 1;
            }
        }

        if let Err(err) = store.delete(index.as_str()).await {
            self.report("invalidate", index.as_str(), err.into());
        }
        Ok(removed)
    }

    async fn sweep_bookkeeping(&self, pattern: &str) {
        if let Ok(store) = self.store()
            && let Err(err) = store.delete_matching(pattern).await
        {
            self.report("invalidate", pattern, err.into());
        }
    }

    fn record_invalidation(&self, scope: &'static str, removed: u64) {
        counter!(METRIC_INVALIDATED, "scope" => scope).increment(removed);
        debug!(target = LOG_TARGET, scope, removed, "Invalidated cache entries");
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            available: false,
            prefix: self.keys.prefix().to_string(),
            key_count: None,
            ttl_table: self.ttl.table(),
            store: None,
            message: None,
        };

        let Ok(store) = self.store() else {
            stats.message = Some("cache backend unavailable".to_string());
            return stats;
        };

        let collected = async {
            let info = store.info().await?;
            let keys = store.scan_keys(&self.keys.namespace_pattern()).await?;
            Ok::<_, super::store::StoreError>((info, keys))
        }
        .await;

        match collected {
            Ok((info, keys)) => {
                let content_keys = keys
                    .iter()
                    .filter(|key| !self.keys.is_index_key(key))
                    .count();
                stats.available = true;
                stats.key_count = Some(content_keys as u64);
                stats.store = Some(info);
            }
            Err(err) => {
                let err = self.report("stats", &self.keys.namespace_pattern(), err.into());
                stats.message = Some(format!("failed to collect cache stats: {err}"));
            }
        }
        stats
    }
}
