//! Blog content cache.
//!
//! A read-through cache for category listings, article lists, article detail
//! and rendered article HTML, written through a [`KeyValueStore`]:
//!
//! - **Keys** are `{prefix}{kind}[:{digest}]`, so each kind can be swept with
//!   one glob.
//! - **TTLs** come from a per-kind table; nothing is written without expiry.
//! - **Invalidation** goes through per-article and per-category index sets
//!   that record the exact keys written, since digests hide the parameters.
//! - **Degraded mode**: without a reachable store every call reports failure
//!   and readers fall back to the content source.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"          # redis | memory | disabled
//! prefix = "blog:"
//! categories_ttl_seconds = 3600
//! articles_ttl_seconds = 1800
//! article_detail_ttl_seconds = 7200
//! article_html_ttl_seconds = 14400
//! ```

mod codec;
mod config;
mod content;
mod error;
mod keys;
mod lock;
mod store;
mod warmup;

pub use codec::{CodecError, decode, encode};
pub use config::{CacheConfig, TtlPolicy};
pub use content::{CacheStats, Cached, ContentCache};
pub use error::{CacheError, CacheResult, Lookup};
pub use keys::{
    CacheKey, ContentKind, DEFAULT_PREFIX, DIGEST_LEN, KeyBuilder, content_digest, derive_key,
    digest_params,
};
pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreError, StoreInfo};
pub use warmup::WarmUpReport;

pub(crate) use content::{METRIC_ERROR, METRIC_HIT, METRIC_INVALIDATED, METRIC_MISS};
pub(crate) use warmup::METRIC_WARM_MS;
