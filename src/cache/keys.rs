//! Cache key derivation.
//!
//! Keys are `"{prefix}{kind}"` for parameterless entries and
//! `"{prefix}{kind}:{digest}"` otherwise, where `digest` is the first eight hex
//! characters of SHA-256 over the parameters joined with `:`. A `:` or `\`
//! inside a parameter is backslash-escaped first, so no two tuples share a
//! joined form. Every key of one kind matches the glob `"{prefix}{kind}:*"`.

use std::fmt;

use sha2::{Digest, Sha256};

/// Namespace every key of this cache lives under.
pub const DEFAULT_PREFIX: &str = "blog:";

/// Width of the parameter digest embedded in keys.
pub const DIGEST_LEN: usize = 8;

const PARAM_SEPARATOR: &str = ":";
const ESCAPE: char = '\\';
const INDEX_SEGMENT: &str = "idx";

/// Class of cached content. Each kind has its own TTL and glob pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Categories,
    Articles,
    ArticleDetail,
    ArticleHtml,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Categories,
        ContentKind::Articles,
        ContentKind::ArticleDetail,
        ContentKind::ArticleHtml,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Categories => "categories",
            ContentKind::Articles => "articles",
            ContentKind::ArticleDetail => "article_detail",
            ContentKind::ArticleHtml => "article_html",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == token)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully derived store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a raw key, e.g. one supplied by an operator or read back from a scan.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Glob that matches every parameterised key of `kind`.
    pub fn pattern_for(prefix: &str, kind: ContentKind) -> String {
        format!("{prefix}{kind}:*")
    }

    /// Content kind encoded in the key, if it belongs to `prefix`.
    pub fn kind(&self, prefix: &str) -> Option<ContentKind> {
        let rest = self.0.strip_prefix(prefix)?;
        let token = rest.split(PARAM_SEPARATOR).next()?;
        ContentKind::from_token(token)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Derive the key for `kind` and an ordered parameter tuple.
pub fn derive_key(prefix: &str, kind: ContentKind, params: &[&str]) -> CacheKey {
    if params.is_empty() {
        CacheKey(format!("{prefix}{kind}"))
    } else {
        CacheKey(format!("{prefix}{kind}:{}", digest_params(params)))
    }
}

/// Short digest of a parameter tuple.
pub fn digest_params(params: &[&str]) -> String {
    let joined = params
        .iter()
        .map(|param| escape_param(param))
        .collect::<Vec<_>>()
        .join(PARAM_SEPARATOR);
    let mut digest = sha256_hex(joined.as_bytes());
    digest.truncate(DIGEST_LEN);
    digest
}

fn escape_param(param: &str) -> String {
    let mut escaped = String::with_capacity(param.len());
    for c in param.chars() {
        if c == ESCAPE || PARAM_SEPARATOR.starts_with(c) {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Full digest of Markdown source, used to version rendered HTML entries.
pub fn content_digest(markdown: &str) -> String {
    sha256_hex(markdown.as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Builds keys under one namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn categories(&self) -> CacheKey {
        derive_key(&self.prefix, ContentKind::Categories, &[])
    }

    pub fn articles(&self, category: &str, search: &str) -> CacheKey {
        derive_key(&self.prefix, ContentKind::Articles, &[category, search])
    }

    pub fn article_detail(&self, article_id: &str) -> CacheKey {
        derive_key(&self.prefix, ContentKind::ArticleDetail, &[article_id])
    }

    pub fn article_html(&self, article_id: &str, content_digest: &str) -> CacheKey {
        derive_key(
            &self.prefix,
            ContentKind::ArticleHtml,
            &[article_id, content_digest],
        )
    }

    /// Index set listing every key written for one article id.
    pub fn article_index(&self, article_id: &str) -> CacheKey {
        CacheKey(format!("{}{INDEX_SEGMENT}:article:{article_id}", self.prefix))
    }

    /// Index set listing every article-list key written for one category.
    pub fn category_index(&self, category: &str) -> CacheKey {
        CacheKey(format!("{}{INDEX_SEGMENT}:category:{category}", self.prefix))
    }

    pub fn pattern(&self, kind: ContentKind) -> String {
        CacheKey::pattern_for(&self.prefix, kind)
    }

    /// Glob covering everything this cache owns, index sets included.
    pub fn namespace_pattern(&self) -> String {
        format!("{}*", self.prefix)
    }

    pub fn index_pattern(&self) -> String {
        format!("{}{INDEX_SEGMENT}:*", self.prefix)
    }

    pub fn category_index_pattern(&self) -> String {
        format!("{}{INDEX_SEGMENT}:category:*", self.prefix)
    }

    pub fn is_index_key(&self, key: &str) -> bool {
        key.strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix(INDEX_SEGMENT))
            .is_some_and(|rest| rest.starts_with(PARAM_SEPARATOR))
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
