use thiserror::Error;

use super::codec::CodecError;
use super::store::StoreError;

pub type CacheResult<T> = Result<T, CacheError>;

/// Why a cache operation did not take effect.
///
/// None of these should reach an end user: reads treat every variant as a
/// miss and fall back to the content source.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache disabled: backing store is unavailable")]
    Unavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Serialization(#[from] CodecError),
    #[error("warm-up producer failed: {0}")]
    Producer(String),
}

impl CacheError {
    pub fn producer(message: impl Into<String>) -> Self {
        Self::Producer(message.into())
    }

    /// Short label for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            CacheError::Unavailable => "unavailable",
            CacheError::Store(StoreError::Unavailable(_)) => "store_unavailable",
            CacheError::Store(StoreError::Timeout { .. }) => "timeout",
            CacheError::Store(_) => "store",
            CacheError::Serialization(_) => "serialization",
            CacheError::Producer(_) => "producer",
        }
    }
}

/// Outcome of a cache read.
#[derive(Debug)]
#[must_use]
pub enum Lookup<T> {
    Hit(T),
    Miss,
    Failed(CacheError),
}

impl<T> Lookup<T> {
    /// Collapse to an option; a failed read counts as a miss.
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Failed(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Lookup::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Hit(value) => Lookup::Hit(f(value)),
            Lookup::Miss => Lookup::Miss,
            Lookup::Failed(err) => Lookup::Failed(err),
        }
    }
}
