//! Backing key-value stores.
//!
//! [`ContentCache`](super::ContentCache) only talks to the [`KeyValueStore`]
//! trait. Redis backs production deployments; [`MemoryStore`] backs tests and
//! single-process setups that run without Redis.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error("store operation `{op}` failed: {message}")]
    Command { op: &'static str, message: String },
    #[error("invalid key pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("key `{key}` holds a value of the wrong type")]
    WrongType { key: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn command(op: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            op,
            message: message.into(),
        }
    }
}

/// Server metadata reported by [`KeyValueStore::info`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
}

/// Substrate the content cache is written through.
///
/// Implementations must be safe to share between request tasks. Expiry is
/// enforced by the store: an expired key reads as absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for logs and stats.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), StoreError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every key matching a glob and return how many were removed.
    ///
    /// The count only includes deletions that actually removed a key. Keys
    /// created concurrently with the sweep may or may not survive it.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, StoreError>;

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Remaining lifetime, or `None` when the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Record `member` in the index at `index` until `member_ttl` elapses.
    ///
    /// Members past their deadline are pruned on every add, so an index only
    /// grows with the number of live entries it tracks. The index itself
    /// expires `index_ttl` after the latest add.
    async fn index_add(
        &self,
        index: &str,
        member: &str,
        member_ttl: Duration,
        index_ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Members whose deadline has not passed yet.
    async fn index_members(&self, index: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn info(&self) -> Result<StoreInfo, StoreError>;
}
