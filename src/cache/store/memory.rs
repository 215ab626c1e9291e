use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use glob::Pattern;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError, StoreInfo};
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store::memory";

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    /// Index members with their deadlines.
    Index(BTreeMap<String, Instant>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process store with per-entry expiry.
///
/// Expiry follows the tokio clock, so tests can move time with
/// `tokio::time::advance`. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the server went away.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Drop a key as though its TTL had elapsed.
    pub fn expire(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "expire").remove(key).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store marked unreachable"))
        } else {
            Ok(())
        }
    }

    fn live_entry(&self, key: &str, op: &'static str) -> Option<Entry> {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, op);
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut entries = rw_write(&self.entries, SOURCE, op);
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        None
    }
}

fn compile(pattern: &str) -> Result<Pattern, StoreError> {
    Pattern::new(pattern).map_err(|err| StoreError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_reachable()?;
        match self.live_entry(key, "get") {
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        let entry = Entry {
            value: Value::Text(value.to_string()),
            expires_at: Some(Instant::now() + ttl),
        };
        rw_write(&self.entries, SOURCE, "set_with_ttl").insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.ensure_reachable()?;
        let now = Instant::now();
        let removed = rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, StoreError> {
        self.ensure_reachable()?;
        let matcher = compile(pattern)?;
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete_matching");
        let matched: Vec<String> = entries
            .keys()
            .filter(|key| matcher.matches(key))
            .cloned()
            .collect();

        let mut removed = 0;
        for key in matched {
            if entries.remove(&key).is_some_and(|entry| entry.is_live(now)) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_reachable()?;
        let matcher = compile(pattern)?;
        let now = Instant::now();
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "scan_keys")
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.ensure_reachable()?;
        let now = Instant::now();
        Ok(self
            .live_entry(key, "ttl")
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    async fn index_add(
        &self,
        index: &str,
        member: &str,
        member_ttl: Duration,
        index_ttl: Duration,
    ) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "index_add");
        let entry = entries.entry(index.to_string()).or_insert_with(|| Entry {
            value: Value::Index(BTreeMap::new()),
            expires_at: None,
        });
        if !entry.is_live(now) {
            entry.value = Value::Index(BTreeMap::new());
        }
        match &mut entry.value {
            Value::Index(members) => {
                members.retain(|_, deadline| *deadline > now);
                members.insert(member.to_string(), now + member_ttl);
            }
            Value::Text(_) => {
                return Err(StoreError::WrongType {
                    key: index.to_string(),
                });
            }
        }
        entry.expires_at = Some(now + index_ttl);
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_reachable()?;
        let now = Instant::now();
        match self.live_entry(index, "index_members") {
            Some(Entry {
                value: Value::Index(members),
                ..
            }) => Ok(members
                .into_iter()
                .filter(|(_, deadline)| *deadline > now)
                .map(|(member, _)| member)
                .collect()),
            Some(_) => Err(StoreError::WrongType {
                key: index.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_reachable()
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        self.ensure_reachable()?;
        Ok(StoreInfo {
            backend: self.backend(),
            ..StoreInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", HOUR).await.expect("set");
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .expect("set");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("k").await.expect("get").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_reports_remaining_lifetime() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", HOUR).await.expect("set");
        tokio::time::advance(Duration::from_secs(600)).await;

        let remaining = store.ttl("k").await.expect("ttl").expect("has ttl");
        assert_eq!(remaining, Duration::from_secs(3000));
        assert!(store.ttl("missing").await.expect("ttl").is_none());
    }

    #[tokio::test]
    async fn delete_matching_counts_only_removed_keys() {
        let store = MemoryStore::new();
        for key in ["blog:a:1", "blog:a:2", "blog:b:1", "other:a:1"] {
            store.set_with_ttl(key, "v", HOUR).await.expect("set");
        }

        assert_eq!(store.delete_matching("blog:a:*").await.expect("sweep"), 2);
        assert_eq!(store.delete_matching("blog:a:*").await.expect("sweep"), 0);
        assert_eq!(
            store.scan_keys("*").await.expect("scan"),
            vec!["blog:b:1".to_string(), "other:a:1".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_not_counted_as_deleted() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("blog:x", "v", Duration::from_secs(1))
            .await
            .expect("set");
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.delete_matching("blog:*").await.expect("sweep"), 0);
        assert!(!store.delete("blog:x").await.expect("delete"));
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected() {
        let store = MemoryStore::new();
        let err = store.delete_matching("blog:[").await.expect_err("bad glob");
        assert!(matches!(err, StoreError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn index_sets_collect_members() {
        let store = MemoryStore::new();
        store.index_add("idx", "k1", HOUR, HOUR).await.expect("add");
        store.index_add("idx", "k2", HOUR, HOUR).await.expect("add");
        store.index_add("idx", "k1", HOUR, HOUR).await.expect("add");

        assert_eq!(
            store.index_members("idx").await.expect("members"),
            vec!["k1".to_string(), "k2".to_string()]
        );
        assert!(matches!(
            store.get("idx").await,
            Err(StoreError::WrongType { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn index_members_expire_with_their_deadline() {
        let store = MemoryStore::new();
        let short = Duration::from_secs(10);
        store.index_add("idx", "old", short, HOUR).await.expect("add");
        tokio::time::advance(Duration::from_secs(5)).await;
        store.index_add("idx", "new", short, HOUR).await.expect("add");

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(
            store.index_members("idx").await.expect("members"),
            vec!["new".to_string()]
        );

        store.index_add("idx", "newest", short, HOUR).await.expect("add");
        let held = match &rw_read(&store.entries, SOURCE, "test")["idx"].value {
            Value::Index(members) => members.len(),
            Value::Text(_) => 0,
        };
        assert_eq!(held, 2, "expired member pruned on add");
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", HOUR).await.expect("set");
        store.set_unreachable(true);

        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());
        assert!(store.delete_matching("*").await.is_err());

        store.set_unreachable(false);
        assert!(store.get("k").await.expect("get").is_some());
    }
}
