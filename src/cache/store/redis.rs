use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{
    AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult,
};
use time::OffsetDateTime;
use tracing::{debug, info};

use super::{KeyValueStore, StoreError, StoreInfo};
use crate::config::RedisSettings;

const SCAN_BATCH: usize = 200;

/// Added to every index deadline. Keys expire by the server clock in whole
/// seconds while deadlines are scored by this host's clock in milliseconds,
/// so a member must outlive its key by a margin.
const INDEX_DEADLINE_SLACK: Duration = Duration::from_secs(2);

/// Redis-backed store sharing one multiplexed connection across tasks.
///
/// Every command runs under the configured timeout; an elapsed timeout is
/// reported as [`StoreError::Timeout`] so callers can treat it as a miss.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
    endpoint: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Open a connection and verify it with `PING`, all within the timeout.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StoreError> {
        let endpoint = format!("{}:{}/{}", settings.host, settings.port, settings.db);
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(settings.host.clone(), settings.port),
            redis: RedisConnectionInfo {
                db: settings.db,
                password: settings.password.clone(),
                ..RedisConnectionInfo::default()
            },
        };
        let client = Client::open(info).map_err(|err| {
            StoreError::unavailable(format!("invalid redis connection info: {err}"))
        })?;

        let connection = tokio::time::timeout(settings.timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout {
                op: "connect",
                after: settings.timeout,
            })?
            .map_err(|err| {
                StoreError::unavailable(format!("failed to connect to {endpoint}: {err}"))
            })?;

        let store = Self {
            connection,
            timeout: settings.timeout,
            endpoint,
        };
        store.ping().await?;

        info!(
            target = "blog_cache::cache::store",
            endpoint = %store.endpoint,
            "Connected to redis"
        );
        Ok(store)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn run<T, F>(&self, op: &'static str, key: &str, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) if is_wrong_type(&err) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            Ok(Err(err)) if is_connection_error(&err) => Err(StoreError::unavailable(format!(
                "{op} against {}: {err}",
                self.endpoint
            ))),
            Ok(Err(err)) => Err(StoreError::command(op, err.to_string())),
            Err(_) => Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }),
        }
    }

    /// One `SCAN` step; returns the next cursor and the keys in this batch.
    async fn scan_page(
        &self,
        pattern: &str,
        cursor: u64,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let mut conn = self.connection.clone();
        self.run("scan", pattern, async move {
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
        })
        .await
    }
}

fn is_connection_error(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

fn is_wrong_type(err: &redis::RedisError) -> bool {
    err.code() == Some("WRONGTYPE") || err.to_string().contains("WRONGTYPE")
}

fn unix_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Pull `version`, memory and client count out of an `INFO` reply.
fn parse_info(raw: &str) -> StoreInfo {
    let mut info = StoreInfo {
        backend: "redis",
        ..StoreInfo::default()
    };
    for line in raw.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        match field {
            "redis_version" => info.version = Some(value.to_string()),
            "used_memory_human" => info.used_memory_human = Some(value.to_string()),
            "connected_clients" => info.connected_clients = value.parse().ok(),
            _ => {}
        }
    }
    info
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        self.run("get", key, async move { conn.get(key).await })
            .await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let seconds = ttl_seconds(ttl);
        self.run("set_ex", key, async move { conn.set_ex(key, value, seconds).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: u64 = self
            .run("del", key, async move { conn.del(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut cursor = 0;
        let mut removed = 0;
        loop {
            let (next, keys) = self.scan_page(pattern, cursor).await?;
            if !keys.is_empty() {
                let mut conn = self.connection.clone();
                // DEL replies with the number of keys it actually removed, so
                // keys reported twice by SCAN or expired meanwhile count once.
                let deleted: u64 = self
                    .run("del", pattern, async move { conn.del(&keys).await })
                    .await?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(
            target = "blog_cache::cache::store",
            pattern,
            removed,
            "Deleted keys matching pattern"
        );
        Ok(removed)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let (next, keys) = self.scan_page(pattern, cursor).await?;
            found.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection.clone();
        let seconds: i64 = self
            .run("ttl", key, async move { conn.ttl(key).await })
            .await?;
        // -2: missing, -1: no expiry.
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    async fn index_add(
        &self,
        index: &str,
        member: &str,
        member_ttl: Duration,
        index_ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let now = unix_millis();
        let deadline = now
            .saturating_add(duration_millis(member_ttl))
            .saturating_add(duration_millis(INDEX_DEADLINE_SLACK));
        let seconds = i64::try_from(ttl_seconds(index_ttl)).unwrap_or(i64::MAX);
        self.run("zadd", index, async move {
            redis::pipe()
                .atomic()
                .zrembyscore(index, "-inf", now)
                .ignore()
                .zadd(index, member, deadline)
                .ignore()
                .expire(index, seconds)
                .ignore()
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        let after = format!("({}", unix_millis());
        self.run("zrangebyscore", index, async move {
            conn.zrangebyscore(index, after, "+inf").await
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = self
            .run("ping", "", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        let mut conn = self.connection.clone();
        let raw: String = self
            .run("info", "", async move {
                redis::cmd("INFO").query_async(&mut conn).await
            })
            .await?;
        Ok(parse_info(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_info_extracts_known_fields() {
        let raw = "# Server\r\nredis_version:7.2.4\r\nos:Linux\r\n# Memory\r\nused_memory_human:1.02M\r\n# Clients\r\nconnected_clients:3\r\n";
        let info = parse_info(raw);
        assert_eq!(info.backend, "redis");
        assert_eq!(info.version.as_deref(), Some("7.2.4"));
        assert_eq!(info.used_memory_human.as_deref(), Some("1.02M"));
        assert_eq!(info.connected_clients, Some(3));
    }

    #[test]
    fn parse_info_tolerates_missing_fields() {
        let info = parse_info("# Server\r\n");
        assert_eq!(info.version, None);
        assert_eq!(info.connected_clients, None);
    }

    #[test]
    fn index_deadlines_outlive_their_keys() {
        let member_ttl = Duration::from_secs(1800);
        let deadline_span = duration_millis(member_ttl) + duration_millis(INDEX_DEADLINE_SLACK);
        let key_span = i64::try_from(ttl_seconds(member_ttl) * 1000).unwrap_or(i64::MAX);
        assert!(deadline_span > key_span);
        assert!(unix_millis() > 1_600_000_000_000);
    }

    #[test]
    fn ttl_is_at_least_one_second() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(3600)), 3600);
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails_within_timeout() {
        let settings = RedisSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            timeout: Duration::from_millis(300),
            ..RedisSettings::default()
        };
        let started = std::time::Instant::now();
        let err = RedisStore::connect(&settings)
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(
            err,
            StoreError::Unavailable(_) | StoreError::Timeout { .. }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
