//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CacheArgs, CacheCommand, CliArgs, Command, InvalidateArgs, ServeArgs, ServeOverrides,
    StoreOverrides,
};

use crate::cache::{DEFAULT_PREFIX, TtlPolicy};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "blog-cache";
const ENV_PREFIX: &str = "BLOG_CACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_REDIS_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CONTENT_ROOT: &str = "blog";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub content: ContentSettings,
    pub warmup: WarmupSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Connection parameters for the Redis store. Read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Bound on connecting and on every command.
    pub timeout: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            db: 0,
            password: None,
            timeout: Duration::from_millis(DEFAULT_REDIS_TIMEOUT_MS),
        }
    }
}

/// Which store backs the content cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub prefix: String,
    pub categories_ttl: Duration,
    pub articles_ttl: Duration,
    pub article_detail_ttl: Duration,
    pub article_html_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let ttl = TtlPolicy::default();
        Self {
            backend: CacheBackend::default(),
            prefix: DEFAULT_PREFIX.to_string(),
            categories_ttl: Duration::from_secs(ttl.categories),
            articles_ttl: Duration::from_secs(ttl.articles),
            article_detail_ttl: Duration::from_secs(ttl.article_detail),
            article_html_ttl: Duration::from_secs(ttl.article_html),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WarmupSettings {
    pub on_startup: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Cache(args)) => raw.apply_store_overrides(&args.store),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    redis: RawRedisSettings,
    cache: RawCacheSettings,
    content: RawContentSettings,
    warmup: RawWarmupSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(on_startup) = overrides.warmup_on_startup {
            self.warmup.on_startup = Some(on_startup);
        }

        self.apply_store_overrides(&overrides.store);
    }

    fn apply_store_overrides(&mut self, overrides: &StoreOverrides) {
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = Some(backend);
        }
        if let Some(prefix) = overrides.cache_prefix.as_ref() {
            self.cache.prefix = Some(prefix.clone());
        }
        if let Some(host) = overrides.redis_host.as_ref() {
            self.redis.host = Some(host.clone());
        }
        if let Some(port) = overrides.redis_port {
            self.redis.port = Some(port);
        }
        if let Some(db) = overrides.redis_db {
            self.redis.db = Some(db);
        }
        if let Some(root) = overrides.content_root.as_ref() {
            self.content.root = Some(root.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            redis,
            cache,
            content,
            warmup,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let redis = build_redis_settings(redis)?;
        let cache = build_cache_settings(cache)?;
        let content = build_content_settings(content)?;
        let warmup = WarmupSettings {
            on_startup: warmup.on_startup.unwrap_or(false),
        };

        Ok(Self {
            server,
            logging,
            redis,
            cache,
            content,
            warmup,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let defaults = RedisSettings::default();

    let host = redis
        .host
        .map(|host| host.trim().to_string())
        .unwrap_or(defaults.host);
    if host.is_empty() {
        return Err(LoadError::invalid("redis.host", "host must not be empty"));
    }

    let port = redis.port.unwrap_or(defaults.port);
    if port == 0 {
        return Err(LoadError::invalid(
            "redis.port",
            "port must be greater than zero",
        ));
    }

    let db = redis.db.unwrap_or(defaults.db);
    if db < 0 {
        return Err(LoadError::invalid("redis.db", "must not be negative"));
    }

    let password = redis.password.filter(|value| !value.is_empty());

    let timeout_ms = redis.timeout_ms.unwrap_or(DEFAULT_REDIS_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "redis.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RedisSettings {
        host,
        port,
        db,
        password,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = TtlPolicy::default();

    let prefix = cache.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
    if prefix.is_empty() {
        return Err(LoadError::invalid(
            "cache.prefix",
            "prefix must not be empty",
        ));
    }
    if prefix.contains(['*', '?', '[', ']']) {
        return Err(LoadError::invalid(
            "cache.prefix",
            "prefix must not contain glob characters",
        ));
    }

    Ok(CacheSettings {
        backend: cache.backend.unwrap_or_default(),
        prefix,
        categories_ttl: ttl(
            cache.categories_ttl_seconds,
            defaults.categories,
            "cache.categories_ttl_seconds",
        )?,
        articles_ttl: ttl(
            cache.articles_ttl_seconds,
            defaults.articles,
            "cache.articles_ttl_seconds",
        )?,
        article_detail_ttl: ttl(
            cache.article_detail_ttl_seconds,
            defaults.article_detail,
            "cache.article_detail_ttl_seconds",
        )?,
        article_html_ttl: ttl(
            cache.article_html_ttl_seconds,
            defaults.article_html,
            "cache.article_html_ttl_seconds",
        )?,
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let root = content
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("content.root", "path must not be empty"));
    }
    Ok(ContentSettings { root })
}

fn ttl(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        seconds => Ok(Duration::from_secs(seconds)),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    host: Option<String>,
    port: Option<u16>,
    db: Option<i64>,
    password: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<CacheBackend>,
    prefix: Option<String>,
    categories_ttl_seconds: Option<u64>,
    articles_ttl_seconds: Option<u64>,
    article_detail_ttl_seconds: Option<u64>,
    article_html_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWarmupSettings {
    on_startup: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
