use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use super::CacheBackend;

/// Command-line arguments for the blog-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "blog-cache",
    version,
    about = "Blog content API with a Redis read-through cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BLOG_CACHE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the blog HTTP API.
    Serve(Box<ServeArgs>),
    /// Inspect or manage the content cache without starting the server.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub store: StoreOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Populate the cache from the content directory before serving.
    #[arg(
        long = "warmup-on-startup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub warmup_on_startup: Option<bool>,
}

/// Overrides shared by every command that opens the cache.
#[derive(Debug, Args, Default, Clone)]
pub struct StoreOverrides {
    /// Override the cache backend.
    #[arg(long = "cache-backend", value_name = "BACKEND", value_enum)]
    pub cache_backend: Option<CacheBackend>,

    /// Override the cache key prefix.
    #[arg(long = "cache-prefix", value_name = "PREFIX")]
    pub cache_prefix: Option<String>,

    /// Override the Redis host.
    #[arg(long = "redis-host", value_name = "HOST")]
    pub redis_host: Option<String>,

    /// Override the Redis port.
    #[arg(long = "redis-port", value_name = "PORT")]
    pub redis_port: Option<u16>,

    /// Override the Redis database index.
    #[arg(long = "redis-db", value_name = "INDEX")]
    pub redis_db: Option<i64>,

    /// Override the directory holding Markdown articles.
    #[arg(long = "content-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub content_root: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub store: StoreOverrides,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum CacheCommand {
    /// Print store metadata, key count and the TTL table as JSON.
    Stats,
    /// Delete every key under the cache prefix.
    Clear,
    /// Populate categories and article lists from the content directory.
    Warmup,
    /// Drop the cached entries of one article or one category.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Default, Clone, PartialEq, Eq)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .multiple(true)
        .args(["article", "category"])
))]
pub struct InvalidateArgs {
    /// Article id, e.g. `rust/ownership`.
    #[arg(long, value_name = "ID")]
    pub article: Option<String>,

    /// Category whose article lists are dropped.
    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,
}
