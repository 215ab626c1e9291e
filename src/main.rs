use std::{future::IntoFuture, process, sync::Arc};

use blog_cache::{
    application::{blog::BlogService, error::AppError},
    cache::ContentCache,
    config::{self, CacheCommand, Command, Settings},
    content::MarkdownDirectorySource,
    infra::{
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const LOG_TARGET: &str = "blog_cache::server";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    let blog = build_blog_service(&settings).await;

    match command {
        Command::Serve(_) => run_serve(&settings, blog).await,
        Command::Cache(args) => run_cache_command(args.command, &blog).await,
    }
}

async fn build_blog_service(settings: &Settings) -> Arc<BlogService> {
    let cache = ContentCache::open(&settings.cache, &settings.redis).await;
    let source = MarkdownDirectorySource::new(settings.content.root.clone());
    info!(
        target = LOG_TARGET,
        content_root = %settings.content.root.display(),
        cache_available = cache.is_available(),
        "Blog service ready"
    );
    Arc::new(BlogService::new(Arc::new(cache), Arc::new(source)))
}

async fn run_serve(settings: &Settings, blog: Arc<BlogService>) -> Result<(), AppError> {
    if settings.warmup.on_startup {
        let report = blog.warm_up().await;
        if !report.success {
            warn!(
                target = LOG_TARGET,
                message = %report.message,
                "Startup warm-up incomplete; serving from source"
            );
        }
    }

    serve_http(settings, ApiState::new(blog)).await
}

async fn run_cache_command(command: CacheCommand, blog: &BlogService) -> Result<(), AppError> {
    match command {
        CacheCommand::Stats => print_json(&blog.stats().await),
        CacheCommand::Clear => {
            let cleared_keys = blog.clear_cache().await?;
            print_json(&serde_json::json!({ "cleared_keys": cleared_keys }))
        }
        CacheCommand::Warmup => {
            let report = blog.warm_up().await;
            print_json(&report)?;
            if report.success {
                Ok(())
            } else {
                Err(AppError::unexpected(report.message))
            }
        }
        CacheCommand::Invalidate(target) => {
            let removed_keys = match (target.article.as_deref(), target.category.as_deref()) {
                (Some(id), category) => blog.article_changed(id, category).await?,
                (None, Some(category)) => blog.category_changed(category).await?,
                (None, None) => {
                    return Err(AppError::unexpected(
                        "invalidate needs --article or --category",
                    ));
                }
            };
            print_json(&serde_json::json!({ "removed_keys": removed_keys }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(InfraError::from)?;
    println!("{rendered}");
    Ok(())
}

async fn serve_http(settings: &Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(target = LOG_TARGET, addr = %settings.server.addr, "Listening");

    let draining = Arc::new(Notify::new());
    let signal = {
        let draining = draining.clone();
        async move {
            shutdown_signal().await;
            draining.notify_one();
        }
    };

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(signal)
        .into_future();
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server => result.map_err(InfraError::from)?,
        _ = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = LOG_TARGET,
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = LOG_TARGET, "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = LOG_TARGET, error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = LOG_TARGET, error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = LOG_TARGET, "Shutdown signal received");
}
