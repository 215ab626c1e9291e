//! Proactive population of the listing caches.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use tracing::{info, warn};

use super::content::ContentCache;
use super::error::CacheError;
use crate::domain::articles::{Article, CategoryMap, CategorySummary};

pub(crate) const METRIC_WARM_MS: &str = "blog_cache_warm_ms";

const LOG_TARGET: &str = "blog_cache::cache::warmup";

/// Outcome of [`ContentCache::warm_up`]. Never an error: failures are reported
/// through `success` and `message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmUpReport {
    pub success: bool,
    pub message: String,
    pub duration_seconds: f64,
    pub categories_count: usize,
    pub articles_count: usize,
    /// Cache writes that did not take effect.
    pub failed_writes: usize,
}

impl ContentCache {
    /// Fill the categories entry, the unfiltered article list, and one list
    /// per category, in that order.
    ///
    /// A failing producer stops the run; entries already written stay valid.
    pub async fn warm_up<FC, FCFut, FA, FAFut, E>(
        &self,
        fetch_categories: FC,
        fetch_all_articles: FA,
    ) -> WarmUpReport
    where
        FC: FnOnce() -> FCFut,
        FCFut: Future<Output = Result<CategoryMap, E>>,
        FA: FnOnce() -> FAFut,
        FAFut: Future<Output = Result<Vec<Article>, E>>,
        E: Display,
    {
        let started = Instant::now();
        info!(target = LOG_TARGET, "warming content cache");

        let mut report = WarmUpReport {
            success: false,
            message: String::new(),
            duration_seconds: 0.0,
            categories_count: 0,
            articles_count: 0,
            failed_writes: 0,
        };

        if !self.is_available() {
            report.message = CacheError::Unavailable.to_string();
            return finish(report, started);
        }

        let categories = match fetch_categories().await {
            Ok(categories) => categories,
            Err(err) => {
                report.message = CacheError::producer(format!("categories: {err}")).to_string();
                return finish(report, started);
            }
        };
        report.categories_count = categories.len();

        let summaries = CategorySummary::from_map(&categories);
        if self.set_categories(&summaries).await.is_err() {
            report.failed_writes += 1;
        }

        let articles = match fetch_all_articles().await {
            Ok(articles) => articles,
            Err(err) => {
                report.message = CacheError::producer(format!("articles: {err}")).to_string();
                return finish(report, started);
            }
        };
        report.articles_count = articles.len();

        let listing: Vec<Article> = articles.iter().map(Article::summary).collect();
        if self.set_articles(&listing, "", "").await.is_err() {
            report.failed_writes += 1;
        }

        for (name, members) in &categories {
            let listing: Vec<Article> = members.iter().map(Article::summary).collect();
            if self.set_articles(&listing, name, "").await.is_err() {
                report.failed_writes += 1;
            }
        }

        if report.failed_writes == 0 {
            report.success = true;
            report.message = "cache warm-up complete".to_string();
        } else {
            report.message = format!(
                "cache warm-up finished with {} failed writes",
                report.failed_writes
            );
        }
        finish(report, started)
    }
}

fn finish(mut report: WarmUpReport, started: Instant) -> WarmUpReport {
    let elapsed = started.elapsed();
    report.duration_seconds = elapsed.as_secs_f64();
    histogram!(METRIC_WARM_MS).record(elapsed.as_secs_f64() * 1000.0);

    if report.success {
        info!(
            target = LOG_TARGET,
            categories = report.categories_count,
            articles = report.articles_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "cache warm completed"
        );
    } else {
        warn!(
            target = LOG_TARGET,
            message = %report.message,
            failed_writes = report.failed_writes,
            "cache warm failed"
        );
    }
    report
}
