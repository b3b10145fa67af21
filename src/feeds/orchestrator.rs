//! Concurrent fetching of every catalog source into [`Buckets`].
//!
//! Tasks run through a `buffer_unordered` stream so at most `workers` fetches
//! are in flight. The stream consumer is the only code that touches the
//! buckets; tasks just hand back `(task, outcome)` pairs.

use super::fetcher::{FeedFetcher, FeedTransport, FetchOutcome};
use crate::catalog::{Catalog, selected_categories};
use crate::models::{Buckets, Category, FetchTask, Region};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A source that produced nothing because its fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub category: Category,
    pub region: Region,
    pub source: String,
    pub reason: String,
    pub attempts: u32,
}

/// Everything one fetch pass produced.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub buckets: Buckets,
    pub failures: Vec<SourceFailure>,
}

impl FetchReport {
    pub fn total(&self) -> usize {
        self.buckets.total()
    }
}

/// Runs a [`FeedFetcher`] over every source of a [`Catalog`].
#[derive(Debug)]
pub struct Orchestrator<T> {
    catalog: Catalog,
    fetcher: FeedFetcher<T>,
    workers: usize,
    per_source: usize,
}

impl<T: FeedTransport> Orchestrator<T> {
    pub fn new(catalog: Catalog, fetcher: FeedFetcher<T>, workers: usize, per_source: usize) -> Self {
        Self {
            catalog,
            fetcher,
            workers: workers.max(1),
            per_source,
        }
    }

    #[cfg(test)]
    pub(crate) fn fetcher_ref(&self) -> &FeedFetcher<T> {
        &self.fetcher
    }

    /// Fetch every source of the selected categories (all when `None`).
    ///
    /// Returns once every task has finished. Failed or panicking tasks
    /// contribute no items and are listed in [`FetchReport::failures`].
    #[instrument(level = "info", skip_all, fields(workers = self.workers))]
    pub async fn fetch_all(&self, selected: Option<&[Category]>, cancel: &CancellationToken) -> FetchReport {
        let started = Instant::now();
        let categories = selected_categories(selected);
        let tasks = self.catalog.tasks(Some(&categories));
        info!(tasks = tasks.len(), categories = categories.len(), "Fetching feeds");

        let mut buckets = Buckets::new(&categories);
        let mut failures = Vec::new();

        let mut results = stream::iter(tasks)
            .map(|task| async move {
                let outcome = AssertUnwindSafe(self.fetcher.fetch(&task.url, &task.source_name, self.per_source, cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        error!(source = %task.source_name, %reason, "Fetch task panicked");
                        FetchOutcome::Failed {
                            reason: format!("panicked: {reason}"),
                            attempts: 0,
                        }
                    });
                (task, outcome)
            })
            .buffer_unordered(self.workers);

        while let Some((task, outcome)) = results.next().await {
            let FetchTask {
                category,
                region,
                source_name,
                ..
            } = task;
            let items = match outcome {
                FetchOutcome::Fetched(items) => {
                    debug!(source = %source_name, %category, %region, count = items.len(), "Source fetched");
                    items
                }
                FetchOutcome::Failed { reason, attempts } => {
                    failures.push(SourceFailure {
                        category,
                        region,
                        source: source_name,
                        reason,
                        attempts,
                    });
                    Vec::new()
                }
            };
            if let Err(e) = buckets.extend(category, region, items) {
                error!(error = %e, "Dropping items for an unknown bucket");
            }
        }

        let report = FetchReport { buckets, failures };
        log_stats(&report);
        info!(
            total = report.total(),
            failed_sources = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Feed fetch finished"
        );
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Log per-category and per-region counts plus any failed sources.
pub fn log_stats(report: &FetchReport) {
    for category in report.buckets.categories() {
        let per_region: Vec<String> = category
            .regions()
            .iter()
            .map(|&region| format!("{}={}", region, report.buckets.items(category, region).len()))
            .collect();
        info!(
            %category,
            total = report.buckets.category_len(category),
            regions = %per_region.join(" "),
            "Category stats"
        );
    }
    for failure in &report.failures {
        warn!(
            source = %failure.source,
            category = %failure.category,
            region = %failure.region,
            attempts = failure.attempts,
            reason = %failure.reason,
            "Source failed"
        );
    }
}
