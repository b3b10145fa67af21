//! # Global News Digest
//!
//! Collects news from RSS/Atom feeds grouped by topic and region, condenses
//! it with an OpenAI-compatible chat model, and delivers the digest by email.
//!
//! ## Features
//!
//! - Concurrent fetch-with-retry across dozens of independent feeds, with
//!   per-source failure isolation
//! - Deterministic deduplication by link (or title when the link is missing)
//! - Size-based routing: one summarization request for small briefs,
//!   per-category requests plus a highlights request for large ones
//! - An evening "AI × finance" analysis article built from the same feeds
//! - Email delivery as Markdown text plus rendered HTML
//! - An HTTP trigger (`/trigger`) for external schedulers
//!
//! ## Usage
//!
//! ```sh
//! global_news_digest run
//! global_news_digest fetch --categories crypto --json
//! global_news_digest serve
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: every catalog source is fetched with linear backoff
//! 2. **Dedup**: duplicates are dropped per bucket, first occurrence wins
//! 3. **Formatting**: buckets become a sectioned plain-text brief
//! 4. **Summarizing**: the brief is routed to single-pass or chunked mode
//! 5. **Delivery**: the digest is archived (optional) and emailed

use clap::Parser;
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod article;
mod catalog;
mod cli;
mod config;
mod dedup;
mod email;
mod feeds;
mod models;
mod outputs;
mod pipeline;
mod retry;
mod server;
mod summarizer;
mod utils;

use cli::{Cli, Command};
use dedup::dedup;
use models::Category;
use outputs::brief::format_for_summary;
use pipeline::{ArticleJob, DigestJob, build_orchestrator};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // Values already in the environment win over `.env`.
    let _ = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("global_news_digest starting up");

    let Cli { command, settings } = Cli::parse();
    debug!(?command, "Parsed CLI arguments");
    settings.validate()?;
    let settings = Arc::new(settings);
    let cancel = CancellationToken::new();

    match command {
        Command::Run => {
            let report = DigestJob::new(Arc::clone(&settings), cancel).run().await.inspect_err(|e| {
                error!(error = %e, "Digest run failed");
            })?;
            info!(
                subject = %report.subject,
                items = report.items,
                failed_sources = report.failed_sources,
                "Digest run complete"
            );
        }
        Command::Article => {
            let report = ArticleJob::new(Arc::clone(&settings), cancel).run().await.inspect_err(|e| {
                error!(error = %e, "Article run failed");
            })?;
            info!(subject = %report.subject, items = report.items, "Article run complete");
        }
        Command::Fetch { categories, json } => {
            let selected: Option<&[Category]> = (!categories.is_empty()).then_some(categories.as_slice());
            let orchestrator = build_orchestrator(&settings).await?;
            let report = orchestrator.fetch_all(selected, &cancel).await;
            let buckets = dedup(report.buckets);
            if json {
                let out = json!({
                    "total": buckets.total(),
                    "buckets": &buckets,
                    "failures": &report.failures,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", format_for_summary(&buckets));
            }
        }
        Command::Serve => {
            let runner = Arc::new(DigestJob::new(Arc::clone(&settings), cancel.clone()));
            server::serve(runner, settings.trigger_secret(), settings.port, cancel).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(elapsed_secs = elapsed.as_secs_f64(), "global_news_digest finished");
    Ok(())
}
