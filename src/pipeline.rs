//! The "run once" flows.
//!
//! - [`run_once`]: fetch → dedup → abort when empty → format → summarize →
//!   archive → email.
//! - [`run_article`]: fetch finance and tech → dedup → flatten → write the
//!   evening article → email.
//!
//! Both take their collaborators as trait implementations so tests can drive
//! them with in-memory fakes. [`DigestJob`] and [`ArticleJob`] wire the real
//! HTTP, LLM and SMTP implementations from [`Settings`].

use crate::api::{ChatClient, Complete, LlmError, RetryAsk};
use crate::article::{ArticleError, ArticleWriter};
use crate::catalog::{Catalog, CatalogError};
use crate::config::{LLM_BACKOFF_STEP, Settings};
use crate::dedup::dedup;
use crate::email::{MailError, Mailer, SmtpMailer, article_subject, digest_subject};
use crate::feeds::{FeedFetcher, FeedTransport, FetchError, HttpTransport, Orchestrator};
use crate::models::Category;
use crate::outputs::brief::format_for_summary;
use crate::outputs::candidates::flatten_candidates;
use crate::outputs::json::{RunArchive, write_archive};
use crate::summarizer::{Route, SectionKey, SummaryError, Summarizer};
use chrono::Local;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Categories the evening article is built from.
pub const ARTICLE_CATEGORIES: [Category; 2] = [Category::Finance, Category::Tech];

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no news fetched ({failed_sources} source(s) failed)")]
    NoNews { failed_sources: usize },
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    Article(#[from] ArticleError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub subject: String,
    pub items: usize,
    pub failed_sources: usize,
    pub route: Option<Route>,
    pub degraded: Vec<SectionKey>,
}

/// Fetch, summarize and deliver the daily digest once.
///
/// # Errors
///
/// [`RunError::NoNews`] when every source came back empty (the model is not
/// called); summarization and delivery failures otherwise.
#[instrument(level = "info", skip_all)]
pub async fn run_once<T, C, M>(
    orchestrator: &Orchestrator<T>,
    summarizer: &Summarizer<C>,
    mailer: &M,
    archive_dir: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<RunReport, RunError>
where
    T: FeedTransport,
    C: Complete,
    M: Mailer,
{
    let t0 = Instant::now();
    let report = orchestrator.fetch_all(None, cancel).await;
    let failures = report.failures;
    let buckets = dedup(report.buckets);

    let items = buckets.total();
    if items == 0 {
        warn!(failed_sources = failures.len(), "No news fetched; aborting run");
        return Err(RunError::NoNews {
            failed_sources: failures.len(),
        });
    }
    info!(items, failed_sources = failures.len(), "News collected");

    let brief = format_for_summary(&buckets);
    let digest = summarizer.summarize(&brief).await?;

    let now = Local::now();
    if let Some(dir) = archive_dir {
        let record = RunArchive {
            generated_at: now.to_rfc3339(),
            route: digest.route,
            degraded: &digest.degraded,
            failures: &failures,
            buckets: &buckets,
            digest: &digest.text,
        };
        if let Err(e) = write_archive(&record, dir, now).await {
            warn!(error = %e, "Archive write failed; continuing");
        }
    }

    let subject = digest_subject(now.date_naive(), digest.is_degraded());
    mailer.send(&subject, &digest.text).await?;

    info!(
        %subject,
        route = %digest.route,
        elapsed_ms_total = t0.elapsed().as_millis() as u64,
        "Digest delivered"
    );
    Ok(RunReport {
        subject,
        items,
        failed_sources: failures.len(),
        route: Some(digest.route),
        degraded: digest.degraded,
    })
}

/// Fetch finance and tech news, write the evening article and deliver it.
#[instrument(level = "info", skip_all)]
pub async fn run_article<T, C, M>(
    orchestrator: &Orchestrator<T>,
    writer: &ArticleWriter<C>,
    mailer: &M,
    cancel: &CancellationToken,
) -> Result<RunReport, RunError>
where
    T: FeedTransport,
    C: Complete,
    M: Mailer,
{
    let report = orchestrator.fetch_all(Some(&ARTICLE_CATEGORIES), cancel).await;
    let failed_sources = report.failures.len();
    let buckets = dedup(report.buckets);
    let items = buckets.total();
    if items == 0 {
        return Err(RunError::NoNews { failed_sources });
    }

    let candidates = flatten_candidates(&buckets);
    let article = writer.generate(&candidates).await?;

    let subject = article_subject(Local::now().date_naive());
    mailer.send(&subject, &article).await?;
    info!(%subject, "Article delivered");
    Ok(RunReport {
        subject,
        items,
        failed_sources,
        route: None,
        degraded: Vec::new(),
    })
}

/// Something that can perform one full run on demand.
pub trait RunTrigger: Send + Sync + 'static {
    fn trigger(&self) -> impl Future<Output = Result<RunReport, RunError>> + Send;
}

/// Build the feed orchestrator from settings.
pub async fn build_orchestrator(settings: &Settings) -> Result<Orchestrator<HttpTransport>, RunError> {
    let fetch = settings.fetch_config();
    let transport = HttpTransport::new(&fetch.user_agent, fetch.timeout)?;
    let catalog = Catalog::load_or_builtin(settings.news_catalog.as_deref()).await?;
    Ok(Orchestrator::new(
        catalog,
        FeedFetcher::new(transport, fetch.backoff),
        fetch.workers,
        fetch.per_source,
    ))
}

/// The daily digest wired to real HTTP, LLM and SMTP collaborators.
#[derive(Debug, Clone)]
pub struct DigestJob {
    settings: Arc<Settings>,
    cancel: CancellationToken,
}

impl DigestJob {
    pub fn new(settings: Arc<Settings>, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    pub async fn run(&self) -> Result<RunReport, RunError> {
        let s = &self.settings;
        let mailer = SmtpMailer::new(&s.mail_config())?;
        let client = ChatClient::new(&s.llm_config(s.summary_timeout))?;
        let model = RetryAsk::new(client, s.summary_max_retries, LLM_BACKOFF_STEP, self.cancel.clone());
        let summarizer = Summarizer::new(model, s.summary_config());
        let orchestrator = build_orchestrator(s).await?;
        run_once(&orchestrator, &summarizer, &mailer, s.archive_dir.as_deref(), &self.cancel).await
    }
}

impl RunTrigger for DigestJob {
    async fn trigger(&self) -> Result<RunReport, RunError> {
        self.run().await
    }
}

/// The evening article wired to real collaborators.
#[derive(Debug, Clone)]
pub struct ArticleJob {
    settings: Arc<Settings>,
    cancel: CancellationToken,
}

impl ArticleJob {
    pub fn new(settings: Arc<Settings>, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    pub async fn run(&self) -> Result<RunReport, RunError> {
        let s = &self.settings;
        let mailer = SmtpMailer::new(&s.mail_config())?;
        let client = ChatClient::new(&s.llm_config(s.morning_article_timeout))?;
        let model = RetryAsk::new(client, s.morning_article_max_retries, LLM_BACKOFF_STEP, self.cancel.clone());
        let writer = ArticleWriter::new(model, s.article_config());
        let orchestrator = build_orchestrator(s).await?;
        run_article(&orchestrator, &writer, &mailer, &self.cancel).await
    }
}
