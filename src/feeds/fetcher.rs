//! Fetch one feed with timeout, retry and linear backoff, then normalize its
//! entries into [`NewsItem`]s.
//!
//! The fetcher never returns an error to its caller: transport failures are
//! retried according to the configured [`LinearBackoff`] and, once the budget
//! is spent, reported as [`FetchOutcome::Failed`]. A body that downloads fine
//! but does not parse is treated as an empty feed.

use super::parser::{RawEntry, parse_feed};
use crate::models::NewsItem;
use crate::retry::{LinearBackoff, RetryError};
use crate::utils::{clean_text, truncate_for_log};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Maximum title length, in characters.
pub const TITLE_MAX_CHARS: usize = 200;
/// Maximum summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 500;
/// Title used when an entry has none.
pub const UNTITLED: &str = "(untitled)";

/// Network-level failure while downloading a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[cfg(test)]
    #[error("{0}")]
    Other(String),
}

/// Transport used to download feed bodies.
pub trait FeedTransport: Send + Sync {
    /// GET `url` and return the raw body.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Settings for feed downloads.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub backoff: LinearBackoff,
    /// Entries kept per source.
    pub per_source: usize,
    /// Concurrent fetches.
    pub workers: usize,
}

/// [`FeedTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client that sends `user_agent` and gives up after `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl FeedTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Result of fetching one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Vec<NewsItem>),
    Failed { reason: String, attempts: u32 },
}

#[cfg(test)]
impl FetchOutcome {
    /// Items of a successful fetch; a failure contributes nothing.
    pub fn into_items(self) -> Vec<NewsItem> {
        match self {
            FetchOutcome::Fetched(items) => items,
            FetchOutcome::Failed { .. } => Vec::new(),
        }
    }
}

/// Downloads and normalizes single feeds.
#[derive(Debug, Clone)]
pub struct FeedFetcher<T> {
    transport: T,
    backoff: LinearBackoff,
}

impl<T: FeedTransport> FeedFetcher<T> {
    pub fn new(transport: T, backoff: LinearBackoff) -> Self {
        Self { transport, backoff }
    }

    #[cfg(test)]
    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }

    /// Fetch `url`, keeping at most `limit` entries in document order.
    ///
    /// # Arguments
    ///
    /// * `url` - Feed endpoint
    /// * `source_name` - Label stored on every produced item
    /// * `limit` - Maximum number of entries to keep
    /// * `cancel` - Run-scoped token checked at every retry boundary
    ///
    /// # Returns
    ///
    /// [`FetchOutcome::Fetched`] with zero or more items, or
    /// [`FetchOutcome::Failed`] once retries are exhausted or the run is cancelled.
    #[instrument(level = "debug", skip_all, fields(source = %source_name, url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        source_name: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let result = self
            .backoff
            .run(source_name, cancel, |_attempt| self.transport.get(url))
            .await;

        let body = match result {
            Ok(body) => body,
            Err(RetryError::Exhausted { attempts, last_error }) => {
                warn!(attempts, error = %last_error, "Feed fetch failed");
                return FetchOutcome::Failed {
                    reason: last_error.to_string(),
                    attempts,
                };
            }
            Err(RetryError::Cancelled { attempts }) => {
                debug!(attempts, "Feed fetch cancelled");
                return FetchOutcome::Failed {
                    reason: "cancelled".to_string(),
                    attempts,
                };
            }
        };

        let entries = match parse_feed(&body) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    error = %e,
                    body = %truncate_for_log(&String::from_utf8_lossy(&body), 120),
                    "Feed body did not parse; treating as empty"
                );
                return FetchOutcome::Fetched(Vec::new());
            }
        };

        let items: Vec<NewsItem> = entries
            .into_iter()
            .take(limit)
            .map(|entry| normalize_entry(entry, source_name))
            .collect();
        debug!(count = items.len(), "Parsed feed entries");
        FetchOutcome::Fetched(items)
    }
}

/// Turn a raw entry into a cleaned, length-capped [`NewsItem`].
pub fn normalize_entry(entry: RawEntry, source_name: &str) -> NewsItem {
    let title = clean_text(entry.title.as_deref().unwrap_or_default(), TITLE_MAX_CHARS);
    NewsItem {
        title: if title.is_empty() { UNTITLED.to_string() } else { title },
        link: entry.link.unwrap_or_default().trim().to_string(),
        summary: clean_text(entry.summary.as_deref().unwrap_or_default(), SUMMARY_MAX_CHARS),
        source: source_name.to_string(),
        published: entry.published.unwrap_or_default().trim().to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted transport: each URL answers from its queue, then repeats the
    /// last answer.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        script: Mutex<HashMap<String, VecDeque<Result<String, u16>>>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedTransport {
        pub(crate) fn with(mut self, url: &str, responses: Vec<Result<String, u16>>) -> Self {
            self.script
                .get_mut()
                .unwrap()
                .insert(url.to_string(), responses.into_iter().collect());
            self
        }

        pub(crate) fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    impl FeedTransport for ScriptedTransport {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            let mut script = self.script.lock().unwrap();
            let queue = script
                .get_mut(url)
                .ok_or_else(|| FetchError::Other(format!("no route to {url}")))?;
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            match next {
                Some(Ok(body)) => Ok(body.into_bytes()),
                Some(Err(status)) => Err(FetchError::Status(status)),
                None => Err(FetchError::Other("empty script".to_string())),
            }
        }
    }

    pub(crate) fn rss(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link)| {
                format!("<item><title>{title}</title><link>{link}</link><description>About {title}</description></item>")
            })
            .collect();
        format!("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>t</title>{body}</channel></rss>")
    }

    fn fetcher(transport: ScriptedTransport, retries: u32) -> FeedFetcher<ScriptedTransport> {
        FeedFetcher::new(transport, LinearBackoff::new(retries, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds_with_two_retries() {
        let url = "https://feeds.test/a";
        let transport = ScriptedTransport::default().with(
            url,
            vec![Err(503), Err(502), Ok(rss(&[("One", "https://x.test/1")]))],
        );
        let f = fetcher(transport, 2);
        let outcome = f.fetch(url, "Src", 3, &CancellationToken::new()).await;
        match outcome {
            FetchOutcome::Fetched(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].title, "One");
                assert_eq!(items[0].source, "Src");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(f.transport.calls(url), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_failure() {
        let url = "https://feeds.test/down";
        let transport = ScriptedTransport::default().with(url, vec![Err(500)]);
        let f = fetcher(transport, 2);
        let outcome = f.fetch(url, "Src", 3, &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            FetchOutcome::Failed {
                reason: "unexpected HTTP status 500".to_string(),
                attempts: 3
            }
        );
        assert!(outcome.clone().into_items().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_body_is_empty_success() {
        let url = "https://feeds.test/html";
        let transport = ScriptedTransport::default().with(url, vec![Ok("<html><body>Service unavailable</body></html>".to_string())]);
        let outcome = fetcher(transport, 0)
            .fetch(url, "Src", 3, &CancellationToken::new())
            .await;
        assert_eq!(outcome, FetchOutcome::Fetched(Vec::new()));
    }

    #[tokio::test]
    async fn test_limit_keeps_document_order() {
        let url = "https://feeds.test/many";
        let body = rss(&[("A", "https://x/a"), ("B", "https://x/b"), ("C", "https://x/c")]);
        let transport = ScriptedTransport::default().with(url, vec![Ok(body)]);
        let items = fetcher(transport, 0)
            .fetch(url, "Src", 2, &CancellationToken::new())
            .await
            .into_items();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_normalize_entry_defaults_and_caps() {
        let entry = RawEntry {
            title: Some("   ".to_string()),
            link: None,
            summary: Some(format!("<div>{}</div>", "word ".repeat(300))),
            published: None,
        };
        let item = normalize_entry(entry, "Src");
        assert_eq!(item.title, UNTITLED);
        assert_eq!(item.link, "");
        assert!(item.summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(!item.summary.contains('<') && !item.summary.contains('>'));
    }
}
