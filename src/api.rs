//! LLM API interaction with linear backoff retry logic.
//!
//! This module provides the interface for communicating with an
//! OpenAI-compatible chat-completions API (DeepSeek by default).
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`Complete`]: Core trait defining one async completion call
//! - [`ChatClient`]: HTTP implementation against `{base}/chat/completions`
//! - [`RetryAsk`]: Decorator that adds retry logic to any `Complete` implementation
//!
//! # Retry Strategy
//!
//! [`RetryAsk`] delegates to the shared [`LinearBackoff`] loop: a fixed number
//! of total attempts, waiting `step * n` before retry `n`, and stopping early
//! when the run's cancellation token fires.

use crate::retry::{LinearBackoff, RetryError};
use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
/// Default model name.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API key is not configured")]
    NotConfigured,
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("LLM returned an empty completion")]
    EmptyCompletion,
    #[error("LLM call failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },
    #[error("LLM call cancelled")]
    Cancelled,
}

/// One chat completion request: a system prompt and a user message.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Trait for async LLM interaction.
///
/// Implementors send one request to a model and return the completion text.
/// This abstraction allows for different LLM backends or decorators (like
/// retry logic), and scripted fakes in tests.
pub trait Complete: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> impl Future<Output = Result<String, LlmError>> + Send;
}

/// Connection settings for [`ChatClient`].
#[derive(Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pull the first non-empty completion out of a chat response.
fn completion_text(response: ChatResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(LlmError::EmptyCompletion)
}

/// OpenAI-compatible chat-completions client.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl ChatClient {
    /// Build a client; fails with [`LlmError::NotConfigured`] without an API key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::NotConfigured)?
            .to_string();
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Complete for ChatClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "API call failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 300),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = completion_text(parsed)?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "API call succeeded"
        );
        Ok(text)
    }
}

/// Wrapper that adds linear backoff retry logic to any [`Complete`] implementation.
///
/// The delay before retry `n` is `step * n`; the wrapper gives up after
/// `attempts` total calls or as soon as `cancel` fires.
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    backoff: LinearBackoff,
    cancel: CancellationToken,
}

impl<T: Complete> RetryAsk<T> {
    /// Create a new retry wrapper.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying LLM client to wrap
    /// * `attempts` - Total attempts, including the first one (at least 1)
    /// * `step` - Backoff unit (5 seconds in production)
    /// * `cancel` - Run-scoped cancellation token
    pub fn new(inner: T, attempts: u32, step: Duration, cancel: CancellationToken) -> Self {
        Self {
            inner,
            backoff: LinearBackoff::new(attempts.max(1) - 1, step),
            cancel,
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<T: Complete> Complete for RetryAsk<T> {
    #[instrument(level = "info", skip_all)]
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let res = self
            .backoff
            .run("llm", &self.cancel, |_attempt| self.inner.complete(request))
            .await;

        match res {
            Ok(text) => {
                info!(elapsed_ms_total = t0.elapsed().as_millis() as u64, "complete() succeeded");
                Ok(text)
            }
            Err(RetryError::Exhausted { attempts, last_error }) => {
                error!(attempts, error = %last_error, "complete() exhausted retries");
                Err(LlmError::Exhausted {
                    attempts,
                    source: Box::new(last_error),
                })
            }
            Err(RetryError::Cancelled { .. }) => Err(LlmError::Cancelled),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted model. Responses are matched by the first rule whose needle
    /// appears in the user prompt; otherwise the queue is consumed in order.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedModel {
        rules: Vec<(String, Result<String, ()>)>,
        queue: Mutex<VecDeque<Result<String, ()>>>,
        pub(crate) calls: AtomicU32,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub(crate) fn when(mut self, needle: &str, reply: Result<&str, ()>) -> Self {
            self.rules.push((needle.to_string(), reply.map(str::to_string)));
            self
        }

        pub(crate) fn then(self, reply: Result<&str, ()>) -> Self {
            self.queue.lock().unwrap().push_back(reply.map(str::to_string));
            self
        }

        pub(crate) fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Complete for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.user.to_string());
            let reply = self
                .rules
                .iter()
                .find(|(needle, _)| request.user.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
                .or_else(|| self.queue.lock().unwrap().pop_front())
                .unwrap_or(Err(()));
            reply.map_err(|_| LlmError::Status {
                status: 503,
                body: "scripted failure".to_string(),
            })
        }
    }

    fn request() -> CompletionRequest<'static> {
        CompletionRequest {
            system: "sys",
            user: "hello",
            max_tokens: 10,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn test_retry_ask_recovers_within_budget() {
        let model = ScriptedModel::default().then(Err(())).then(Err(())).then(Ok("done"));
        let api = RetryAsk::new(model, 3, Duration::ZERO, CancellationToken::new());
        assert_eq!(api.complete(&request()).await.unwrap(), "done");
        assert_eq!(api.inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_ask_attempts_are_total_calls() {
        let model = ScriptedModel::default();
        let api = RetryAsk::new(model, 3, Duration::ZERO, CancellationToken::new());
        let err = api.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Exhausted { attempts: 3, .. }));
        assert_eq!(api.inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_ask_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let api = RetryAsk::new(ScriptedModel::default().then(Ok("x")), 3, Duration::ZERO, cancel);
        assert!(matches!(api.complete(&request()).await, Err(LlmError::Cancelled)));
        assert_eq!(api.inner.call_count(), 0);
    }

    #[test]
    fn test_completion_text_rejects_empty() {
        let ok: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"  hi \n"}}]}"#).unwrap();
        assert_eq!(completion_text(ok).unwrap(), "hi");

        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"   "}}]}"#).unwrap();
        assert!(matches!(completion_text(blank), Err(LlmError::EmptyCompletion)));

        let none: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(completion_text(none), Err(LlmError::EmptyCompletion)));
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = LlmConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: Some("  ".to_string()),
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(ChatClient::new(&config), Err(LlmError::NotConfigured)));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "https://llm.test/v1/".to_string(),
            model: "m".to_string(),
            api_key: Some("k".to_string()),
            timeout: Duration::from_secs(5),
        };
        let client = ChatClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "https://llm.test/v1/chat/completions");
        assert!(!format!("{client:?}").contains("api_key"));
    }
}
