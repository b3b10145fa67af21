//! Runtime settings.
//!
//! Every option is a clap argument backed by an environment variable, so the
//! service can be configured from flags, the process environment or a `.env`
//! file (loaded by `main` before parsing). Ranges are enforced at parse time;
//! the component configs below are derived from the parsed [`Settings`].

use crate::api::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmConfig};
use crate::article::ArticleConfig;
use crate::email::MailConfig;
use crate::feeds::FetchConfig;
use crate::retry::LinearBackoff;
use crate::summarizer::SummaryConfig;
use clap::Args;
use clap::builder::NonEmptyStringValueParser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default feed user agent; some publishers reject unknown clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Backoff unit between LLM retries.
pub const LLM_BACKOFF_STEP: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MORNING_ARTICLE_MIN_CHARS ({min}) is greater than MORNING_ARTICLE_MAX_CHARS ({max})")]
    InvalidCharRange { min: usize, max: usize },
}

fn parse_float_in(s: &str, min: f64, max: f64) -> Result<f64, String> {
    let value: f64 = s.trim().parse().map_err(|e| format!("`{s}` is not a number: {e}"))?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in {min}..={max}"))
    }
}

fn parse_backoff_seconds(s: &str) -> Result<f64, String> {
    parse_float_in(s, 0.0, 60.0)
}

fn parse_temperature(s: &str) -> Result<f32, String> {
    parse_float_in(s, 0.0, 2.0).map(|v| v as f32)
}

/// All runtime settings.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Per-request feed timeout, in seconds
    #[arg(long, env = "RSS_TIMEOUT", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub rss_timeout: u64,

    /// Concurrent feed fetches
    #[arg(long, env = "RSS_MAX_WORKERS", default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..=64))]
    pub rss_max_workers: u32,

    /// Retries per feed after the first attempt
    #[arg(long, env = "RSS_MAX_RETRIES", default_value_t = 2, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub rss_max_retries: u32,

    /// Backoff unit between feed retries, in seconds (retry n waits n times this)
    #[arg(long, env = "RSS_BACKOFF_SECONDS", default_value_t = 1.5, value_parser = parse_backoff_seconds)]
    pub rss_backoff_seconds: f64,

    /// User-Agent header sent to feeds
    #[arg(long, env = "RSS_USER_AGENT", default_value = DEFAULT_USER_AGENT, value_parser = NonEmptyStringValueParser::new())]
    pub rss_user_agent: String,

    /// Entries kept per source
    #[arg(long, env = "NEWS_PER_SOURCE", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub news_per_source: u32,

    /// YAML source catalog; the built-in catalog is used when absent
    #[arg(long, env = "NEWS_CATALOG")]
    pub news_catalog: Option<PathBuf>,

    /// Briefs longer than this many characters are summarized per category
    #[arg(long, env = "SUMMARY_MAX_INPUT_CHARS", default_value_t = 8000, value_parser = clap::value_parser!(u64).range(1..))]
    pub summary_max_input_chars: u64,

    /// Total attempts per summarization call
    #[arg(long, env = "SUMMARY_MAX_RETRIES", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub summary_max_retries: u32,

    #[arg(long, env = "SUMMARY_MAX_TOKENS", default_value_t = 2000, value_parser = clap::value_parser!(u32).range(1..=32768))]
    pub summary_max_tokens: u32,

    #[arg(long, env = "SUMMARY_TEMPERATURE", default_value_t = 0.7, value_parser = parse_temperature)]
    pub summary_temperature: f32,

    /// Summarization request timeout, in seconds
    #[arg(long, env = "SUMMARY_TIMEOUT", default_value_t = 180, value_parser = clap::value_parser!(u64).range(1..=900))]
    pub summary_timeout: u64,

    /// Language the digest and article are written in
    #[arg(long, env = "SUMMARY_LANGUAGE", default_value = "Simplified Chinese")]
    pub summary_language: String,

    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "DEEPSEEK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub deepseek_base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub llm_model: String,

    #[arg(long, env = "SMTP_SERVER", default_value = "smtp.gmail.com")]
    pub smtp_server: String,

    /// 465 uses implicit TLS, anything else STARTTLS
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "SENDER_EMAIL")]
    pub sender_email: Option<String>,

    #[arg(long, env = "SENDER_PASSWORD", hide_env_values = true)]
    pub sender_password: Option<String>,

    #[arg(long, env = "RECEIVER_EMAIL")]
    pub receiver_email: Option<String>,

    #[arg(long, env = "MORNING_ARTICLE_TIMEOUT", default_value_t = 180, value_parser = clap::value_parser!(u64).range(1..=900))]
    pub morning_article_timeout: u64,

    #[arg(long, env = "MORNING_ARTICLE_MAX_TOKENS", default_value_t = 1800, value_parser = clap::value_parser!(u32).range(1..=32768))]
    pub morning_article_max_tokens: u32,

    #[arg(long, env = "MORNING_ARTICLE_TEMPERATURE", default_value_t = 0.5, value_parser = parse_temperature)]
    pub morning_article_temperature: f32,

    #[arg(long, env = "MORNING_ARTICLE_MAX_RETRIES", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub morning_article_max_retries: u32,

    /// Lower length bound, in non-whitespace characters
    #[arg(long, env = "MORNING_ARTICLE_MIN_CHARS", default_value_t = 650)]
    pub morning_article_min_chars: usize,

    /// Upper length bound, in non-whitespace characters
    #[arg(long, env = "MORNING_ARTICLE_MAX_CHARS", default_value_t = 1200)]
    pub morning_article_max_chars: usize,

    /// Shared secret for `/trigger?key=`; the endpoint is open when unset
    #[arg(long, env = "TRIGGER_SECRET_KEY", hide_env_values = true)]
    pub trigger_secret_key: Option<String>,

    /// HTTP listen port for `serve`
    #[arg(long, env = "PORT", default_value_t = 10000)]
    pub port: u16,

    /// Write a JSON archive of every digest run under this directory
    #[arg(long, env = "ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,
}

impl Settings {
    /// Cross-field checks clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.morning_article_min_chars > self.morning_article_max_chars {
            return Err(ConfigError::InvalidCharRange {
                min: self.morning_article_min_chars,
                max: self.morning_article_max_chars,
            });
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.rss_timeout),
            user_agent: self.rss_user_agent.clone(),
            backoff: LinearBackoff::new(self.rss_max_retries, Duration::from_secs_f64(self.rss_backoff_seconds)),
            per_source: self.news_per_source as usize,
            workers: self.rss_max_workers as usize,
        }
    }

    pub fn summary_config(&self) -> SummaryConfig {
        SummaryConfig {
            max_input_chars: usize::try_from(self.summary_max_input_chars).unwrap_or(usize::MAX),
            max_tokens: self.summary_max_tokens,
            temperature: self.summary_temperature,
            language: self.summary_language.clone(),
        }
    }

    pub fn article_config(&self) -> ArticleConfig {
        ArticleConfig {
            max_tokens: self.morning_article_max_tokens,
            temperature: self.morning_article_temperature,
            min_chars: self.morning_article_min_chars,
            max_chars: self.morning_article_max_chars,
            language: self.summary_language.clone(),
        }
    }

    /// LLM connection settings with the given request timeout.
    pub fn llm_config(&self, timeout_secs: u64) -> LlmConfig {
        LlmConfig {
            base_url: self.deepseek_base_url.clone(),
            model: self.llm_model.clone(),
            api_key: self.deepseek_api_key.clone(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn mail_config(&self) -> MailConfig {
        MailConfig {
            server: self.smtp_server.clone(),
            port: self.smtp_port,
            sender: self.sender_email.clone(),
            password: self.sender_password.clone(),
            receiver: self.receiver_email.clone(),
        }
    }

    /// Configured trigger secret, ignoring blank values.
    pub fn trigger_secret(&self) -> Option<String> {
        self.trigger_secret_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}
