//! AI × finance evening read: pick one theme from the day's finance and tech
//! news, plan it as JSON, write a short article and keep its length in range.
//!
//! Model output is validated at every step. A plan that is not JSON, or that
//! names no supporting items, is a [`ArticleError::MalformedPlan`]; an article
//! without Markdown sections is an [`ArticleError::IncompleteArticle`].

use crate::api::{Complete, CompletionRequest, LlmError};
use crate::models::{Candidate, Category};
use crate::outputs::candidates::render_candidates;
use crate::utils::{looks_truncated, non_whitespace_len, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Candidates below this count cannot support an article.
pub const MIN_CANDIDATES: usize = 5;
/// Finance + AI tech below this count is topped up with other tech items.
const TOP_UP_TARGET: usize = 12;
/// Upper bound on candidates shown to the model.
const MAX_CANDIDATES: usize = 30;
/// Token budget of the planning call.
const PLAN_MAX_TOKENS: u32 = 900;

const AI_KEYWORDS: &[&str] = &[
    "ai",
    "a.i.",
    "artificial intelligence",
    "llm",
    "大模型",
    "人工智能",
    "模型",
    "算力",
    "gpu",
    "nvidia",
    "openai",
    "deepmind",
    "anthropic",
    "chatgpt",
    "芯片",
    "数据中心",
    "cloud",
    "推理",
    "训练",
];

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex"));

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("only {found} candidate item(s); at least {required} are needed")]
    TooFewCandidates { found: usize, required: usize },
    #[error("topic plan is malformed: {0}")]
    MalformedPlan(String),
    #[error("generated article is empty or has no sections")]
    IncompleteArticle,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Theme and outline chosen by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicPlan {
    #[serde(default)]
    pub theme_title: String,
    #[serde(default)]
    pub thesis: String,
    #[serde(default)]
    pub supporting_ids: Vec<String>,
    #[serde(default)]
    pub outline: serde_json::Value,
}

#[derive(Debug, Error)]
enum PlanParseError {
    #[error("no JSON object in model output")]
    NoJson,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plan has no supporting_ids")]
    MissingSupportingIds,
}

impl PlanParseError {
    fn is_truncated(&self) -> bool {
        matches!(self, PlanParseError::Json(e) if looks_truncated(e))
    }
}

/// Model parameters and length bounds for the article.
#[derive(Debug, Clone)]
pub struct ArticleConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Inclusive bounds, counted in non-whitespace characters.
    pub min_chars: usize,
    pub max_chars: usize,
    pub language: String,
}

/// Whether a title/summary pair talks about AI.
pub fn is_ai_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    AI_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Choose the items the model may build an article on.
///
/// All finance items plus AI-related tech come first; when that is fewer
/// than twelve, the remaining tech items fill up to twelve. The list is then
/// deduplicated by link (or title when the link is empty) and capped at thirty.
pub fn select_candidates(items: &[Candidate]) -> Vec<Candidate> {
    let finance = items.iter().filter(|c| c.category == Category::Finance);
    let (ai_tech, other_tech): (Vec<&Candidate>, Vec<&Candidate>) = items
        .iter()
        .filter(|c| c.category == Category::Tech)
        .partition(|c| is_ai_related(&format!("{}\n{}", c.title, c.summary)));

    let mut picked: Vec<&Candidate> = finance.chain(ai_tech).collect();
    if picked.len() < TOP_UP_TARGET {
        let missing = TOP_UP_TARGET - picked.len();
        picked.extend(other_tech.into_iter().take(missing));
    }

    let mut seen = HashSet::new();
    picked
        .into_iter()
        .filter(|c| {
            let key = if c.link.is_empty() { c.title.clone() } else { c.link.clone() };
            seen.insert(key)
        })
        .take(MAX_CANDIDATES)
        .cloned()
        .collect()
}

fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

fn parse_plan(text: &str) -> Result<TopicPlan, PlanParseError> {
    let json = extract_json_object(text).ok_or(PlanParseError::NoJson)?;
    let plan: TopicPlan = serde_json::from_str(json)?;
    if plan.supporting_ids.is_empty() {
        return Err(PlanParseError::MissingSupportingIds);
    }
    Ok(plan)
}

/// Drives the plan → write → length-check sequence against a model.
#[derive(Debug)]
pub struct ArticleWriter<C> {
    model: C,
    config: ArticleConfig,
}

impl<C: Complete> ArticleWriter<C> {
    pub fn new(model: C, config: ArticleConfig) -> Self {
        Self { model, config }
    }

    async fn ask(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.model
            .complete(&CompletionRequest {
                system,
                user,
                max_tokens,
                temperature: self.config.temperature,
            })
            .await
    }

    /// Produce the article from flattened finance/tech candidates.
    ///
    /// # Errors
    ///
    /// [`ArticleError::TooFewCandidates`] before any model call when fewer
    /// than [`MIN_CANDIDATES`] items qualify; validation errors for malformed
    /// model output; [`ArticleError::Llm`] when a call fails.
    #[instrument(level = "info", skip_all, fields(items = items.len()))]
    pub async fn generate(&self, items: &[Candidate]) -> Result<String, ArticleError> {
        let candidates = select_candidates(items);
        info!(candidates = candidates.len(), "Selected article candidates");
        if candidates.len() < MIN_CANDIDATES {
            return Err(ArticleError::TooFewCandidates {
                found: candidates.len(),
                required: MIN_CANDIDATES,
            });
        }

        let plan = self.plan(&candidates).await?;
        info!(theme = %plan.theme_title, supporting = plan.supporting_ids.len(), "Topic planned");

        let by_id: HashMap<&str, &Candidate> = candidates.iter().map(|c| (c.id.as_str(), c)).collect();
        let article = self.write(&plan, &by_id).await?;
        let article = self.enforce_length(article).await?;

        if article.trim().is_empty() || !article.contains("##") {
            return Err(ArticleError::IncompleteArticle);
        }
        Ok(article)
    }

    async fn plan(&self, candidates: &[Candidate]) -> Result<TopicPlan, ArticleError> {
        let system = plan_system_prompt();
        let user = plan_prompt(candidates, &self.config.language);

        let raw = self.ask(&system, &user, PLAN_MAX_TOKENS).await?;
        let parsed = match parse_plan(&raw) {
            Err(e) if e.is_truncated() => {
                warn!(error = %e, raw = %truncate_for_log(&raw, 200), "Plan JSON looks truncated; asking again");
                let retry = self.ask(&system, &user, PLAN_MAX_TOKENS).await?;
                parse_plan(&retry)
            }
            other => other,
        };
        let mut plan = parsed.map_err(|e| ArticleError::MalformedPlan(e.to_string()))?;

        let known: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        plan.supporting_ids.retain(|id| known.contains(id.as_str()));
        if plan.supporting_ids.is_empty() {
            return Err(ArticleError::MalformedPlan(
                "no supporting_ids match a candidate".to_string(),
            ));
        }
        Ok(plan)
    }

    async fn write(&self, plan: &TopicPlan, by_id: &HashMap<&str, &Candidate>) -> Result<String, ArticleError> {
        let cited: Vec<String> = plan
            .supporting_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .map(|c| format!("{}: {} ({}) {}", c.id, c.title, c.source, c.link))
            .collect();
        let plan_json = serde_json::to_string(plan).map_err(|e| ArticleError::MalformedPlan(e.to_string()))?;
        let user = write_prompt(&cited.join("\n"), &plan_json, &self.config);
        let article = self
            .ask(&write_system_prompt(), &user, self.config.max_tokens)
            .await?;
        Ok(article.trim().to_string())
    }

    async fn enforce_length(&self, article: String) -> Result<String, ArticleError> {
        let chars = non_whitespace_len(&article);
        if (self.config.min_chars..=self.config.max_chars).contains(&chars) {
            return Ok(article);
        }
        let target = (self.config.min_chars + self.config.max_chars) / 2;
        debug!(chars, target, "Article length out of range; rewriting once");
        let revised = self
            .ask(&edit_system_prompt(), &length_prompt(&article, target), self.config.max_tokens)
            .await?;
        let revised = revised.trim();
        Ok(if revised.is_empty() { article } else { revised.to_string() })
    }
}

fn plan_system_prompt() -> String {
    "You are a writing coach and a macro and technology investment analyst. You write structured, \
     readable short pieces. Never invent figures or facts that are not in the input; when data is \
     missing, say so qualitatively."
        .to_string()
}

fn plan_prompt(candidates: &[Candidate], language: &str) -> String {
    format!(
        "Below are news items with ids. Pick ONE \"AI × finance/markets\" theme for a 3-5 minute read \
         in {language} and return its outline as JSON only (no other text).\n\n\
         Requirements:\n\
         1) The theme must support a causal chain of at least four links.\n\
         2) Outline: hook (3 sentences) / fact cards (3) / analysis (causal chain, second-order effects, \
         risks and counterpoints) / conclusion (3 sentences) / watchlist (3).\n\
         3) Fact cards cite the given items by id (e.g. N003).\n\n\
         JSON schema:\n\
         {{\"theme_title\": \"...\", \"thesis\": \"...\", \"supporting_ids\": [\"N001\"], \
         \"outline\": {{\"hook\": [], \"fact_cards\": [{{\"id\": \"N001\", \"point\": \"...\"}}], \
         \"causal_chain\": [], \"second_order\": [], \"risks_counterpoints\": [], \"conclusion\": [], \
         \"watchlist\": []}}}}\n\n\
         Items:\n{}\n",
        render_candidates(candidates)
    )
}

fn write_system_prompt() -> String {
    "You are a writing coach and investment researcher. Your articles are meant to be read aloud: \
     short sentences, clear connectives. Never invent figures or facts; flag uncertainty."
        .to_string()
}

fn write_prompt(cited: &str, plan_json: &str, config: &ArticleConfig) -> String {
    format!(
        "Write the article in {language} from the plan below.\n\n\
         Hard requirements:\n\
         1) Length about {min}-{max} characters, not counting whitespace.\n\
         2) Use exactly these Markdown headings:\n\
         - # Title\n\
         - ## 30-second hook\n\
         - ## Fact cards (cite item ids)\n\
         - ## Analysis (causal chain → second-order effects → risks/counterpoints)\n\
         - ## Conclusion\n\
         - ## Watchlist\n\
         - ## References (links of the supporting ids)\n\
         3) Fact cards only state facts present in the input; mark anything uncertain.\n\n\
         Citable items:\n{cited}\n\n\
         Plan (JSON):\n{plan_json}\n",
        language = config.language,
        min = config.min_chars,
        max = config.max_chars,
    )
}

fn edit_system_prompt() -> String {
    "You are a careful editor. You only shorten or expand; you never add new facts.".to_string()
}

fn length_prompt(article: &str, target: usize) -> String {
    format!(
        "Adjust the article below to roughly {target} characters (not counting whitespace).\n\
         1) Keep its structure and headings.\n\
         2) Add no facts or figures that are not already there.\n\
         3) To shorten, drop repetition; to lengthen, add reasoning and uncertainty notes.\n\n\
         Article:\n{article}\n"
    )
}
