//! Digest generation from the formatted brief.
//!
//! Short briefs go to the model in one request ([`Route::SinglePass`]).
//! Briefs longer than the configured threshold are split per category,
//! summarized concurrently, and followed by a highlights request built from
//! the five category summaries ([`Route::Chunked`]).
//!
//! Both routes normalize the model output through [`DigestSections`], so the
//! delivered digest always carries the six section headers in the fixed order
//! finance, politics, tech, crypto, other, highlights.

use crate::api::{Complete, CompletionRequest, LlmError};
use crate::models::Category;
use crate::outputs::brief::split_sections;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Body used for a section the model had nothing for.
pub const NO_MAJOR_NEWS: &str = "_No major news._";
/// Body used for a chunked section whose generation failed.
pub const SECTION_UNAVAILABLE: &str = "_This section is unavailable: summarization failed._";

/// How a brief is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    SinglePass,
    Chunked,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Route::SinglePass => "single_pass",
            Route::Chunked => "chunked",
        })
    }
}

/// Pick a route by comparing the brief's character count with `max_input_chars`.
pub fn route(brief: &str, max_input_chars: usize) -> Route {
    if brief.chars().count() <= max_input_chars {
        Route::SinglePass
    } else {
        Route::Chunked
    }
}

/// One section of the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Category(Category),
    Highlights,
}

impl SectionKey {
    /// Every section in rendering order.
    pub const ALL: [SectionKey; 6] = [
        SectionKey::Category(Category::Finance),
        SectionKey::Category(Category::Politics),
        SectionKey::Category(Category::Tech),
        SectionKey::Category(Category::Crypto),
        SectionKey::Category(Category::Other),
        SectionKey::Highlights,
    ];

    fn emoji(self) -> &'static str {
        match self {
            SectionKey::Category(c) => c.emoji(),
            SectionKey::Highlights => "📌",
        }
    }

    fn title(self) -> &'static str {
        match self {
            SectionKey::Category(c) => c.title(),
            SectionKey::Highlights => "Highlights",
        }
    }

    /// Words a model may use instead of the English title.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            SectionKey::Category(Category::Finance) => &["金融", "财经"],
            SectionKey::Category(Category::Politics) => &["政治"],
            SectionKey::Category(Category::Tech) => &["科技", "technology"],
            SectionKey::Category(Category::Crypto) => &["币圈", "加密"],
            SectionKey::Category(Category::Other) => &["其他", "其它"],
            SectionKey::Highlights => &["要点", "key points"],
        }
    }

    /// Canonical Markdown header line, e.g. `## 💰 Finance`.
    pub fn header(self) -> String {
        format!("## {} {}", self.emoji(), self.title())
    }

    /// Recognize a level-two heading line.
    fn from_heading(line: &str) -> Option<SectionKey> {
        let heading = line.strip_prefix("## ")?.trim();
        if let Some(key) = SectionKey::ALL.into_iter().find(|k| heading.contains(k.emoji())) {
            return Some(key);
        }
        let lower = heading.to_lowercase();
        SectionKey::ALL.into_iter().find(|k| {
            lower.contains(&k.title().to_lowercase()) || k.aliases().iter().any(|a| lower.contains(a))
        })
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKey::Category(c) => write!(f, "{c}"),
            SectionKey::Highlights => f.write_str("highlights"),
        }
    }
}

/// Model output split by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSections {
    sections: BTreeMap<SectionKey, String>,
    /// Text before the first recognized heading.
    preamble: String,
}

impl DigestSections {
    /// Split Markdown by its `## ` headings.
    ///
    /// Headings are recognized by their emoji, English title or a known
    /// alias; unrecognized headings stay in the body of the current section.
    /// A section that appears twice keeps both bodies.
    pub fn parse(text: &str) -> Self {
        let mut out = DigestSections::default();
        let mut current: Option<SectionKey> = None;
        let mut buf: Vec<&str> = Vec::new();

        for line in text.lines() {
            if let Some(key) = SectionKey::from_heading(line.trim_end()) {
                out.push(current, &buf);
                buf.clear();
                current = Some(key);
            } else {
                buf.push(line);
            }
        }
        out.push(current, &buf);
        out
    }

    fn push(&mut self, key: Option<SectionKey>, lines: &[&str]) {
        let body = lines.join("\n").trim().to_string();
        match key {
            None => self.preamble = body,
            Some(key) => {
                let slot = self.sections.entry(key).or_default();
                if !slot.is_empty() && !body.is_empty() {
                    slot.push_str("\n\n");
                }
                slot.push_str(&body);
            }
        }
    }

    pub fn get(&self, key: SectionKey) -> Option<&str> {
        self.sections.get(&key).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, key: SectionKey, body: impl Into<String>) {
        self.sections.insert(key, body.into());
    }

    /// Body for `key` from a response that was asked for that section alone:
    /// the matching section when headed, otherwise the unheaded text.
    fn body_for(text: &str, key: SectionKey) -> Option<String> {
        let parsed = Self::parse(text);
        parsed
            .get(key)
            .map(str::to_string)
            .or_else(|| (!parsed.preamble.is_empty()).then(|| parsed.preamble.clone()))
    }

    /// Render every section in the fixed order.
    ///
    /// Missing or empty sections render with [`NO_MAJOR_NEWS`].
    pub fn render(&self) -> String {
        SectionKey::ALL
            .into_iter()
            .map(|key| format!("{}\n\n{}", key.header(), self.get(key).unwrap_or(NO_MAJOR_NEWS)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A finished digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub text: String,
    pub route: Route,
    /// Sections replaced by [`SECTION_UNAVAILABLE`].
    pub degraded: Vec<SectionKey>,
}

impl Digest {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("nothing to summarize")]
    EmptyInput,
    #[error("summarization failed: {0}")]
    Llm(#[from] LlmError),
    #[error("every category summary failed; last error: {last}")]
    AllChunksFailed { last: LlmError },
}

/// Model parameters for digest generation.
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub max_input_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub language: String,
}

/// Turns a brief into a [`Digest`] using any [`Complete`] model.
#[derive(Debug)]
pub struct Summarizer<C> {
    model: C,
    config: SummaryConfig,
}

impl<C: Complete> Summarizer<C> {
    pub fn new(model: C, config: SummaryConfig) -> Self {
        Self { model, config }
    }

    #[cfg(test)]
    pub(crate) fn model_ref(&self) -> &C {
        &self.model
    }

    /// Summarize a brief produced by [`crate::outputs::brief::format_for_summary`].
    ///
    /// # Errors
    ///
    /// [`SummaryError::Llm`] when the single-pass request fails,
    /// [`SummaryError::AllChunksFailed`] when no category summary could be
    /// produced on the chunked route.
    #[instrument(level = "info", skip_all, fields(chars = brief.chars().count()))]
    pub async fn summarize(&self, brief: &str) -> Result<Digest, SummaryError> {
        if brief.trim().is_empty() {
            return Err(SummaryError::EmptyInput);
        }
        let route = route(brief, self.config.max_input_chars);
        info!(%route, threshold = self.config.max_input_chars, "Summarization route chosen");
        match route {
            Route::SinglePass => self.single_pass(brief).await,
            Route::Chunked => self.chunked(brief).await,
        }
    }

    async fn ask(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.model
            .complete(&CompletionRequest {
                system,
                user,
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            })
            .await
    }

    async fn single_pass(&self, brief: &str) -> Result<Digest, SummaryError> {
        let system = system_prompt(&self.config.language);
        let raw = self.ask(&system, &full_prompt(brief, &self.config.language)).await?;
        let sections = DigestSections::parse(&raw);
        let missing: Vec<String> = SectionKey::ALL
            .into_iter()
            .filter(|k| sections.get(*k).is_none())
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            warn!(missing = %missing.join(","), "Model output lacked sections; marking as no news");
        }
        Ok(Digest {
            text: sections.render(),
            route: Route::SinglePass,
            degraded: Vec::new(),
        })
    }

    async fn chunked(&self, brief: &str) -> Result<Digest, SummaryError> {
        let system = system_prompt(&self.config.language);
        let bodies = split_sections(brief);

        let calls = Category::ALL.into_iter().map(|category| {
            let body = bodies.get(&category).map(String::as_str).unwrap_or_default();
            let prompt = category_prompt(category, body, &self.config.language);
            let system = system.as_str();
            async move { (category, self.ask(system, &prompt).await) }
        });
        let results = join_all(calls).await;

        let mut sections = DigestSections::default();
        let mut degraded = Vec::new();
        let mut last_error = None;
        for (category, result) in results {
            let key = SectionKey::Category(category);
            match result {
                Ok(text) => {
                    let body = DigestSections::body_for(&text, key).unwrap_or_else(|| NO_MAJOR_NEWS.to_string());
                    sections.set(key, body);
                }
                Err(e) => {
                    warn!(%category, error = %e, "Category summary failed");
                    sections.set(key, SECTION_UNAVAILABLE);
                    degraded.push(key);
                    last_error = Some(e);
                }
            }
        }

        if degraded.len() == Category::ALL.len() {
            return Err(SummaryError::AllChunksFailed {
                last: last_error.unwrap_or(LlmError::EmptyCompletion),
            });
        }

        let category_digest: String = Category::ALL
            .into_iter()
            .map(|c| {
                let key = SectionKey::Category(c);
                format!("{}\n\n{}", key.header(), sections.get(key).unwrap_or(NO_MAJOR_NEWS))
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        match self
            .ask(&system, &highlights_prompt(&category_digest, &self.config.language))
            .await
        {
            Ok(text) => {
                let body = DigestSections::body_for(&text, SectionKey::Highlights)
                    .unwrap_or_else(|| NO_MAJOR_NEWS.to_string());
                sections.set(SectionKey::Highlights, body);
            }
            Err(e) => {
                warn!(error = %e, "Highlights summary failed");
                sections.set(SectionKey::Highlights, SECTION_UNAVAILABLE);
                degraded.push(SectionKey::Highlights);
            }
        }

        if !degraded.is_empty() {
            let names: Vec<String> = degraded.iter().map(ToString::to_string).collect();
            warn!(degraded = %names.join(","), "Digest is partial");
        }
        Ok(Digest {
            text: sections.render(),
            route: Route::Chunked,
            degraded,
        })
    }
}

fn system_prompt(language: &str) -> String {
    format!(
        "You are a professional bilingual news editor. You condense English news into concise {language}. \
         You know financial markets, international politics, technology and crypto well."
    )
}

fn region_layout(category: Category) -> String {
    category
        .regions()
        .iter()
        .map(|r| format!("### {} {}\n1. **Headline** - summary", r.flag(), r.title()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn section_layout(category: Category) -> String {
    let header = SectionKey::Category(category).header();
    if category == Category::Crypto {
        format!("{header}\n\n1. **Headline** - summary")
    } else {
        format!("{header}\n\n{}", region_layout(category))
    }
}

fn full_prompt(brief: &str, language: &str) -> String {
    let layout: String = Category::ALL
        .into_iter()
        .map(section_layout)
        .chain(std::iter::once(format!(
            "{}\n\n- **Finance**: one sentence\n- **Politics**: one sentence\n- **Tech**: one sentence\n- **Crypto**: one sentence",
            SectionKey::Highlights.header()
        )))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Translate and summarize the categorized news below into {language}.\n\n\
         Rules:\n\
         1. Keep the five topics: finance, politics, tech, crypto, other.\n\
         2. Split every topic except crypto by region (USA, Europe, Japan & Korea, Australia & New Zealand).\n\
         3. Pick the 2-4 most important stories per region; 1-2 sentences each, with key figures and impact.\n\
         4. For crypto focus on prices, regulation and major projects.\n\
         5. End with the highlights section.\n\
         6. Keep every `## ` heading exactly as shown. Write \"{NO_MAJOR_NEWS}\" under a heading with no news.\n\n\
         News:\n{brief}\n\n\
         Output format:\n\n{layout}\n"
    )
}

fn category_prompt(category: Category, body: &str, language: &str) -> String {
    let rules = if category == Category::Crypto {
        "Crypto news is not split by region; pick the 3-5 most important stories."
    } else {
        "Pick the 2-4 most important stories per region."
    };
    let body = if body.trim().is_empty() { "(no items)" } else { body };
    format!(
        "Summarize the news in the \"{title}\" category into {language}.\n\n\
         Rules:\n\
         1. 1-2 sentences per story, with key figures and impact.\n\
         2. {rules}\n\
         3. If there is nothing to report (overall or for a region), write \"{NO_MAJOR_NEWS}\".\n\
         4. Keep the `## ` heading exactly as shown.\n\n\
         News:\n{body}\n\n\
         Output format:\n\n{layout}\n",
        title = category.title(),
        layout = section_layout(category),
    )
}

fn highlights_prompt(category_digest: &str, language: &str) -> String {
    format!(
        "Write only the highlights section for today's digest in {language}, based on the summaries below. \
         Do not repeat the other sections.\n\n\
         Summaries:\n{category_digest}\n\n\
         Output format:\n\n{}\n\n\
         - **Finance**: one sentence\n- **Politics**: one sentence\n- **Tech**: one sentence\n- **Crypto**: one sentence\n",
        SectionKey::Highlights.header()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedModel;

    fn config(max_input_chars: usize) -> SummaryConfig {
        SummaryConfig {
            max_input_chars,
            max_tokens: 100,
            temperature: 0.7,
            language: "English".to_string(),
        }
    }

    const BRIEF: &str = "=== Finance ===\n\n--- 🇺🇸 USA ---\n1. [Wire] Fed holds\n   Rates unchanged\n\n\
                         === Crypto ===\n\n1. [Coins] BTC flat\n   Quiet day\n";

    fn assert_markers_in_order(text: &str) {
        let mut last = 0;
        for key in SectionKey::ALL {
            let header = key.header();
            assert_eq!(text.matches(&header).count(), 1, "{header} should appear once");
            let pos = text.find(&header).unwrap();
            assert!(pos >= last, "{header} out of order");
            last = pos + header.len();
        }
    }

    #[test]
    fn test_route_threshold_is_inclusive() {
        assert_eq!(route("abcd", 4), Route::SinglePass);
        assert_eq!(route("abcde", 4), Route::Chunked);
        assert_eq!(route("日本語", 3), Route::SinglePass);
    }

    #[test]
    fn test_parse_reorders_and_fills_missing_sections() {
        let raw = "Intro line\n## 📌 Highlights\n- all calm\n## 💰 Finance\n### 🇺🇸 USA\n1. Fed\n## 🔬 科技动态\n1. Chips";
        let sections = DigestSections::parse(raw);
        assert_eq!(sections.get(SectionKey::Category(Category::Finance)), Some("### 🇺🇸 USA\n1. Fed"));
        assert_eq!(sections.get(SectionKey::Category(Category::Tech)), Some("1. Chips"));
        assert_eq!(sections.get(SectionKey::Category(Category::Politics)), None);

        let text = sections.render();
        assert_markers_in_order(&text);
        assert!(text.contains(&format!("## 🌍 Politics\n\n{NO_MAJOR_NEWS}")));
        assert!(!text.contains("Intro line"));
    }

    #[test]
    fn test_heading_recognition() {
        assert_eq!(SectionKey::from_heading("## ₿ Crypto"), Some(SectionKey::Category(Category::Crypto)));
        assert_eq!(SectionKey::from_heading("## 📰 其他要闻"), Some(SectionKey::Category(Category::Other)));
        assert_eq!(SectionKey::from_heading("## Key Points"), Some(SectionKey::Highlights));
        assert_eq!(SectionKey::from_heading("### 🇺🇸 USA"), None);
        assert_eq!(SectionKey::from_heading("## Weather"), None);
    }

    #[tokio::test]
    async fn test_single_pass_sends_whole_brief_once() {
        let model = ScriptedModel::default().then(Ok("## 💰 Finance\n1. **Fed** - holds\n## ₿ Crypto\n1. **BTC** - flat"));
        let summarizer = Summarizer::new(model, config(10_000));
        let digest = summarizer.summarize(BRIEF).await.unwrap();

        assert_eq!(digest.route, Route::SinglePass);
        assert!(!digest.is_degraded());
        assert_markers_in_order(&digest.text);
        assert_eq!(summarizer.model.call_count(), 1);
        assert!(summarizer.model.prompts.lock().unwrap()[0].contains("1. [Wire] Fed holds"));
    }

    #[tokio::test]
    async fn test_single_pass_failure_is_an_error() {
        let summarizer = Summarizer::new(ScriptedModel::default(), config(10_000));
        assert!(matches!(summarizer.summarize(BRIEF).await, Err(SummaryError::Llm(_))));
    }

    #[tokio::test]
    async fn test_chunked_route_produces_six_ordered_markers() {
        let model = ScriptedModel::default()
            .when("Write only the highlights section", Ok("## 📌 Highlights\n- **Finance**: Fed holds"))
            .when("\"Finance\" category", Ok("## 💰 Finance\n### 🇺🇸 USA\n1. **Fed** - holds"))
            .when("\"Politics\" category", Ok(NO_MAJOR_NEWS))
            .when("\"Tech\" category", Ok("## 🔬 Tech\n_No major news._"))
            .when("\"Crypto\" category", Ok("## ₿ Crypto\n1. **BTC** - flat"))
            .when("\"Other\" category", Ok("## 📰 Other\n_No major news._"));
        let summarizer = Summarizer::new(model, config(20));
        let digest = summarizer.summarize(BRIEF).await.unwrap();

        assert_eq!(digest.route, Route::Chunked);
        assert!(digest.degraded.is_empty());
        assert_markers_in_order(&digest.text);
        assert!(digest.text.contains("1. **Fed** - holds"));
        assert!(digest.text.contains("- **Finance**: Fed holds"));
        assert_eq!(summarizer.model.call_count(), 6);

        let prompts = summarizer.model.prompts.lock().unwrap();
        let politics = prompts.iter().find(|p| p.contains("\"Politics\" category")).unwrap();
        assert!(politics.contains("(no items)"));
    }

    #[tokio::test]
    async fn test_chunked_failure_degrades_one_section() {
        let model = ScriptedModel::default()
            .when("Write only the highlights section", Ok("## 📌 Highlights\n- calm"))
            .when("\"Finance\" category", Err(()))
            .when("category", Ok("1. **Story** - text"));
        let summarizer = Summarizer::new(model, config(20));
        let digest = summarizer.summarize(BRIEF).await.unwrap();

        assert_eq!(digest.degraded, vec![SectionKey::Category(Category::Finance)]);
        assert!(digest.text.contains(&format!("## 💰 Finance\n\n{SECTION_UNAVAILABLE}")));
        assert_markers_in_order(&digest.text);
    }

    #[tokio::test]
    async fn test_chunked_all_categories_failing_is_an_error() {
        let model = ScriptedModel::default().when("Write only the highlights section", Ok("## 📌 Highlights\n- x"));
        let summarizer = Summarizer::new(model, config(20));
        assert!(matches!(
            summarizer.summarize(BRIEF).await,
            Err(SummaryError::AllChunksFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_brief_is_rejected_without_calling_model() {
        let summarizer = Summarizer::new(ScriptedModel::default(), config(20));
        assert!(matches!(summarizer.summarize("  \n").await, Err(SummaryError::EmptyInput)));
        assert_eq!(summarizer.model.call_count(), 0);
    }
}
