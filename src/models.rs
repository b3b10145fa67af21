//! Data models shared across the acquisition pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Category`] and [`Region`]: the closed key space of the source catalog
//! - [`Source`]: one configured RSS endpoint
//! - [`NewsItem`]: a normalized feed entry
//! - [`Buckets`]: the two-level (category × region) container of items
//! - [`FetchTask`]: the unit of work handed to the fetch orchestrator
//! - [`Candidate`]: a flattened, numbered item used for topic selection
//!
//! Everything here is created fresh for a single run and discarded after the
//! digest is produced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A news topic. Variants are declared in catalog order, which is also the
/// order used for formatting, summarizing and numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Finance,
    Politics,
    Tech,
    Crypto,
    Other,
}

impl Category {
    /// Every category in catalog order.
    pub const ALL: [Category; 5] = [
        Category::Finance,
        Category::Politics,
        Category::Tech,
        Category::Crypto,
        Category::Other,
    ];

    /// Configuration key (`finance`, `politics`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Category::Finance => "finance",
            Category::Politics => "politics",
            Category::Tech => "tech",
            Category::Crypto => "crypto",
            Category::Other => "other",
        }
    }

    /// Human readable title used in section headers.
    pub fn title(self) -> &'static str {
        match self {
            Category::Finance => "Finance",
            Category::Politics => "Politics",
            Category::Tech => "Tech",
            Category::Crypto => "Crypto",
            Category::Other => "Other",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::Finance => "💰",
            Category::Politics => "🌍",
            Category::Tech => "🔬",
            Category::Crypto => "₿",
            Category::Other => "📰",
        }
    }

    /// Regions a category is allowed to hold, in rendering order.
    ///
    /// Crypto news is global and is never split by region.
    pub fn regions(self) -> &'static [Region] {
        match self {
            Category::Crypto => &[Region::Global],
            _ => &Region::REGIONAL,
        }
    }

    /// Whether `region` is a valid bucket key for this category.
    pub fn allows(self, region: Region) -> bool {
        self.regions().contains(&region)
    }

    /// Look a category up by its section title (exact match).
    pub fn from_title(title: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.title() == title)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

/// A geographic grouping inside a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Usa,
    Europe,
    JapanKorea,
    Aunz,
    Global,
}

impl Region {
    /// The four regional buckets used by every category except crypto.
    pub const REGIONAL: [Region; 4] = [Region::Usa, Region::Europe, Region::JapanKorea, Region::Aunz];

    pub fn key(self) -> &'static str {
        match self {
            Region::Usa => "usa",
            Region::Europe => "europe",
            Region::JapanKorea => "japan_korea",
            Region::Aunz => "aunz",
            Region::Global => "global",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::Europe => "Europe",
            Region::JapanKorea => "Japan & Korea",
            Region::Aunz => "Australia & New Zealand",
            Region::Global => "Global",
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Region::Usa => "🇺🇸",
            Region::Europe => "🇪🇺",
            Region::JapanKorea => "🇯🇵🇰🇷",
            Region::Aunz => "🇦🇺🇳🇿",
            Region::Global => "🌐",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error returned when parsing an unknown category key.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown category `{0}`")]
pub struct UnknownKey(pub String);

/// One configured RSS endpoint. Identity is the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

/// A normalized feed entry.
///
/// `title` and `summary` are HTML-stripped and length-capped by the fetcher;
/// `link` and `published` are kept verbatim (trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    pub published: String,
}

impl NewsItem {
    /// Identity used for deduplication: the link when present, otherwise the
    /// lowercased title.
    pub fn dedup_key(&self) -> String {
        let link = self.link.trim();
        if !link.is_empty() {
            format!("link:{link}")
        } else {
            format!("title:{}", self.title.trim().to_lowercase())
        }
    }
}

/// Work unit submitted to the fetch orchestrator. Exists only during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub category: Category,
    pub region: Region,
    pub source_name: String,
    pub url: String,
}

/// Raised when an item is pushed into a region its category does not own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BucketError {
    #[error("region `{region}` is not valid for category `{category}`")]
    InvalidRegion { category: Category, region: Region },
    #[error("category `{0}` was not selected for this run")]
    CategoryNotSelected(Category),
}

/// News grouped by category, then region.
///
/// The structure is created for a fixed set of categories and pre-populates
/// every region the category allows, so the key space is closed: pushing to a
/// (category, region) pair outside of it is an error rather than a new entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Buckets {
    inner: BTreeMap<Category, BTreeMap<Region, Vec<NewsItem>>>,
}

impl Buckets {
    /// Create empty buckets for the given categories.
    pub fn new(categories: &[Category]) -> Self {
        let inner = categories
            .iter()
            .map(|&category| {
                let regions = category.regions().iter().map(|&r| (r, Vec::new())).collect();
                (category, regions)
            })
            .collect();
        Self { inner }
    }

    /// Create empty buckets for every category.
    #[cfg(test)]
    pub fn all() -> Self {
        Self::new(&Category::ALL)
    }

    /// Append items to one bucket, preserving their order.
    pub fn extend(
        &mut self,
        category: Category,
        region: Region,
        items: impl IntoIterator<Item = NewsItem>,
    ) -> Result<(), BucketError> {
        if !category.allows(region) {
            return Err(BucketError::InvalidRegion { category, region });
        }
        let regions = self
            .inner
            .get_mut(&category)
            .ok_or(BucketError::CategoryNotSelected(category))?;
        regions.entry(region).or_default().extend(items);
        Ok(())
    }

    /// Items of one bucket, empty when the bucket is absent.
    pub fn items(&self, category: Category, region: Region) -> &[NewsItem] {
        self.inner
            .get(&category)
            .and_then(|regions| regions.get(&region))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the category was selected for this run.
    #[cfg(test)]
    pub fn contains(&self, category: Category) -> bool {
        self.inner.contains_key(&category)
    }

    /// Selected categories in catalog order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.inner.keys().copied()
    }

    /// Number of items in one category across all its regions.
    pub fn category_len(&self, category: Category) -> usize {
        self.inner
            .get(&category)
            .map(|regions| regions.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Total number of items across every bucket.
    pub fn total(&self) -> usize {
        self.inner.keys().map(|&c| self.category_len(c)).sum()
    }

    /// Iterate every bucket in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, Region, &[NewsItem])> + '_ {
        self.inner.iter().flat_map(|(&category, regions)| {
            category
                .regions()
                .iter()
                .filter_map(move |region| regions.get(region).map(|items| (category, *region, items.as_slice())))
        })
    }

    /// Replace the items of every bucket with the result of `f`.
    pub(crate) fn map_buckets(self, mut f: impl FnMut(Vec<NewsItem>) -> Vec<NewsItem>) -> Self {
        let inner = self
            .inner
            .into_iter()
            .map(|(category, regions)| {
                let regions = regions.into_iter().map(|(region, items)| (region, f(items))).collect();
                (category, regions)
            })
            .collect();
        Self { inner }
    }
}

/// A flattened news item with a sequential id, used for topic selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub category: Category,
    pub region: Region,
    pub source: String,
    pub title: String,
    pub summary: String,
    pub link: String,
}

#[cfg(test)]
pub(crate) fn item(title: &str, link: &str, source: &str) -> NewsItem {
    NewsItem {
        title: title.to_string(),
        link: link.to_string(),
        summary: format!("Summary of {title}"),
        source: source.to_string(),
        published: String::new(),
    }
}
