//! Plain-text brief handed to the summarizer.
//!
//! The brief is a fixed-order document: one `=== Title ===` section per
//! non-empty category, region sub-sections introduced by `--- flag Region ---`
//! (crypto is a flat list), and numbered `N. [source] title` lines each
//! followed by an indented summary. [`split_sections`] reverses the top level
//! of that layout so the chunked summarizer can work per category.

use crate::models::{Buckets, Category, NewsItem, Region};
use std::collections::BTreeMap;

/// Header line that opens a category section.
pub fn section_header(category: Category) -> String {
    format!("=== {} ===", category.title())
}

fn region_header(region: Region) -> String {
    format!("--- {} {} ---", region.flag(), region.title())
}

fn render_items(items: &[NewsItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mut entry = format!("{}. [{}] {}", i + 1, item.source, item.title);
            if !item.summary.trim().is_empty() {
                entry.push_str("\n   ");
                entry.push_str(item.summary.trim());
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Body of one category section, without its header.
///
/// Empty when the category has no items or was not selected.
pub fn category_body(buckets: &Buckets, category: Category) -> String {
    if category == Category::Crypto {
        let items = buckets.items(category, Region::Global);
        return render_items(items).trim().to_string();
    }
    category
        .regions()
        .iter()
        .filter_map(|&region| {
            let items = buckets.items(category, region);
            (!items.is_empty()).then(|| format!("{}\n{}", region_header(region), render_items(items)))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

/// Render the whole brief in catalog order, skipping empty categories.
pub fn format_for_summary(buckets: &Buckets) -> String {
    let sections: Vec<String> = Category::ALL
        .into_iter()
        .filter_map(|category| {
            let body = category_body(buckets, category);
            (!body.is_empty()).then(|| format!("{}\n\n{}", section_header(category), body))
        })
        .collect();
    if sections.is_empty() {
        String::new()
    } else {
        format!("{}\n", sections.join("\n\n"))
    }
}

/// Split a brief back into per-category bodies.
///
/// Only lines that exactly match a [`section_header`] start a new section.
/// Every category is present in the result; categories without a section map
/// to an empty string.
pub fn split_sections(text: &str) -> BTreeMap<Category, String> {
    let mut sections: BTreeMap<Category, Vec<&str>> = Category::ALL.into_iter().map(|c| (c, Vec::new())).collect();
    let mut current: Option<Category> = None;

    for line in text.lines() {
        let header = line
            .trim_end()
            .strip_prefix("=== ")
            .and_then(|l| l.strip_suffix(" ==="))
            .and_then(Category::from_title);
        match (header, current) {
            (Some(category), _) => current = Some(category),
            (None, Some(category)) => {
                if let Some(lines) = sections.get_mut(&category) {
                    lines.push(line);
                }
            }
            (None, None) => {}
        }
    }

    sections
        .into_iter()
        .map(|(category, lines)| (category, lines.join("\n").trim().to_string()))
        .collect()
}
