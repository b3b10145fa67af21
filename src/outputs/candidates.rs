//! Flattened, numbered view of the buckets used for topic selection.

use crate::models::{Buckets, Candidate};
use crate::utils::{clean_text, truncate_chars};

/// Characters of summary shown per candidate in the planning prompt.
const CANDIDATE_SUMMARY_CHARS: usize = 260;

/// Number every titled item as `N001`, `N002`, ... in catalog order.
///
/// Items whose title is blank are skipped and do not consume an id.
pub fn flatten_candidates(buckets: &Buckets) -> Vec<Candidate> {
    buckets
        .iter()
        .flat_map(|(category, region, items)| items.iter().map(move |item| (category, region, item)))
        .filter(|(_, _, item)| !item.title.trim().is_empty())
        .enumerate()
        .map(|(idx, (category, region, item))| Candidate {
            id: format!("N{:03}", idx + 1),
            category,
            region,
            source: item.source.trim().to_string(),
            title: item.title.trim().to_string(),
            summary: item.summary.trim().to_string(),
            link: item.link.trim().to_string(),
        })
        .collect()
}

/// Render candidates as prompt input, one block per candidate.
pub fn render_candidates(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            let summary = truncate_chars(&clean_text(&c.summary, usize::MAX), CANDIDATE_SUMMARY_CHARS);
            format!(
                "{} | {}/{} | {} | {}\nSummary: {}\nLink: {}",
                c.id, c.category, c.region, c.source, c.title, summary, c.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Region, item};

    #[test]
    fn test_ids_are_sequential_across_buckets_and_skip_blank_titles() {
        let mut buckets = Buckets::all();
        buckets
            .extend(Category::Tech, Region::Europe, vec![item("T1", "https://x/t1", "s")])
            .unwrap();
        buckets
            .extend(
                Category::Finance,
                Region::Usa,
                vec![item("F1", "https://x/f1", "s"), item("  ", "https://x/blank", "s"), item("F2", "", "s")],
            )
            .unwrap();

        let candidates = flatten_candidates(&buckets);
        let ids: Vec<(&str, &str)> = candidates.iter().map(|c| (c.id.as_str(), c.title.as_str())).collect();
        assert_eq!(ids, vec![("N001", "F1"), ("N002", "F2"), ("N003", "T1")]);
        assert_eq!(candidates[2].category, Category::Tech);
        assert_eq!(candidates[2].region, Region::Europe);
    }

    #[test]
    fn test_render_caps_summary() {
        let mut it = item("Chip", "https://x/c", "Src");
        it.summary = "x".repeat(400);
        let mut buckets = Buckets::all();
        buckets.extend(Category::Tech, Region::Usa, vec![it]).unwrap();
        let text = render_candidates(&flatten_candidates(&buckets));
        assert!(text.starts_with("N001 | tech/usa | Src | Chip\nSummary: "));
        assert!(text.contains(&format!("Summary: {}\n", "x".repeat(260))));
        assert!(text.ends_with("Link: https://x/c"));
    }
}
