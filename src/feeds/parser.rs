//! RSS 2.0 / RSS 1.0 (RDF) / Atom parsing through `feed-rs`.
//!
//! The body is handed over as raw bytes so the XML encoding declaration is
//! honoured. Entries are flattened into [`RawEntry`] with field fallbacks
//! (summary before content, published before updated).

use feed_rs::model::{Entry, Link};
use feed_rs::parser::{self, ParseFeedError};

/// One feed entry before normalization. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub published: Option<String>,
}

impl From<Entry> for RawEntry {
    fn from(e: Entry) -> Self {
        let link = primary_link(&e.links).map(|l| l.href.clone());
        let summary = first_present([
            e.summary.map(|t| t.content),
            e.content.and_then(|c| c.body),
        ]);
        RawEntry {
            title: e.title.map(|t| t.content),
            link,
            summary,
            published: e.published.or(e.updated).map(|d| d.to_rfc3339()),
        }
    }
}

/// Prefer the `alternate` (or unlabelled) link over enclosures and self links.
fn primary_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates.into_iter().flatten().find(|s| !s.trim().is_empty())
}

/// Parse a feed body into raw entries in document order.
///
/// # Errors
///
/// Returns the `feed-rs` error when the body does not resemble any supported
/// feed dialect. Callers treat that as an empty feed.
pub fn parse_feed(body: &[u8]) -> Result<Vec<RawEntry>, ParseFeedError> {
    let feed = parser::parse(body)?;
    Ok(feed.entries.into_iter().map(RawEntry::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Markets</title>
    <link>https://example.com</link>
    <item>
      <title>Stocks rally &amp; bonds slip</title>
      <link>https://example.com/a</link>
      <description><![CDATA[<p>Equities <b>up</b>.</p>]]></description>
      <pubDate>Mon, 06 Jan 2025 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second story</title>
      <link>https://example.com/b</link>
    </item>
  </channel>
</rss>"#;

    const RDF: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://example.jp/">
    <title>JP</title>
    <link>https://example.jp/</link>
    <description>Japan</description>
  </channel>
  <item rdf:about="https://example.jp/1">
    <title>Nikkei closes higher</title>
    <link>https://example.jp/1</link>
    <description>Tokyo shares</description>
  </item>
</rdf:RDF>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Tech</title>
  <id>urn:example:tech</id>
  <updated>2025-01-06T10:00:00Z</updated>
  <entry>
    <title>New chip announced</title>
    <id>urn:example:chip</id>
    <link rel="alternate" href="https://example.org/chip"/>
    <link rel="enclosure" href="https://example.org/chip.jpg"/>
    <content type="html">&lt;p&gt;Faster&lt;/p&gt;</content>
    <updated>2025-01-06T10:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parses_rss2_items_in_order() {
        let entries = parse_feed(RSS2.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Stocks rally & bonds slip"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/a"));
        assert!(entries[0].summary.as_deref().unwrap().contains("Equities"));
        assert_eq!(entries[0].published.as_deref(), Some("2025-01-06T08:00:00+00:00"));
        assert_eq!(entries[1].title.as_deref(), Some("Second story"));
        assert_eq!(entries[1].summary, None);
    }

    #[test]
    fn test_parses_rdf_items() {
        let entries = parse_feed(RDF.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("Nikkei closes higher"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.jp/1"));
    }

    #[test]
    fn test_parses_atom_with_content_and_updated_fallbacks() {
        let entries = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link.as_deref(), Some("https://example.org/chip"));
        assert!(entries[0].summary.as_deref().unwrap().contains("Faster"));
        assert_eq!(entries[0].published.as_deref(), Some("2025-01-06T10:00:00+00:00"));
    }

    #[test]
    fn test_namespaced_children_do_not_drop_items() {
        let body = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Wire</title>
    <atom:link href="https://wire.test/rss" rel="self" type="application/rss+xml"/>
    <item>
      <title>Rates on hold</title>
      <link>https://wire.test/1</link>
      <media:title>Photo caption</media:title>
    </item>
    <item>
      <title>Oil slides</title>
      <link>https://wire.test/2</link>
      <atom:link href="https://wire.test/2/amp" rel="amphtml"/>
    </item>
  </channel>
</rss>"#;
        let entries = parse_feed(body.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Rates on hold"));
        assert_eq!(entries[1].title.as_deref(), Some("Oil slides"));
    }

    #[test]
    fn test_html_entity_in_title_keeps_the_entry() {
        let body = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>EU</title>
  <item><title>Caf&eacute; prices climb</title><link>https://eu.test/1</link></item>
</channel></rss>"#;
        let entries = parse_feed(body.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link.as_deref(), Some("https://eu.test/1"));
    }

    #[test]
    fn test_bare_ampersand_in_title_keeps_the_entry() {
        let body = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>US</title>
  <item><title>AT&T earnings beat</title><link>https://us.test/1</link></item>
</channel></rss>"#;
        let entries = parse_feed(body.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link.as_deref(), Some("https://us.test/1"));
    }

    #[test]
    fn test_html_page_is_an_error() {
        assert!(parse_feed(b"<html><body>Service unavailable</body></html>").is_err());
    }
}
