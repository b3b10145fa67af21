//! Minimal Markdown → HTML rendering for email bodies.
//!
//! Only what the digests use: `##`/`###` headings, `**bold**` and line
//! breaks. Text is HTML-escaped before markup is applied.

use once_cell::sync::Lazy;
use regex::Regex;

static H2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^## (.+)$").expect("static regex"));
static H3: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^### (.+)$").expect("static regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("static regex"));

const STYLE: &str = "body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;\
line-height:1.6;max-width:800px;margin:0 auto;padding:20px;color:#333}\
h2{color:#2c3e50;border-bottom:2px solid #3498db;padding-bottom:10px;margin-top:30px}\
strong{color:#2980b9}";

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Render the Markdown fragment without the surrounding document.
pub fn markdown_fragment(md: &str) -> String {
    let text = escape_html(&md.replace("\r\n", "\n"));
    let text = H2.replace_all(&text, "<h2>$1</h2>");
    let text = H3.replace_all(&text, "<h3>$1</h3>");
    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    text.replace('\n', "<br>\n")
}

/// Render a full HTML document for an email body.
pub fn markdown_to_html(md: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>{STYLE}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        markdown_fragment(md)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_bold_and_breaks() {
        let html = markdown_fragment("## 💰 Finance\n### Sub\n**Fed** holds");
        assert_eq!(
            html,
            "<h2>💰 Finance</h2><br>\n<h3>Sub</h3><br>\n<strong>Fed</strong> holds"
        );
    }

    #[test]
    fn test_escapes_markup_in_text() {
        let html = markdown_fragment("a <script> & b");
        assert_eq!(html, "a &lt;script&gt; &amp; b");
    }

    #[test]
    fn test_full_document_wraps_body() {
        let html = markdown_to_html("hello");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<body>\nhello\n</body>"));
    }
}
