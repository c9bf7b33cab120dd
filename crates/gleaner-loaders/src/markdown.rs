//! HTML cleanup and HTML→Markdown conversion.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static NOISE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("valid noise regex")
});

static HTML_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(!doctype|html|head|body|div|p|span|a|table|ul|ol|h[1-6])[\s>/]")
        .expect("valid html marker regex")
});

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank-run regex"));

/// Heuristic: does this content contain HTML markup?
pub fn looks_like_html(content: &str) -> bool {
    HTML_MARKER.is_match(content)
}

/// Remove script, style and noscript blocks.
pub fn cut_noise(html: &str) -> String {
    NOISE_BLOCKS.replace_all(html, "").into_owned()
}

/// Convert HTML to Markdown. Plain text passes through untouched.
pub fn to_markdown(content: &str) -> String {
    if !looks_like_html(content) {
        return content.to_string();
    }

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();

    match converter.convert(content) {
        Ok(markdown) => BLANK_RUNS.replace_all(markdown.trim(), "\n\n").into_owned(),
        Err(e) => {
            warn!(error = %e, "htmd conversion failed, using stripped content");
            cut_noise(content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(looks_like_html("intro <p>para</p>"));
        assert!(!looks_like_html("a < b and c > d"));
        assert!(!looks_like_html("# Heading\n\nplain markdown"));
    }

    #[test]
    fn test_cut_noise() {
        let html = "<div>keep</div><SCRIPT type=\"x\">drop()</SCRIPT><style>.a{}</style>";
        assert_eq!(cut_noise(html), "<div>keep</div>");
    }

    #[test]
    fn test_to_markdown_converts_headings() {
        let md = to_markdown("<html><body><h1>Chioggia</h1><p>A town.</p></body></html>");
        assert!(md.contains("# Chioggia"));
        assert!(md.contains("A town."));
    }

    #[test]
    fn test_to_markdown_passes_plain_text() {
        assert_eq!(to_markdown("just text"), "just text");
    }
}
