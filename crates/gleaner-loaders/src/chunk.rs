use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::debug;

use gleaner_core::error::Result;
use gleaner_core::traits::DocumentParser;

use crate::markdown::to_markdown;

/// Get or initialize the tokenizer for cl100k_base.
fn tokenizer() -> &'static CoreBPE {
    static TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();
    TOKENIZER.get_or_init(|| {
        tiktoken_rs::cl100k_base().expect("Failed to load cl100k_base tokenizer")
    })
}

/// Token count using BPE tokenization (cl100k_base).
pub fn count_tokens(text: &str) -> usize {
    tokenizer().encode_ordinary(text).len()
}

/// Characters examined per budget token when searching for a hard-split point.
const MAX_CHARS_PER_TOKEN: usize = 8;

/// A piece of text and how it attaches to the piece before it.
struct Unit {
    text: String,
    /// Continues the previous unit mid-line; joined without a separator.
    glued: bool,
}

/// Split `text` into ordered pieces of at most `chunk_size` tokens.
///
/// Paragraph boundaries are preferred, then line boundaries; a single line
/// larger than the budget is cut on character boundaries.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for unit in split_units(text, chunk_size) {
        let separator = if unit.glued { "" } else { "\n\n" };
        if !current.is_empty() {
            let candidate = format!("{}{}{}", current, separator, unit.text);
            if count_tokens(&candidate) <= chunk_size {
                current = candidate;
                continue;
            }
            chunks.push(std::mem::take(&mut current));
        }
        current = unit.text;
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break text into units no larger than `chunk_size` tokens each.
fn split_units(text: &str, chunk_size: usize) -> Vec<Unit> {
    let mut units = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if count_tokens(paragraph) <= chunk_size {
            units.push(Unit {
                text: paragraph.to_string(),
                glued: false,
            });
            continue;
        }
        for line in paragraph.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let pieces = if count_tokens(line) <= chunk_size {
                vec![line.to_string()]
            } else {
                split_by_tokens(line, chunk_size)
            };
            units.extend(pieces.into_iter().enumerate().map(|(i, text)| Unit {
                text,
                glued: i > 0,
            }));
        }
    }
    units
}

/// Hard split on character boundaries, each piece within `chunk_size` tokens.
///
/// The pieces concatenate back to `text`.
fn split_by_tokens(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (head, tail) = rest.split_at(prefix_within(rest, chunk_size));
        pieces.push(head.to_string());
        rest = tail;
    }
    pieces
}

/// Byte length of the longest character-aligned prefix within `budget` tokens.
///
/// Always covers at least one character.
fn prefix_within(text: &str, budget: usize) -> usize {
    let ends: Vec<usize> = text
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take(budget.saturating_mul(MAX_CHARS_PER_TOKEN).max(1))
        .collect();
    let fits = |k: usize| count_tokens(&text[..ends[k]]) <= budget;

    if ends.len() <= 1 || !fits(0) {
        return ends.first().copied().unwrap_or(text.len());
    }
    let (mut lo, mut hi) = (0, ends.len() - 1);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    ends[lo]
}

/// Parse collaborator: HTML→Markdown followed by token-budgeted chunking.
#[derive(Debug, Default, Clone)]
pub struct MarkdownChunker;

impl MarkdownChunker {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for MarkdownChunker {
    fn parse(&self, documents: &[String], chunk_size: usize) -> Result<Vec<String>> {
        let text = documents
            .iter()
            .map(|d| to_markdown(d))
            .collect::<Vec<_>>()
            .join("\n\n");

        let chunks = chunk_text(&text, chunk_size);
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size,
            "Document parsed"
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens() {
        // cl100k_base: "hello" is a single token
        assert_eq!(count_tokens("hello"), 1);
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn test_small_text_is_one_chunk() {
        let chunks = chunk_text("first paragraph\n\nsecond paragraph", 100);
        assert_eq!(chunks, vec!["first paragraph\n\nsecond paragraph"]);
    }

    #[test]
    fn test_empty_text_yields_one_empty_chunk() {
        assert_eq!(chunk_text("", 100), vec![String::new()]);
    }

    #[test]
    fn test_chunks_respect_budget_and_order() {
        let paragraphs: Vec<String> = (0..40)
            .map(|i| format!("Paragraph number {i} talks about the lagoon."))
            .collect();
        let text = paragraphs.join("\n\n");

        let chunks = chunk_text(&text, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= 40, "chunk over budget: {chunk}");
        }
        let rejoined = chunks.join("\n\n");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_oversize_line_is_hard_split() {
        let line = "word ".repeat(500);
        let chunks = chunk_text(&line, 50);
        assert!(chunks.len() >= 10);
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= 50);
        }
    }

    #[test]
    fn test_multibyte_line_is_split_without_loss() {
        let text = "基奥贾是意大利威尼托大区的一个城市以渔业和海滩闻名".repeat(40);
        let chunks = chunk_text(&text, 7);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= 7, "chunk over budget: {chunk}");
        }
        assert_eq!(chunks.concat(), text);

        let emoji = "🏖️🐟⛪ spiaggia è bella ".repeat(30);
        let pieces = split_by_tokens(emoji.trim(), 3);
        assert_eq!(pieces.concat(), emoji.trim());
    }

    #[test]
    fn test_parser_converts_html_then_chunks() {
        let parser = MarkdownChunker::new();
        let docs = vec!["<html><body><h2>Sights</h2><p>Fish market</p></body></html>".to_string()];
        let chunks = parser.parse(&docs, 1000).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("## Sights"));
        assert!(chunks[0].contains("Fish market"));
    }
}
