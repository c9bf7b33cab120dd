//! Fetch and parse collaborators for the scraping pipeline.
//!
//! `HttpFetcher` retrieves raw content from a URL or a local path;
//! `MarkdownChunker` converts it to Markdown and splits it into
//! token-budgeted chunks.

pub mod chunk;
pub mod fetch;
pub mod markdown;

pub use chunk::{chunk_text, count_tokens, MarkdownChunker};
pub use fetch::{has_url_scheme, HttpFetcher};
