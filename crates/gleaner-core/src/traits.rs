use futures::future::BoxFuture;

use crate::config::{LoaderConfig, ModelConfig};
use crate::error::Result;
use crate::types::*;

/// Answer-generation capability: one prompt in, text or a structured value out.
pub trait LlmClient: Send + Sync + 'static {
    /// What this backend can do. Drives parser and template selection.
    fn capabilities(&self) -> Capabilities;

    /// Invoke the model once.
    ///
    /// When `request.structured` is set the backend must return
    /// `Generation::Structured`; otherwise it returns raw text.
    fn generate(
        &self,
        config: &ModelConfig,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<Generation>>;
}

/// Retrieves raw document content.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch a URL or read a local path.
    fn fetch(&self, source: &str, options: &LoaderConfig) -> BoxFuture<'_, Result<String>>;
}

/// Converts documents to text and splits them into chunks.
pub trait DocumentParser: Send + Sync + 'static {
    /// Convert `documents` and split them into ordered chunks of at most
    /// `chunk_size` tokens.
    fn parse(&self, documents: &[String], chunk_size: usize) -> Result<Vec<String>>;
}
