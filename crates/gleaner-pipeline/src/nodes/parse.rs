use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use gleaner_core::error::Result;
use gleaner_core::traits::DocumentParser;

use super::content_chunks;
use crate::graph::{SharedState, Stage, StageInputs, StageSpec};

/// Converts `doc` into token-bounded chunks under `parsed_doc`.
pub struct ParseStage {
    spec: StageSpec,
    parser: Arc<dyn DocumentParser>,
    chunk_size: usize,
}

impl ParseStage {
    pub const NAME: &'static str = "Parse";

    pub fn new(parser: Arc<dyn DocumentParser>, chunk_size: usize) -> Result<Self> {
        Ok(Self {
            spec: StageSpec::new(Self::NAME, "doc", &["parsed_doc"])?,
            parser,
            chunk_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Stage for ParseStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    fn execute(&self, inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>> {
        Box::pin(async move {
            let documents = content_chunks(inputs.value(self.name(), 0)?);
            let chunks = self.parser.parse(&documents, self.chunk_size)?;
            info!(
                documents = documents.len(),
                chunks = chunks.len(),
                chunk_size = self.chunk_size,
                "Document parsed"
            );
            Ok(SharedState::new().with("parsed_doc", serde_json::json!(chunks)))
        })
    }
}
