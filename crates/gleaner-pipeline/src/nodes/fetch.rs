use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use gleaner_core::config::LoaderConfig;
use gleaner_core::error::{GleanerError, Result};
use gleaner_core::traits::Fetcher;

use crate::graph::{SharedState, Stage, StageInputs, StageSpec};

/// Retrieves the source document into `doc`.
pub struct FetchStage {
    spec: StageSpec,
    fetcher: Arc<dyn Fetcher>,
    options: LoaderConfig,
}

impl FetchStage {
    pub const NAME: &'static str = "Fetch";

    pub fn new(fetcher: Arc<dyn Fetcher>, options: LoaderConfig) -> Result<Self> {
        Ok(Self {
            spec: StageSpec::new(Self::NAME, "url | local_dir", &["doc"])?,
            fetcher,
            options,
        })
    }
}

impl Stage for FetchStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    fn execute(&self, inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>> {
        Box::pin(async move {
            let source = inputs
                .value(self.name(), 0)?
                .as_str()
                .ok_or_else(|| GleanerError::Fetch("source locator is not a string".into()))?
                .to_string();

            let content = self.fetcher.fetch(&source, &self.options).await?;
            info!(
                source = %source,
                from = inputs.key(0).unwrap_or_default(),
                bytes = content.len(),
                "Document fetched"
            );

            Ok(SharedState::new().with("doc", serde_json::json!([content])))
        })
    }
}
