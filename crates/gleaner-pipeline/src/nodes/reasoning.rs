use futures::future::BoxFuture;
use tracing::{debug, info};

use gleaner_core::error::{GleanerError, Result};
use gleaner_core::types::{Generation, GenerationRequest};

use super::{chunk_progress, content_chunks, fan_out, ModelStageConfig};
use crate::graph::{SharedState, Stage, StageInputs, StageSpec};
use crate::prompts::{self, SINGLE_CONTENT_PREFIX};

/// Narrows the content down to the passages relevant to the question.
///
/// Each chunk is sent to the model, which returns the relevant passages or
/// `NA`. Chunks answered with `NA` are dropped. When every chunk is dropped
/// the content is passed through unchanged.
pub struct ReasoningStage {
    spec: StageSpec,
    config: ModelStageConfig,
}

impl ReasoningStage {
    pub const NAME: &'static str = "Reasoning";

    pub fn new(config: ModelStageConfig) -> Result<Self> {
        Ok(Self {
            spec: StageSpec::new(
                Self::NAME,
                "user_prompt & (relevant_chunks | parsed_doc | doc)",
                &["relevant_chunks"],
            )?,
            config,
        })
    }

    fn answer_hint(&self) -> String {
        match &self.config.schema {
            Some(schema) => format!(
                "a JSON object matching this schema: {}",
                serde_json::to_string(&schema.schema).unwrap_or_default()
            ),
            None => "a JSON object".to_string(),
        }
    }
}

impl Stage for ReasoningStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    fn execute(&self, inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>> {
        Box::pin(async move {
            let question = inputs.value(self.name(), 0)?.as_str().unwrap_or_default().to_string();
            let chunks = content_chunks(inputs.value(self.name(), 1)?);
            let total = chunks.len();

            let system = prompts::render(
                &prompts::reasoning_template(self.config.additional_info.as_deref()),
                &self.answer_hint(),
                &question,
            );
            info!(chunks = total, from = inputs.key(1).unwrap_or_default(), "Reasoning over content");

            let progress = chunk_progress(self.config.verbose, total, "Reasoning");
            let replies = fan_out(
                chunks.clone(),
                self.config.max_concurrency,
                &progress,
                |index, chunk| {
                    let user = if total == 1 {
                        format!("{}{}", SINGLE_CONTENT_PREFIX, chunk)
                    } else {
                        prompts::chunk_content(index + 1, &chunk)
                    };
                    let request = GenerationRequest::new(system.clone(), user);
                    async move {
                        let generation = self.config.llm.generate(&self.config.model, request).await?;
                        Ok::<_, GleanerError>(match generation {
                            Generation::Text(text) => text,
                            Generation::Structured(value) => value.to_string(),
                        })
                    }
                },
            )
            .await?;

            let relevant: Vec<String> = replies
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !is_not_found(r))
                .collect();
            debug!(kept = relevant.len(), total, "Reasoning complete");

            let output = if relevant.is_empty() { chunks } else { relevant };
            Ok(SharedState::new().with("relevant_chunks", serde_json::json!(output)))
        })
    }
}

/// Whether a reply is the not-found sentinel.
fn is_not_found(reply: &str) -> bool {
    let reply = reply.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '.');
    reply.is_empty() || reply.eq_ignore_ascii_case("NA")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gleaner_core::config::ModelConfig;
    use gleaner_core::types::Capabilities;
    use gleaner_test_utils::MockLlm;
    use serde_json::json;

    use super::*;

    fn stage(llm: Arc<MockLlm>) -> ReasoningStage {
        ReasoningStage::new(ModelStageConfig::new(llm, ModelConfig::new("mock", "mock-1"))).unwrap()
    }

    fn state(content: serde_json::Value) -> SharedState {
        SharedState::new()
            .with("user_prompt", json!("Which beaches are nearby?"))
            .with("parsed_doc", content)
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("NA"));
        assert!(is_not_found(" \"na\". "));
        assert!(is_not_found(""));
        assert!(!is_not_found("Sottomarina beach"));
    }

    #[tokio::test]
    async fn test_drops_irrelevant_chunks() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(false, true))
                .reply_when("Content of 1:", "Sottomarina beach is 2 km south.")
                .reply_when("Content of 2:", "NA")
                .reply_when("Content of 3:", "Isola Verde beach."),
        );
        let stage = stage(llm.clone());
        let inputs =
            StageInputs::resolve(stage.spec(), &state(json!(["beach", "market", "isola"]))).unwrap();

        let out = stage.execute(inputs).await.unwrap();
        assert_eq!(
            out.get("relevant_chunks"),
            Some(&json!(["Sottomarina beach is 2 km south.", "Isola Verde beach."]))
        );
        assert_eq!(llm.call_count(), 3);
        assert!(llm.calls()[0].system_text().contains("Which beaches are nearby?"));
    }

    #[tokio::test]
    async fn test_all_not_found_passes_content_through() {
        let llm = Arc::new(MockLlm::new(Capabilities::new(false, true)).default_reply("NA"));
        let stage = stage(llm);
        let inputs = StageInputs::resolve(stage.spec(), &state(json!(["a", "b"]))).unwrap();

        let out = stage.execute(inputs).await.unwrap();
        assert_eq!(out.get("relevant_chunks"), Some(&json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_single_chunk_uses_plain_prefix() {
        let llm = Arc::new(MockLlm::new(Capabilities::new(false, true)).default_reply("x"));
        let stage = stage(llm.clone());
        let inputs = StageInputs::resolve(stage.spec(), &state(json!("only"))).unwrap();

        stage.execute(inputs).await.unwrap();
        assert_eq!(llm.calls()[0].user_text(), "The following is the website content:\nonly");
    }
}
