use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use gleaner_core::error::Result;
use gleaner_core::types::GenerationRequest;

use super::{chunk_progress, content_chunks, fan_out, ModelStageConfig};
use crate::graph::{SharedState, Stage, StageInputs, StageSpec};
use crate::output_parser::OutputParser;
use crate::prompts::{self, TemplateFamily, SINGLE_CONTENT_PREFIX};

/// Produces the final `answer` from the question and the best available content.
///
/// A single chunk is answered with one call. With several chunks each one is
/// answered independently (bounded concurrency), then one merge call combines
/// the partial answers, given to the model in chunk order.
pub struct GenerateAnswerStage {
    spec: StageSpec,
    config: ModelStageConfig,
}

impl GenerateAnswerStage {
    pub const NAME: &'static str = "GenerateAnswer";

    pub fn new(config: ModelStageConfig) -> Result<Self> {
        Ok(Self {
            spec: StageSpec::new(
                Self::NAME,
                "user_prompt & (relevant_chunks | parsed_doc | doc)",
                &["answer"],
            )?,
            config,
        })
    }

    pub fn config(&self) -> &ModelStageConfig {
        &self.config
    }

    /// The parser this stage uses for its capability and schema.
    pub fn output_parser(&self) -> OutputParser {
        OutputParser::select(self.config.llm.capabilities(), self.config.schema.as_ref())
    }

    pub fn template_family(&self) -> TemplateFamily {
        TemplateFamily::select(
            self.config.markdown_content,
            self.config.force,
            self.config.script_creator,
        )
    }

    async fn invoke(&self, parser: &OutputParser, request: GenerationRequest) -> Result<Value> {
        let generation = self
            .config
            .llm
            .generate(&self.config.model, parser.prepare(request))
            .await?;
        parser.parse(generation)
    }
}

impl Stage for GenerateAnswerStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    fn execute(&self, inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>> {
        Box::pin(async move {
            let question = inputs.value(self.name(), 0)?.as_str().unwrap_or_default().to_string();
            let chunks = content_chunks(inputs.value(self.name(), 1)?);
            let total = chunks.len();

            let parser = self.output_parser();
            let instructions = parser.format_instructions();
            let family = self.template_family();
            let templates = family.templates(self.config.additional_info.as_deref());
            debug!(
                parser = parser.strategy(),
                family = ?family,
                from = inputs.key(1).unwrap_or_default(),
                chunks = total,
                "Answer strategy selected"
            );

            let answer = if total == 1 {
                let system = prompts::render(&templates.no_chunks, &instructions, &question);
                let user = format!("{}{}", SINGLE_CONTENT_PREFIX, chunks[0]);
                self.invoke(&parser, GenerationRequest::new(system, user)).await?
            } else {
                info!(
                    chunks = total,
                    max_concurrency = self.config.max_concurrency,
                    "Answering chunks"
                );
                let system = prompts::render(&templates.chunks, &instructions, &question);
                let progress = chunk_progress(self.config.verbose, total, "Answering chunks");
                let partials = fan_out(
                    chunks,
                    self.config.max_concurrency,
                    &progress,
                    |index, chunk| {
                        let request = GenerationRequest::new(
                            system.clone(),
                            prompts::chunk_content(index + 1, &chunk),
                        );
                        self.invoke(&parser, request)
                    },
                )
                .await?;

                debug!(partials = partials.len(), "Merging partial answers");
                let context = serde_json::to_string(&partials)?;
                let system = prompts::render(&templates.merge, &instructions, &question);
                self.invoke(&parser, GenerationRequest::new(system, prompts::merge_content(&context)))
                    .await?
            };

            Ok(SharedState::new().with("answer", answer))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gleaner_core::config::ModelConfig;
    use gleaner_core::error::ErrorKind;
    use gleaner_core::types::{Capabilities, OutputSchema};
    use gleaner_test_utils::MockLlm;
    use serde_json::json;

    use super::*;

    fn config(llm: Arc<MockLlm>) -> ModelStageConfig {
        ModelStageConfig::new(llm, ModelConfig::new("mock", "mock-1"))
    }

    fn inputs(stage: &GenerateAnswerStage, content: Value) -> StageInputs {
        let state = SharedState::new()
            .with("user_prompt", json!("List the attractions"))
            .with("doc", content);
        StageInputs::resolve(stage.spec(), &state).unwrap()
    }

    fn schema() -> OutputSchema {
        OutputSchema::new(
            "Attractions",
            json!({
                "type": "object",
                "required": ["attractions"],
                "properties": { "attractions": { "type": "array" } }
            }),
        )
    }

    #[tokio::test]
    async fn test_single_chunk_one_call() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(false, true)).default_reply(r#"{"attractions": ["Duomo"]}"#),
        );
        let stage = GenerateAnswerStage::new(config(llm.clone())).unwrap();

        let out = stage.execute(inputs(&stage, json!(["page"]))).await.unwrap();
        assert_eq!(out.get("answer"), Some(&json!({"attractions": ["Duomo"]})));
        assert_eq!(llm.call_count(), 1);

        let calls = llm.calls();
        let call = &calls[0];
        assert_eq!(call.user_text(), "The following is the website content:\npage");
        assert!(call.system_text().contains("OUTPUT INSTRUCTIONS: Return a JSON object."));
        assert!(call.system_text().contains("QUESTION: List the attractions"));
        assert!(call.structured.is_none());
    }

    #[tokio::test]
    async fn test_verbose_run_with_progress() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(false, false))
                .default_reply("part")
                .reply_on_call(4, "merged"),
        );
        let mut cfg = config(llm.clone());
        cfg.verbose = true;
        cfg.max_concurrency = 1;
        let stage = GenerateAnswerStage::new(cfg).unwrap();

        let out = stage.execute(inputs(&stage, json!(["a", "b", "c"]))).await.unwrap();
        assert_eq!(out.get("answer"), Some(&json!("merged")));

        let calls = llm.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].user_text(), "Content of 1:\na");
        assert_eq!(calls[2].user_text(), "Content of 3:\nc");
        assert_eq!(
            calls[3].user_text(),
            "Here are all the chunks:\n[\"part\",\"part\",\"part\"]"
        );
    }

    #[tokio::test]
    async fn test_map_merge_calls_and_order() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(false, true))
                .reply_when("Content of 1:", r#"{"part": 1}"#)
                .reply_when("Content of 2:", r#"{"part": 2}"#)
                .reply_when("Content of 3:", r#"{"part": 3}"#)
                .reply_when("Here are all the chunks:", r#"{"merged": true}"#)
                .delay_when("Content of 1:", 30)
                .delay_when("Content of 2:", 15),
        );
        let mut cfg = config(llm.clone());
        cfg.max_concurrency = 3;
        let stage = GenerateAnswerStage::new(cfg).unwrap();

        let out = stage.execute(inputs(&stage, json!(["a", "b", "c"]))).await.unwrap();
        assert_eq!(out.get("answer"), Some(&json!({"merged": true})));
        assert_eq!(llm.call_count(), 4);

        let calls = llm.calls();
        let merge = calls.last().unwrap();
        assert_eq!(
            merge.user_text(),
            r#"Here are all the chunks:
[{"part":1},{"part":2},{"part":3}]"#
        );
        assert!(merge.system_text().contains("Merge the partial answers"));
    }

    #[tokio::test]
    async fn test_chunk_failure_skips_merge() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(false, true))
                .default_reply("{}")
                .fail_when("Content of 2:", "HTTP 500"),
        );
        let stage = GenerateAnswerStage::new(config(llm.clone())).unwrap();

        let err = stage.execute(inputs(&stage, json!(["a", "b", "c"]))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(err.to_string().starts_with("Chunk 2/3 failed"));
        assert!(llm
            .calls()
            .iter()
            .all(|c| !c.user_text().starts_with("Here are all the chunks:")));
    }

    #[tokio::test]
    async fn test_native_mode_sends_schema() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(true, true)).default_reply(r#"{"attractions": []}"#),
        );
        let mut cfg = config(llm.clone());
        cfg.schema = Some(schema());
        let stage = GenerateAnswerStage::new(cfg).unwrap();
        assert_eq!(stage.output_parser().strategy(), "native");

        stage.execute(inputs(&stage, json!("page"))).await.unwrap();
        let calls = llm.calls();
        let call = &calls[0];
        assert_eq!(call.structured.as_ref().map(|s| s.name.as_str()), Some("Attractions"));
        assert!(call.system_text().contains("OUTPUT INSTRUCTIONS: NA"));
    }

    #[tokio::test]
    async fn test_schema_mode_rejects_invalid_answer() {
        let llm = Arc::new(
            MockLlm::new(Capabilities::new(false, true)).default_reply(r#"{"other": 1}"#),
        );
        let mut cfg = config(llm.clone());
        cfg.schema = Some(schema());
        let stage = GenerateAnswerStage::new(cfg).unwrap();

        let err = stage.execute(inputs(&stage, json!("page"))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseValidation);
        assert!(llm.calls()[0].system_text().contains("\"attractions\""));
    }

    #[tokio::test]
    async fn test_raw_mode_returns_text() {
        let llm = Arc::new(MockLlm::new(Capabilities::new(false, false)).default_reply("Duomo, Vigo"));
        let stage = GenerateAnswerStage::new(config(llm.clone())).unwrap();

        let out = stage.execute(inputs(&stage, json!("page"))).await.unwrap();
        assert_eq!(out.get("answer"), Some(&json!("Duomo, Vigo")));
        assert!(llm.calls()[0].system_text().contains("OUTPUT INSTRUCTIONS: \n"));
    }

    #[tokio::test]
    async fn test_template_family_and_additional_info() {
        let llm = Arc::new(MockLlm::new(Capabilities::new(false, true)).default_reply("{}"));
        let mut cfg = config(llm.clone());
        cfg.markdown_content = true;
        cfg.additional_info = Some("Answer in Italian.\n".into());
        let stage = GenerateAnswerStage::new(cfg).unwrap();
        assert_eq!(stage.template_family(), TemplateFamily::Markdown);

        stage.execute(inputs(&stage, json!("page"))).await.unwrap();
        let system = llm.calls()[0].system_text().to_string();
        assert!(system.starts_with("Answer in Italian.\n"));
        assert!(system.contains("converted it to Markdown"));
    }
}
