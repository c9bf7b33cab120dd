//! The concrete pipeline stages.

pub mod fetch;
pub mod generate_answer;
pub mod parse;
pub mod reasoning;

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use gleaner_core::config::ModelConfig;
use gleaner_core::error::{GleanerError, Result};
use gleaner_core::traits::LlmClient;
use gleaner_core::types::OutputSchema;

pub use fetch::FetchStage;
pub use generate_answer::GenerateAnswerStage;
pub use parse::ParseStage;
pub use reasoning::ReasoningStage;

/// Settings shared by the stages that call the answer-generation capability.
#[derive(Clone)]
pub struct ModelStageConfig {
    pub llm: Arc<dyn LlmClient>,
    pub model: ModelConfig,
    pub schema: Option<OutputSchema>,
    /// Prepended to every prompt template.
    pub additional_info: Option<String>,
    /// Content reaching the stage was converted to Markdown.
    pub markdown_content: bool,
    pub force: bool,
    pub script_creator: bool,
    pub verbose: bool,
    /// Upper bound on concurrent per-chunk calls.
    pub max_concurrency: usize,
}

impl ModelStageConfig {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self {
            llm,
            model,
            schema: None,
            additional_info: None,
            markdown_content: false,
            force: false,
            script_creator: false,
            verbose: false,
            max_concurrency: 4,
        }
    }
}

impl std::fmt::Debug for ModelStageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStageConfig")
            .field("model", &self.model.model_id)
            .field("capabilities", &self.llm.capabilities())
            .field("schema", &self.schema.as_ref().map(|s| &s.name))
            .field("markdown_content", &self.markdown_content)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

/// Normalize a content value into an ordered list of chunks.
///
/// A string is one chunk; an array yields one chunk per element. The result
/// is never empty.
pub(crate) fn content_chunks(value: &Value) -> Vec<String> {
    let chunks: Vec<String> = match value {
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    };
    if chunks.is_empty() {
        vec![String::new()]
    } else {
        chunks
    }
}

/// Progress bar over a chunk loop; hidden unless `verbose`.
pub(crate) fn chunk_progress(verbose: bool, total: usize, label: &str) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label.to_string());
    bar
}

/// Run `task` over every item with at most `max_concurrency` in flight.
///
/// Results come back in item order whatever the completion order. The first
/// failure is returned tagged with its 1-based chunk position, and the
/// remaining in-flight calls are dropped.
pub(crate) async fn fan_out<T, F, Fut>(
    items: Vec<String>,
    max_concurrency: usize,
    progress: &ProgressBar,
    task: F,
) -> Result<Vec<T>>
where
    F: Fn(usize, String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = items.len();
    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();

    let mut results = stream::iter(items.into_iter().enumerate().map(|(index, item)| {
        let call = task(index, item);
        async move { (index, call.await) }
    }))
    .buffer_unordered(max_concurrency.max(1));

    while let Some((index, result)) = results.next().await {
        match result {
            Ok(value) => {
                slots[index] = Some(value);
                progress.inc(1);
            }
            Err(e) => {
                progress.abandon();
                return Err(e.in_chunk(index + 1, total));
            }
        }
    }
    progress.finish_and_clear();

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                GleanerError::Generation(format!("chunk {}/{} produced no result", index + 1, total))
            })
        })
        .collect()
}
