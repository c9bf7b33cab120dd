use serde_json::Value;
use tracing::{info, warn};

use gleaner_core::config::{AppConfig, LoaderConfig, ModelConfig, ScraperConfig};
use gleaner_core::error::Result;
use gleaner_loaders::has_url_scheme;

use crate::builder::{Collaborators, PipelineBuilder, Topology};
use crate::graph::{ExecutionReport, Graph, GraphExecutor, RunFailure, SharedState};

/// Returned when a run finishes without writing `answer`.
pub const NO_ANSWER: &str = "No answer found.";

/// Answers one question about one document.
///
/// The stage graph is built once from the configuration; each [`run`]
/// starts from a fresh shared state seeded with the question and the source.
///
/// [`run`]: SmartScraper::run
pub struct SmartScraper {
    prompt: String,
    source: String,
    topology: Topology,
    executor: GraphExecutor,
    final_state: Option<SharedState>,
    report: Option<ExecutionReport>,
}

impl SmartScraper {
    pub fn new(
        prompt: impl Into<String>,
        source: impl Into<String>,
        config: &AppConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::with_parts(
            prompt,
            source,
            &config.scraper,
            &config.model,
            &config.loader,
            collaborators,
        )
    }

    pub fn with_parts(
        prompt: impl Into<String>,
        source: impl Into<String>,
        scraper: &ScraperConfig,
        model: &ModelConfig,
        loader: &LoaderConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let builder = PipelineBuilder::new(scraper, model, loader, &collaborators);
        let topology = builder.topology();
        let graph = builder.build()?;
        Ok(Self {
            prompt: prompt.into(),
            source: source.into(),
            topology,
            executor: GraphExecutor::new(graph),
            final_state: None,
            report: None,
        })
    }

    /// State key the source is seeded under: `url` for `scheme://` locators,
    /// `local_dir` otherwise.
    pub fn input_key(&self) -> &'static str {
        if has_url_scheme(&self.source) {
            "url"
        } else {
            "local_dir"
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn graph(&self) -> &Graph {
        self.executor.graph()
    }

    pub fn initial_state(&self) -> SharedState {
        SharedState::new()
            .with("user_prompt", Value::String(self.prompt.clone()))
            .with(self.input_key(), Value::String(self.source.clone()))
    }

    /// Execute the pipeline and return the answer.
    ///
    /// A run that completes without an `answer` yields [`NO_ANSWER`].
    pub async fn run(&mut self) -> std::result::Result<Value, RunFailure> {
        info!(
            source = %self.source,
            input_key = self.input_key(),
            topology = ?self.topology,
            "Starting scrape"
        );

        match self.executor.execute(self.initial_state()).await {
            Ok(result) => {
                let answer = extract_answer(&result.state);
                self.final_state = Some(result.state);
                self.report = Some(result.report);
                Ok(answer)
            }
            Err(failure) => {
                self.final_state = None;
                self.report = Some(failure.report.clone());
                Err(failure)
            }
        }
    }

    /// Report of the last run, including a failed one.
    pub fn execution_report(&self) -> Option<&ExecutionReport> {
        self.report.as_ref()
    }

    /// Shared state at the end of the last successful run.
    pub fn final_state(&self) -> Option<&SharedState> {
        self.final_state.as_ref()
    }
}

/// The `answer` value of a final state, or [`NO_ANSWER`] when it is absent.
pub fn extract_answer(state: &SharedState) -> Value {
    state.get("answer").cloned().unwrap_or_else(|| {
        warn!("Run finished without an answer");
        Value::String(NO_ANSWER.to_string())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gleaner_core::types::Capabilities;
    use gleaner_test_utils::{fixtures, MockLlm, StaticFetcher};

    use super::*;

    fn scraper(source: &str) -> SmartScraper {
        let llm = Arc::new(MockLlm::new(Capabilities::new(false, true)).default_reply("{}"));
        let collaborators = Collaborators {
            llm,
            fetcher: Arc::new(StaticFetcher::new("page")),
            parser: Arc::new(gleaner_loaders::MarkdownChunker::new()),
        };
        SmartScraper::new("q", source, &fixtures::app_config(), collaborators).unwrap()
    }

    #[test]
    fn test_input_key_classification() {
        assert_eq!(scraper("https://example.org/x").input_key(), "url");
        assert_eq!(scraper("http://localhost:8080").input_key(), "url");
        assert_eq!(scraper("ftp://mirror.example.org/a").input_key(), "url");
        assert_eq!(scraper("./pages/index.html").input_key(), "local_dir");
        assert_eq!(scraper("/var/www/index.html").input_key(), "local_dir");
        assert_eq!(scraper("httpdocs/index.html").input_key(), "local_dir");
    }

    #[test]
    fn test_initial_state_seeding() {
        let state = scraper("https://example.org/x").initial_state();
        assert_eq!(state.get_str("user_prompt"), Some("q"));
        assert_eq!(state.get_str("url"), Some("https://example.org/x"));
        assert!(!state.contains("local_dir"));
    }

    #[test]
    fn test_missing_answer_yields_sentinel() {
        let state = SharedState::new().with("doc", serde_json::json!(["x"]));
        assert_eq!(extract_answer(&state), serde_json::json!("No answer found."));

        let state = state.with("answer", serde_json::json!({"a": 1}));
        assert_eq!(extract_answer(&state), serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_report_available_after_run() {
        let mut s = scraper("https://example.org/x");
        assert!(s.execution_report().is_none());
        let answer = s.run().await.unwrap();
        assert_eq!(answer, serde_json::json!({}));
        assert_eq!(
            s.execution_report().unwrap().stages(),
            vec!["Fetch", "GenerateAnswer"]
        );
        assert!(s.final_state().unwrap().contains("doc"));
    }
}
