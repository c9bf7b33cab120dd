use std::time::Instant;

use tracing::{debug, error, info};

use gleaner_core::error::{GleanerError, Result};

use super::dag::Graph;
use super::report::ExecutionReport;
use super::stage::{Stage, StageInputs};
use super::state::SharedState;

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The final shared state with every stage's outputs merged in.
    pub state: SharedState,
    pub report: ExecutionReport,
}

/// A run aborted by a stage failure.
///
/// `report` holds every entry recorded before the abort, ending with the
/// failed stage.
#[derive(Debug, thiserror::Error)]
#[error("Stage '{stage}' failed: {error}")]
pub struct RunFailure {
    pub stage: String,
    #[source]
    pub error: GleanerError,
    pub report: ExecutionReport,
}

/// Drives a [`Graph`] to completion.
///
/// Stages run one at a time in the graph's execution order. For each, the
/// input selector is resolved against the shared state, the stage runs, its
/// declared outputs are checked and then merged back. Any failure aborts the
/// run; nothing is retried or skipped.
#[derive(Debug)]
pub struct GraphExecutor {
    graph: Graph,
}

impl GraphExecutor {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub async fn execute(
        &self,
        initial: SharedState,
    ) -> std::result::Result<ExecutionResult, RunFailure> {
        let start = Instant::now();
        let mut state = initial;
        let mut report = ExecutionReport::new(self.graph.name());

        for stage in self.graph.ordered_stages() {
            info!(stage = %stage.name(), graph = %self.graph.name(), "Executing stage");

            let stage_start = Instant::now();
            let outcome = run_stage(stage, &state).await;
            let elapsed_ms = stage_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(update) => {
                    let written = update.len();
                    state.merge(update);
                    report.record_success(stage.name(), elapsed_ms);
                    debug!(stage = %stage.name(), elapsed_ms, written, "Stage complete");
                }
                Err(e) => {
                    error!(stage = %stage.name(), elapsed_ms, error = %e, "Stage failed");
                    report.record_failure(stage.name(), elapsed_ms, e.to_string());
                    report.total_elapsed_ms = start.elapsed().as_millis() as u64;
                    return Err(RunFailure {
                        stage: stage.name().to_string(),
                        error: e,
                        report,
                    });
                }
            }
        }

        report.total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            graph = %self.graph.name(),
            stages = report.entries.len(),
            total_elapsed_ms = report.total_elapsed_ms,
            "Graph complete"
        );

        Ok(ExecutionResult { state, report })
    }
}

async fn run_stage(stage: &dyn Stage, state: &SharedState) -> Result<SharedState> {
    let inputs = StageInputs::resolve(stage.spec(), state)?;
    let update = stage.execute(inputs).await?;

    let missing: Vec<String> = stage
        .spec()
        .outputs
        .iter()
        .filter(|key| !update.contains(key))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(GleanerError::OutputContract {
            stage: stage.name().to_string(),
            missing,
        });
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use serde_json::json;

    use gleaner_core::error::ErrorKind;

    use super::super::edge::Edge;
    use super::super::stage::StageSpec;
    use super::*;

    /// Copies its first input to each declared output, or writes nothing.
    struct Echo {
        spec: StageSpec,
        write: bool,
    }

    impl Echo {
        fn boxed(name: &str, input: &str, outputs: &[&str]) -> Box<dyn Stage> {
            Box::new(Self {
                spec: StageSpec::new(name, input, outputs).unwrap(),
                write: true,
            })
        }
    }

    impl Stage for Echo {
        fn spec(&self) -> &StageSpec {
            &self.spec
        }

        fn execute(&self, inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>> {
            Box::pin(async move {
                let mut out = SharedState::new();
                if self.write {
                    let value = inputs.value(self.name(), 0)?.clone();
                    for key in &self.spec.outputs {
                        out.set(key.clone(), value.clone());
                    }
                }
                Ok(out)
            })
        }
    }

    struct Failing(StageSpec);

    impl Stage for Failing {
        fn spec(&self) -> &StageSpec {
            &self.0
        }

        fn execute(&self, _inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>> {
            Box::pin(async { Err(GleanerError::Generation("HTTP 500".into())) })
        }
    }

    fn seeded() -> SharedState {
        SharedState::new().with("url", json!("https://example.org"))
    }

    #[tokio::test]
    async fn test_runs_chain_and_merges_outputs() {
        let graph = Graph::new(
            "chain",
            vec![
                Echo::boxed("Fetch", "url | local_dir", &["doc"]),
                Echo::boxed("Parse", "doc", &["parsed_doc"]),
            ],
            Edge::chain(&["Fetch", "Parse"]),
            "Fetch",
        )
        .unwrap();

        let result = GraphExecutor::new(graph).execute(seeded()).await.unwrap();
        assert_eq!(result.state.get_str("parsed_doc"), Some("https://example.org"));
        assert_eq!(result.state.get_str("url"), Some("https://example.org"));
        assert_eq!(result.report.stages(), vec!["Fetch", "Parse"]);
        assert!(result.report.succeeded());
    }

    #[tokio::test]
    async fn test_missing_input_aborts_with_partial_report() {
        let graph = Graph::new(
            "chain",
            vec![
                Echo::boxed("Fetch", "url", &["doc"]),
                Echo::boxed("Answer", "user_prompt & doc", &["answer"]),
                Echo::boxed("After", "answer", &["done"]),
            ],
            Edge::chain(&["Fetch", "Answer", "After"]),
            "Fetch",
        )
        .unwrap();

        let failure = GraphExecutor::new(graph).execute(seeded()).await.unwrap_err();
        assert_eq!(failure.stage, "Answer");
        assert_eq!(failure.error.kind(), ErrorKind::MissingInput);
        assert_eq!(failure.report.stages(), vec!["Fetch", "Answer"]);
        assert!(!failure.report.last().unwrap().succeeded);
    }

    #[tokio::test]
    async fn test_output_contract_enforced() {
        let silent: Box<dyn Stage> = Box::new(Echo {
            spec: StageSpec::new("Parse", "url", &["parsed_doc"]).unwrap(),
            write: false,
        });
        let graph = Graph::new("single", vec![silent], vec![], "Parse").unwrap();

        let failure = GraphExecutor::new(graph).execute(seeded()).await.unwrap_err();
        match failure.error {
            GleanerError::OutputContract { stage, missing } => {
                assert_eq!(stage, "Parse");
                assert_eq!(missing, vec!["parsed_doc"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stage_error_stops_downstream() {
        let graph = Graph::new(
            "chain",
            vec![
                Echo::boxed("Fetch", "url", &["doc"]),
                Box::new(Failing(StageSpec::new("Generate", "doc", &["answer"]).unwrap())),
                Echo::boxed("Never", "answer", &["x"]),
            ],
            Edge::chain(&["Fetch", "Generate", "Never"]),
            "Fetch",
        )
        .unwrap();

        let failure = GraphExecutor::new(graph).execute(seeded()).await.unwrap_err();
        assert_eq!(failure.stage, "Generate");
        assert_eq!(failure.error.kind(), ErrorKind::Generation);
        assert_eq!(failure.report.stages(), vec!["Fetch", "Generate"]);
        assert!(failure.to_string().contains("HTTP 500"));
    }
}
