//! Question answering over documents as a small stage graph.
//!
//! [`PipelineBuilder`] picks one of four fixed topologies from the run
//! flags, [`GraphExecutor`] drives it over a [`SharedState`], and
//! [`SmartScraper`] wraps both behind a single `run` call.

pub mod builder;
pub mod graph;
pub mod nodes;
pub mod output_parser;
pub mod prompts;
pub mod scraper;

pub use builder::{Collaborators, PipelineBuilder, Topology, GRAPH_NAME};
pub use graph::{
    Edge, ExecutionReport, ExecutionResult, Graph, GraphExecutor, RunFailure, Selector,
    SharedState, Stage, StageInputs, StageReport, StageSpec,
};
pub use nodes::{FetchStage, GenerateAnswerStage, ModelStageConfig, ParseStage, ReasoningStage};
pub use output_parser::OutputParser;
pub use prompts::TemplateFamily;
pub use scraper::{extract_answer, SmartScraper, NO_ANSWER};
