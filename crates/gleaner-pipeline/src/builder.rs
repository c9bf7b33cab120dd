use std::sync::Arc;

use tracing::debug;

use gleaner_core::config::{LoaderConfig, ModelConfig, ScraperConfig};
use gleaner_core::error::Result;
use gleaner_core::traits::{DocumentParser, Fetcher, LlmClient};
use gleaner_loaders::{HttpFetcher, MarkdownChunker};

use crate::graph::{Edge, Graph, Stage};
use crate::nodes::{FetchStage, GenerateAnswerStage, ModelStageConfig, ParseStage, ReasoningStage};

/// Name given to every graph the builder produces.
pub const GRAPH_NAME: &str = "SmartScraper";

/// The stage arrangements a run can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Fetch → Parse → Reasoning → GenerateAnswer
    ParseReasonAnswer,
    /// Fetch → Reasoning → GenerateAnswer
    ReasonAnswer,
    /// Fetch → GenerateAnswer
    Answer,
    /// Fetch → Parse → GenerateAnswer
    ParseAnswer,
}

impl Topology {
    pub fn select(html_mode: bool, reasoning: bool) -> Self {
        match (html_mode, reasoning) {
            (false, true) => Self::ParseReasonAnswer,
            (true, true) => Self::ReasonAnswer,
            (true, false) => Self::Answer,
            (false, false) => Self::ParseAnswer,
        }
    }

    /// Stage names in chain order.
    pub fn stage_names(self) -> &'static [&'static str] {
        const PARSE_REASON_ANSWER: &[&str] = &[
            FetchStage::NAME,
            ParseStage::NAME,
            ReasoningStage::NAME,
            GenerateAnswerStage::NAME,
        ];
        const REASON_ANSWER: &[&str] =
            &[FetchStage::NAME, ReasoningStage::NAME, GenerateAnswerStage::NAME];
        const ANSWER: &[&str] = &[FetchStage::NAME, GenerateAnswerStage::NAME];
        const PARSE_ANSWER: &[&str] = &[FetchStage::NAME, ParseStage::NAME, GenerateAnswerStage::NAME];

        match self {
            Self::ParseReasonAnswer => PARSE_REASON_ANSWER,
            Self::ReasonAnswer => REASON_ANSWER,
            Self::Answer => ANSWER,
            Self::ParseAnswer => PARSE_ANSWER,
        }
    }

    /// Whether content is converted to Markdown before the model sees it.
    pub fn parses(self) -> bool {
        matches!(self, Self::ParseReasonAnswer | Self::ParseAnswer)
    }
}

/// The external collaborators a pipeline is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn DocumentParser>,
}

impl Collaborators {
    /// HTTP/file fetcher and Markdown chunker around `llm`.
    pub fn standard(llm: Arc<dyn LlmClient>, cut: bool) -> Self {
        Self {
            llm,
            fetcher: Arc::new(HttpFetcher::new(cut)),
            parser: Arc::new(MarkdownChunker::new()),
        }
    }
}

/// Builds the stage graph for one run configuration.
pub struct PipelineBuilder<'a> {
    scraper: &'a ScraperConfig,
    model: &'a ModelConfig,
    loader: &'a LoaderConfig,
    collaborators: &'a Collaborators,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        scraper: &'a ScraperConfig,
        model: &'a ModelConfig,
        loader: &'a LoaderConfig,
        collaborators: &'a Collaborators,
    ) -> Self {
        Self {
            scraper,
            model,
            loader,
            collaborators,
        }
    }

    pub fn topology(&self) -> Topology {
        Topology::select(self.scraper.html_mode, self.scraper.reasoning)
    }

    pub fn build(&self) -> Result<Graph> {
        let topology = self.topology();
        let stages: Vec<Box<dyn Stage>> = match topology {
            Topology::ParseReasonAnswer => vec![
                self.fetch()?,
                self.parse()?,
                self.reasoning(topology)?,
                self.answer(topology)?,
            ],
            Topology::ReasonAnswer => vec![
                self.fetch()?,
                self.reasoning(topology)?,
                self.answer(topology)?,
            ],
            Topology::Answer => vec![self.fetch()?, self.answer(topology)?],
            Topology::ParseAnswer => vec![self.fetch()?, self.parse()?, self.answer(topology)?],
        };

        debug!(topology = ?topology, stages = stages.len(), "Pipeline built");
        Graph::new(
            GRAPH_NAME,
            stages,
            Edge::chain(topology.stage_names()),
            FetchStage::NAME,
        )
    }

    fn fetch(&self) -> Result<Box<dyn Stage>> {
        Ok(Box::new(FetchStage::new(
            self.collaborators.fetcher.clone(),
            self.loader.clone(),
        )?))
    }

    fn parse(&self) -> Result<Box<dyn Stage>> {
        Ok(Box::new(ParseStage::new(
            self.collaborators.parser.clone(),
            self.scraper.chunk_size,
        )?))
    }

    fn reasoning(&self, topology: Topology) -> Result<Box<dyn Stage>> {
        Ok(Box::new(ReasoningStage::new(self.model_stage_config(topology))?))
    }

    fn answer(&self, topology: Topology) -> Result<Box<dyn Stage>> {
        Ok(Box::new(GenerateAnswerStage::new(self.model_stage_config(topology))?))
    }

    fn model_stage_config(&self, topology: Topology) -> ModelStageConfig {
        ModelStageConfig {
            llm: self.collaborators.llm.clone(),
            model: self.model.clone(),
            schema: self.scraper.schema.clone(),
            additional_info: self.scraper.additional_info.clone(),
            markdown_content: topology.parses(),
            force: self.scraper.force,
            script_creator: self.scraper.script_creator,
            verbose: self.scraper.verbose,
            max_concurrency: self.scraper.max_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use gleaner_core::types::Capabilities;
    use gleaner_test_utils::{MockLlm, ParagraphParser, StaticFetcher};

    use super::*;

    fn collaborators() -> Collaborators {
        Collaborators {
            llm: Arc::new(MockLlm::new(Capabilities::new(false, true))),
            fetcher: Arc::new(StaticFetcher::new("<p>x</p>")),
            parser: Arc::new(ParagraphParser),
        }
    }

    fn build(html_mode: bool, reasoning: bool) -> Graph {
        let scraper = ScraperConfig {
            html_mode,
            reasoning,
            ..Default::default()
        };
        let model = ModelConfig::new("mock", "mock-1");
        let loader = LoaderConfig::default();
        let collaborators = collaborators();
        PipelineBuilder::new(&scraper, &model, &loader, &collaborators)
            .build()
            .unwrap()
    }

    #[test]
    fn test_topology_table() {
        assert_eq!(Topology::select(false, true), Topology::ParseReasonAnswer);
        assert_eq!(Topology::select(true, true), Topology::ReasonAnswer);
        assert_eq!(Topology::select(true, false), Topology::Answer);
        assert_eq!(Topology::select(false, false), Topology::ParseAnswer);
    }

    #[test]
    fn test_built_graphs_match_topology() {
        let cases = [
            (false, true, vec!["Fetch", "Parse", "Reasoning", "GenerateAnswer"]),
            (true, true, vec!["Fetch", "Reasoning", "GenerateAnswer"]),
            (true, false, vec!["Fetch", "GenerateAnswer"]),
            (false, false, vec!["Fetch", "Parse", "GenerateAnswer"]),
        ];
        for (html_mode, reasoning, expected) in cases {
            let graph = build(html_mode, reasoning);
            assert_eq!(graph.name(), GRAPH_NAME);
            assert_eq!(graph.entry(), "Fetch");
            assert_eq!(graph.execution_order(), expected);

            let expected_edges = Edge::chain(&expected);
            assert_eq!(graph.edges(), expected_edges.as_slice());
        }
    }

    #[test]
    fn test_stage_contracts() {
        let graph = build(false, true);
        let spec = |name: &str| graph.stage(name).unwrap().spec().clone();

        assert_eq!(spec("Fetch").input.to_string(), "url | local_dir");
        assert_eq!(spec("Fetch").outputs, vec!["doc"]);
        assert_eq!(spec("Parse").outputs, vec!["parsed_doc"]);
        assert_eq!(spec("Reasoning").outputs, vec!["relevant_chunks"]);
        assert_eq!(
            spec("GenerateAnswer").input.to_string(),
            "user_prompt & (relevant_chunks | parsed_doc | doc)"
        );
        assert_eq!(spec("GenerateAnswer").outputs, vec!["answer"]);
    }

    #[test]
    fn test_rebuild_is_structurally_identical() {
        let a = build(false, false);
        let b = build(false, false);
        assert_eq!(a.execution_order(), b.execution_order());
        assert_eq!(a.edges(), b.edges());
        assert_eq!(format!("{:?}", a), format!("{:?}", b));
    }
}
