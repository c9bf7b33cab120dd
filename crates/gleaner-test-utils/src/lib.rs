//! Shared test utilities for Gleaner crates.
//!
//! [`MockLlm`] is a scripted answer-generation capability that records every
//! request; [`StaticFetcher`] serves documents from memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use gleaner_core::config::{LoaderConfig, ModelConfig};
use gleaner_core::error::{GleanerError, Result};
use gleaner_core::traits::{DocumentParser, Fetcher, LlmClient};
use gleaner_core::types::{Capabilities, Generation, GenerationRequest};

#[derive(Debug, Clone)]
enum Trigger {
    /// The user content contains this text.
    Contains(String),
    /// The n-th call overall, 1-based.
    Call(usize),
}

impl Trigger {
    fn matches(&self, call: usize, request: &GenerationRequest) -> bool {
        match self {
            Self::Contains(needle) => request.user_text().contains(needle.as_str()),
            Self::Call(n) => *n == call,
        }
    }
}

#[derive(Debug, Clone)]
enum Action {
    Reply(String),
    Fail(String),
    Delay(Duration),
}

/// Scripted `LlmClient`.
///
/// Rules are checked in the order they were added. Failures win over
/// replies; a matching delay is applied before answering. Without a matching
/// reply the default reply is returned. In structured mode the reply text is
/// parsed as JSON and returned as `Generation::Structured`.
#[derive(Debug)]
pub struct MockLlm {
    capabilities: Capabilities,
    rules: Vec<(Trigger, Action)>,
    default_reply: String,
    calls: Mutex<Vec<GenerationRequest>>,
    counter: AtomicUsize,
}

impl MockLlm {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            rules: Vec::new(),
            default_reply: "{}".to_string(),
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Reply with `reply` when the user content contains `needle`.
    pub fn reply_when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules
            .push((Trigger::Contains(needle.into()), Action::Reply(reply.into())));
        self
    }

    /// Reply with `reply` on the `call`-th call (1-based).
    pub fn reply_on_call(mut self, call: usize, reply: impl Into<String>) -> Self {
        self.rules.push((Trigger::Call(call), Action::Reply(reply.into())));
        self
    }

    /// Fail with `Generation(message)` when the user content contains `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .push((Trigger::Contains(needle.into()), Action::Fail(message.into())));
        self
    }

    /// Fail with `Generation(message)` on the `call`-th call (1-based).
    pub fn fail_on_call(mut self, call: usize, message: impl Into<String>) -> Self {
        self.rules.push((Trigger::Call(call), Action::Fail(message.into())));
        self
    }

    /// Sleep `millis` before answering when the user content contains `needle`.
    pub fn delay_when(mut self, needle: impl Into<String>, millis: u64) -> Self {
        self.rules.push((
            Trigger::Contains(needle.into()),
            Action::Delay(Duration::from_millis(millis)),
        ));
        self
    }

    /// Requests received so far, in call order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Requests whose user content contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<GenerationRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.user_text().contains(needle))
            .collect()
    }

    fn plan(&self, call: usize, request: &GenerationRequest) -> (Option<Duration>, Result<String>) {
        let matching = || {
            self.rules
                .iter()
                .filter(|(trigger, _)| trigger.matches(call, request))
                .map(|(_, action)| action)
        };

        let delay = matching().find_map(|a| match a {
            Action::Delay(d) => Some(*d),
            _ => None,
        });
        if let Some(message) = matching().find_map(|a| match a {
            Action::Fail(m) => Some(m.clone()),
            _ => None,
        }) {
            return (delay, Err(GleanerError::Generation(message)));
        }
        let reply = matching()
            .find_map(|a| match a {
                Action::Reply(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.default_reply.clone());
        (delay, Ok(reply))
    }
}

impl LlmClient for MockLlm {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn generate(
        &self,
        _config: &ModelConfig,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<Generation>> {
        let call = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (delay, outcome) = self.plan(call, &request);
        let structured = request.structured.is_some();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let text = outcome?;
            if structured {
                let value = serde_json::from_str(&text).map_err(|e| {
                    GleanerError::Generation(format!("structured reply is not JSON: {}", e))
                })?;
                Ok(Generation::Structured(value))
            } else {
                Ok(Generation::Text(text))
            }
        })
    }
}

/// In-memory `Fetcher`.
#[derive(Debug)]
pub struct StaticFetcher {
    default: std::result::Result<String, String>,
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    /// Serve `content` for every source.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            default: Ok(content.into()),
            pages: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Fail every unknown source with `Fetch(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            default: Err(message.into()),
            pages: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Serve `content` for exactly `source`.
    pub fn with_page(mut self, source: impl Into<String>, content: impl Into<String>) -> Self {
        self.pages.insert(source.into(), content.into());
        self
    }

    /// Sources fetched so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, source: &str, _options: &LoaderConfig) -> BoxFuture<'_, Result<String>> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(source.to_string());
        }
        let outcome = match self.pages.get(source) {
            Some(content) => Ok(content.clone()),
            None => self.default.clone().map_err(GleanerError::Fetch),
        };
        Box::pin(async move { outcome })
    }
}

/// `DocumentParser` that splits documents on blank lines and ignores the
/// token budget, giving tests exact control over the chunk count.
#[derive(Debug, Default, Clone)]
pub struct ParagraphParser;

impl DocumentParser for ParagraphParser {
    fn parse(&self, documents: &[String], _chunk_size: usize) -> Result<Vec<String>> {
        let chunks: Vec<String> = documents
            .iter()
            .flat_map(|d| d.split("\n\n"))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if chunks.is_empty() {
            Ok(vec![String::new()])
        } else {
            Ok(chunks)
        }
    }
}

pub mod fixtures {
    use gleaner_core::config::AppConfig;

    /// Minimal config: mock provider, default scraper and loader sections.
    pub const MINIMAL_TOML: &str = r#"
[model]
provider = "mock"
model_id = "mock-1"
"#;

    pub fn app_config() -> AppConfig {
        toml::from_str(MINIMAL_TOML).expect("fixture config parses")
    }

    /// `count` distinct paragraphs separated by blank lines.
    pub fn paragraphs(count: usize) -> String {
        (1..=count)
            .map(|i| format!("Paragraph {i}: the lagoon town has sight number {i}."))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ModelConfig {
        ModelConfig::new("mock", "mock-1")
    }

    #[tokio::test]
    async fn test_rules_and_log() {
        let llm = MockLlm::new(Capabilities::new(false, true))
            .default_reply("fallback")
            .reply_when("beach", "sand")
            .fail_on_call(3, "HTTP 500");

        let a = llm.generate(&cfg(), GenerationRequest::new("s", "the beach")).await;
        let b = llm.generate(&cfg(), GenerationRequest::new("s", "the market")).await;
        let c = llm.generate(&cfg(), GenerationRequest::new("s", "the beach")).await;

        assert_eq!(a.unwrap(), Generation::Text("sand".into()));
        assert_eq!(b.unwrap(), Generation::Text("fallback".into()));
        assert!(matches!(c, Err(GleanerError::Generation(_))));
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls_containing("beach").len(), 2);
    }

    #[tokio::test]
    async fn test_structured_mode_parses_reply() {
        let schema = gleaner_core::types::OutputSchema::new("A", serde_json::json!({}));
        let llm = MockLlm::new(Capabilities::new(true, true)).default_reply(r#"{"a": 1}"#);
        let out = llm
            .generate(&cfg(), GenerationRequest::new("s", "u").with_structured(schema))
            .await
            .unwrap();
        assert_eq!(out, Generation::Structured(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_static_fetcher() {
        let fetcher = StaticFetcher::failing("404").with_page("a.html", "<p>a</p>");
        let opts = LoaderConfig::default();
        assert_eq!(fetcher.fetch("a.html", &opts).await.unwrap(), "<p>a</p>");
        assert!(fetcher.fetch("b.html", &opts).await.is_err());
        assert_eq!(fetcher.requested(), vec!["a.html", "b.html"]);
    }

    #[test]
    fn test_paragraph_parser() {
        let docs = vec!["a\n\n b \n\n".to_string(), "c".to_string()];
        assert_eq!(ParagraphParser.parse(&docs, 1).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(ParagraphParser.parse(&[], 1).unwrap(), vec![""]);
    }

    #[test]
    fn test_fixture_config() {
        let config = fixtures::app_config();
        assert_eq!(config.model.model_id, "mock-1");
        assert!(config.scraper.html_mode);
        assert!(fixtures::paragraphs(3).contains("Paragraph 3"));
    }
}
