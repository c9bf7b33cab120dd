use futures::future::BoxFuture;

use gleaner_core::error::{GleanerError, Result};

use super::selector::Selector;
use super::state::SharedState;

/// Declared identity and data contract of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// Unique name within a graph.
    pub name: String,
    /// Which state keys the stage reads.
    pub input: Selector,
    /// Keys the stage must write, in order.
    pub outputs: Vec<String>,
    /// Fewest resolved input values the stage can receive.
    pub arity: usize,
}

impl StageSpec {
    /// Parse `input` and derive the arity from it.
    pub fn new(name: impl Into<String>, input: &str, outputs: &[&str]) -> Result<Self> {
        let input = Selector::parse(input)?;
        Ok(Self {
            name: name.into(),
            arity: input.arity(),
            input,
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// Values resolved for a stage from the shared state, in selector order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInputs {
    entries: Vec<(String, serde_json::Value)>,
}

impl StageInputs {
    pub fn new(entries: Vec<(String, serde_json::Value)>) -> Self {
        Self { entries }
    }

    /// Resolve `spec.input` against `state`.
    pub fn resolve(spec: &StageSpec, state: &SharedState) -> Result<Self> {
        let keys = spec
            .input
            .resolve(state)
            .ok_or_else(|| GleanerError::MissingInput {
                stage: spec.name.clone(),
                selector: spec.input.to_string(),
            })?;

        let entries = keys
            .into_iter()
            .filter_map(|k| state.get(&k).cloned().map(|v| (k, v)))
            .collect();
        Ok(Self { entries })
    }

    /// Key that supplied the `index`-th value.
    pub fn key(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(k, _)| k.as_str())
    }

    /// The `index`-th value, or `MissingInput` naming `stage`.
    pub fn value(&self, stage: &str, index: usize) -> Result<&serde_json::Value> {
        self.entries
            .get(index)
            .map(|(_, v)| v)
            .ok_or_else(|| GleanerError::MissingInput {
                stage: stage.to_string(),
                selector: format!("input #{}", index + 1),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A unit of pipeline work.
///
/// The executor resolves the stage's inputs, calls `execute`, checks that
/// every declared output key is present in the returned state, and merges
/// it into the shared state.
pub trait Stage: Send + Sync + 'static {
    fn spec(&self) -> &StageSpec;

    fn name(&self) -> &str {
        &self.spec().name
    }

    fn execute(&self, inputs: StageInputs) -> BoxFuture<'_, Result<SharedState>>;
}
