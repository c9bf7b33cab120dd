use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use gleaner_core::error::{GleanerError, Result};

use super::edge::Edge;
use super::stage::Stage;

/// Stages plus the edges ordering them, rooted at one entry stage.
///
/// Construction validates the shape: unique stage names, edges between
/// known stages, no cycles, and every stage other than the entry reachable
/// through at least one incoming edge.
pub struct Graph {
    name: String,
    stages: Vec<Box<dyn Stage>>,
    edges: Vec<Edge>,
    entry: String,
    order: Vec<usize>,
}

impl Graph {
    pub fn new(
        name: impl Into<String>,
        stages: Vec<Box<dyn Stage>>,
        edges: Vec<Edge>,
        entry: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let entry = entry.into();

        if stages.is_empty() {
            return Err(GleanerError::InvalidGraph(format!("graph '{}' has no stages", name)));
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.name(), i).is_some() {
                return Err(GleanerError::InvalidGraph(format!(
                    "duplicate stage name '{}'",
                    stage.name()
                )));
            }
        }

        let entry_idx = *index.get(entry.as_str()).ok_or_else(|| {
            GleanerError::InvalidGraph(format!("entry stage '{}' not in graph", entry))
        })?;

        let mut incoming = vec![0usize; stages.len()];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
        let mut seen = HashSet::new();
        for edge in &edges {
            let lookup = |n: &str| {
                index.get(n).copied().ok_or_else(|| {
                    GleanerError::InvalidGraph(format!("edge references unknown stage '{}'", n))
                })
            };
            let (from, to) = (lookup(&edge.from)?, lookup(&edge.to)?);
            if !seen.insert((from, to)) {
                continue;
            }
            outgoing[from].push(to);
            incoming[to] += 1;
        }

        if incoming[entry_idx] > 0 {
            return Err(GleanerError::InvalidGraph(format!(
                "entry stage '{}' has incoming edges",
                entry
            )));
        }
        if let Some(orphan) = (0..stages.len()).find(|&i| i != entry_idx && incoming[i] == 0) {
            return Err(GleanerError::InvalidGraph(format!(
                "stage '{}' is not reachable from '{}'",
                stages[orphan].name(),
                entry
            )));
        }

        // Kahn's algorithm; ties broken by declaration order.
        let mut remaining = incoming.clone();
        let mut ready = BTreeSet::from([entry_idx]);
        let mut order = Vec::with_capacity(stages.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &to in &outgoing[next] {
                remaining[to] -= 1;
                if remaining[to] == 0 {
                    ready.insert(to);
                }
            }
        }
        if order.len() != stages.len() {
            return Err(GleanerError::InvalidGraph(format!("graph '{}' contains a cycle", name)));
        }

        Ok(Self {
            name,
            stages,
            edges,
            entry,
            order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Stage names in declaration order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Stage names in the order the executor runs them.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.stages[i].name()).collect()
    }

    /// Stages in execution order.
    pub fn ordered_stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.order.iter().map(|&i| self.stages[i].as_ref())
    }

    pub fn stage(&self, name: &str) -> Option<&dyn Stage> {
        self.stages
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}
