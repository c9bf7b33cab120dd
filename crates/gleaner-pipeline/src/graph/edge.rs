use serde::{Deserialize, Serialize};

/// A directed edge: `to` runs after `from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source stage name.
    pub from: String,
    /// Target stage name.
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Edges linking `names` into a straight chain.
    pub fn chain(names: &[&str]) -> Vec<Self> {
        names.windows(2).map(|w| Self::new(w[0], w[1])).collect()
    }
}
