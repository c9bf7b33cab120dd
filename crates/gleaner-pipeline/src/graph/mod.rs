//! Stage graph execution.
//!
//! A pipeline is a directed acyclic graph of [`Stage`]s connected by
//! [`Edge`]s with one entry stage. Stages talk to each other only through
//! the [`SharedState`] key/value store: each declares an input [`Selector`]
//! naming the keys it reads and the output keys it promises to write.
//!
//! The [`GraphExecutor`] walks the graph from the entry stage, resolving
//! inputs, running each stage, checking its output contract and merging the
//! result, and records an [`ExecutionReport`].

pub mod dag;
pub mod edge;
pub mod executor;
pub mod report;
pub mod selector;
pub mod stage;
pub mod state;

pub use dag::Graph;
pub use edge::Edge;
pub use executor::{ExecutionResult, GraphExecutor, RunFailure};
pub use report::{ExecutionReport, StageReport};
pub use selector::Selector;
pub use stage::{Stage, StageInputs, StageSpec};
pub use state::SharedState;
