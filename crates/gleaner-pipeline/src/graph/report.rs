use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub elapsed_ms: u64,
    pub succeeded: bool,
    /// Error message when the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-run execution record, appended to as stages complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub graph_name: String,
    pub started_at: DateTime<Utc>,
    /// Entries in execution order.
    pub entries: Vec<StageReport>,
    pub total_elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn new(graph_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            graph_name: graph_name.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
            total_elapsed_ms: 0,
        }
    }

    pub(crate) fn record_success(&mut self, stage: &str, elapsed_ms: u64) {
        self.entries.push(StageReport {
            stage: stage.to_string(),
            elapsed_ms,
            succeeded: true,
            error: None,
        });
    }

    pub(crate) fn record_failure(&mut self, stage: &str, elapsed_ms: u64, error: String) {
        self.entries.push(StageReport {
            stage: stage.to_string(),
            elapsed_ms,
            succeeded: false,
            error: Some(error),
        });
    }

    /// Whether every recorded stage succeeded.
    pub fn succeeded(&self) -> bool {
        self.entries.iter().all(|e| e.succeeded)
    }

    /// Stage names in the order they ran.
    pub fn stages(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.stage.as_str()).collect()
    }

    pub fn last(&self) -> Option<&StageReport> {
        self.entries.last()
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.graph_name, self.run_id)?;
        for entry in &self.entries {
            let status = if entry.succeeded { "ok" } else { "FAILED" };
            writeln!(f, "  {:<16} {:>8} ms  {}", entry.stage, entry.elapsed_ms, status)?;
            if let Some(ref error) = entry.error {
                writeln!(f, "    {}", error)?;
            }
        }
        write!(f, "  total {} ms", self.total_elapsed_ms)
    }
}
