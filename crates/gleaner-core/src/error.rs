use thiserror::Error;

#[derive(Debug, Error)]
pub enum GleanerError {
    // Graph errors
    #[error("Stage '{stage}' could not resolve inputs for selector `{selector}`")]
    MissingInput { stage: String, selector: String },

    #[error("Stage '{stage}' did not produce declared outputs: {}", missing.join(", "))]
    OutputContract { stage: String, missing: Vec<String> },

    #[error("Invalid input selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    // Generation errors
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Output parsing failed: {0}")]
    ParseValidation(String),

    #[error("Chunk {chunk}/{total} failed: {source}")]
    Chunk {
        chunk: usize,
        total: usize,
        #[source]
        source: Box<GleanerError>,
    },

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Collaborator errors
    #[error("Fetch failed: {0}")]
    Fetch(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a failure, independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A stage's input selector could not be resolved (topology bug).
    MissingInput,
    /// A stage returned without its declared outputs (stage bug).
    OutputContract,
    /// The answer-generation capability failed.
    Generation,
    /// A schema or JSON parser rejected the capability's output.
    ParseValidation,
    /// Collaborator, configuration, or I/O failure.
    Other,
}

impl GleanerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { .. } => ErrorKind::MissingInput,
            Self::OutputContract { .. } => ErrorKind::OutputContract,
            Self::Generation(_) | Self::UnsupportedProvider(_) => ErrorKind::Generation,
            Self::ParseValidation(_) => ErrorKind::ParseValidation,
            Self::Chunk { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }

    /// Attach a 1-based chunk position to an error raised while processing it.
    pub fn in_chunk(self, chunk: usize, total: usize) -> Self {
        Self::Chunk {
            chunk,
            total,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, GleanerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_error_keeps_inner_kind() {
        let err = GleanerError::Generation("HTTP 500".into()).in_chunk(2, 3);
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert_eq!(err.to_string(), "Chunk 2/3 failed: Generation failed: HTTP 500");

        let err = GleanerError::ParseValidation("not json".into()).in_chunk(1, 4);
        assert_eq!(err.kind(), ErrorKind::ParseValidation);
    }

    #[test]
    fn test_output_contract_message_lists_keys() {
        let err = GleanerError::OutputContract {
            stage: "Parse".into(),
            missing: vec!["parsed_doc".into(), "extra".into()],
        };
        assert_eq!(
            err.to_string(),
            "Stage 'Parse' did not produce declared outputs: parsed_doc, extra"
        );
        assert_eq!(err.kind(), ErrorKind::OutputContract);
    }

    #[test]
    fn test_collaborator_errors_are_other() {
        assert_eq!(GleanerError::Fetch("404".into()).kind(), ErrorKind::Other);
        assert_eq!(GleanerError::Config("bad".into()).kind(), ErrorKind::Other);
    }
}
