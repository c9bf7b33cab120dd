use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GleanerError, Result};
use crate::types::OutputSchema;

/// Top-level Gleaner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Override the preset's native structured-output flag.
    #[serde(default)]
    pub structured_output: Option<bool>,
    /// Override the preset's format-instruction flag.
    #[serde(default)]
    pub format_instructions: Option<bool>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            structured_output: None,
            format_instructions: None,
            extra_headers: HashMap::new(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Run configuration for a scrape: topology flags and answer-stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Feed fetched content straight to the answer stage, skipping Parse.
    #[serde(default = "default_html_mode")]
    pub html_mode: bool,
    /// Insert a reasoning stage before the answer stage.
    #[serde(default)]
    pub reasoning: bool,
    /// Token budget per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum concurrent per-chunk model calls.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub verbose: bool,
    /// Extra instructions prepended to every prompt template.
    #[serde(default)]
    pub additional_info: Option<String>,
    /// Force the Markdown template family.
    #[serde(default)]
    pub force: bool,
    /// Script-creation mode; never uses the Markdown template family.
    #[serde(default)]
    pub script_creator: bool,
    /// Strip script/style/noscript blocks from fetched HTML.
    #[serde(default = "default_cut")]
    pub cut: bool,
    /// JSON Schema file for structured answers.
    #[serde(default)]
    pub schema_path: Option<String>,
    /// Resolved output schema (from `schema_path` or set programmatically).
    #[serde(skip)]
    pub schema: Option<OutputSchema>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            html_mode: default_html_mode(),
            reasoning: false,
            chunk_size: default_chunk_size(),
            max_concurrency: default_max_concurrency(),
            verbose: false,
            additional_info: None,
            force: false,
            script_creator: false,
            cut: default_cut(),
            schema_path: None,
            schema: None,
        }
    }
}

impl ScraperConfig {
    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

fn default_html_mode() -> bool { true }
fn default_chunk_size() -> usize { 4096 }
fn default_max_concurrency() -> usize { 4 }
fn default_cut() -> bool { true }

/// Options handed to the fetch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            headers: HashMap::new(),
        }
    }
}

fn default_timeout_secs() -> u64 { 30 }
fn default_user_agent() -> String { format!("gleaner/{}", env!("CARGO_PKG_VERSION")) }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    ///
    /// A relative `scraper.schema_path` is resolved against the config
    /// file's directory and loaded into `scraper.schema`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GleanerError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let mut config: AppConfig =
            toml::from_str(&expanded).map_err(|e| GleanerError::Config(e.to_string()))?;

        if let Some(schema_path) = &config.scraper.schema_path {
            let schema_path = Path::new(schema_path);
            let resolved = if schema_path.is_relative() {
                path.parent().unwrap_or(Path::new(".")).join(schema_path)
            } else {
                schema_path.to_path_buf()
            };
            config.scraper.schema = Some(OutputSchema::load(&resolved)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.chunk_size == 0 {
            return Err(GleanerError::Config("scraper.chunk_size must be > 0".into()));
        }
        if self.scraper.max_concurrency == 0 {
            return Err(GleanerError::Config(
                "scraper.max_concurrency must be > 0".into(),
            ));
        }
        if self.model.model_id.trim().is_empty() {
            return Err(GleanerError::Config("model.model_id is empty".into()));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
