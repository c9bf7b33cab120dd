//! Output-parser selection and parsing of capability responses.

use std::sync::LazyLock;

use jsonschema::JSONSchema;
use regex::Regex;
use serde_json::Value;

use gleaner_core::error::{GleanerError, Result};
use gleaner_core::types::{Capabilities, Generation, GenerationRequest, OutputSchema};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid code fence regex")
});

/// Placeholder written into templates when the capability enforces the schema itself.
const NATIVE_INSTRUCTIONS: &str = "NA";

const JSON_INSTRUCTIONS: &str = "Return a JSON object.";

/// How a capability response is turned into an answer value.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputParser {
    /// The capability enforces the schema; the request carries it.
    Native(OutputSchema),
    /// The schema is described in the prompt and checked after parsing.
    Schema(OutputSchema),
    /// Any JSON value is accepted.
    Json,
    /// No parser; the raw text is the answer.
    Raw,
}

impl OutputParser {
    /// Choose a parser for a capability and an optional schema.
    pub fn select(capabilities: Capabilities, schema: Option<&OutputSchema>) -> Self {
        match schema {
            Some(schema) if capabilities.native_structured_output => Self::Native(schema.clone()),
            Some(schema) if capabilities.text_format_instructions => Self::Schema(schema.clone()),
            None if capabilities.text_format_instructions => Self::Json,
            _ => Self::Raw,
        }
    }

    /// Short name for logs.
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Schema(_) => "schema",
            Self::Json => "json",
            Self::Raw => "raw",
        }
    }

    /// Text substituted for `{format_instructions}` in prompt templates.
    pub fn format_instructions(&self) -> String {
        match self {
            Self::Native(_) => NATIVE_INSTRUCTIONS.to_string(),
            Self::Schema(schema) => schema_instructions(schema),
            Self::Json => JSON_INSTRUCTIONS.to_string(),
            Self::Raw => String::new(),
        }
    }

    /// Attach the schema to the request when the capability enforces it.
    pub fn prepare(&self, request: GenerationRequest) -> GenerationRequest {
        match self {
            Self::Native(schema) => request.with_structured(schema.clone()),
            _ => request,
        }
    }

    /// Turn a capability response into an answer value.
    pub fn parse(&self, generation: Generation) -> Result<Value> {
        match self {
            Self::Raw => Ok(generation.into_value()),
            Self::Native(_) | Self::Json => to_json(generation),
            Self::Schema(schema) => {
                let value = to_json(generation)?;
                validate(schema, &value)?;
                Ok(value)
            }
        }
    }
}

fn schema_instructions(schema: &OutputSchema) -> String {
    let rendered =
        serde_json::to_string(&schema.schema).unwrap_or_else(|_| schema.schema.to_string());
    format!(
        "The output must be a JSON instance that conforms to the JSON schema below.\n\
         Return the instance itself, not the schema. For the schema \
         {{\"properties\": {{\"foo\": {{\"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \
         \"required\": [\"foo\"]}} the object {{\"foo\": [\"bar\", \"baz\"]}} is well formatted \
         and {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not.\n\n\
         Here is the output schema:\n```\n{}\n```",
        rendered
    )
}

fn to_json(generation: Generation) -> Result<Value> {
    match generation {
        Generation::Structured(value) => Ok(value),
        Generation::Text(text) => parse_json_text(&text),
    }
}

/// Parse model text as JSON, tolerating code fences and unclosed brackets.
pub fn parse_json_text(text: &str) -> Result<Value> {
    let cleaned = strip_code_fences(text);
    let cleaned = if cleaned.starts_with('{') || cleaned.starts_with('[') {
        balance_braces(&cleaned)
    } else {
        cleaned
    };
    serde_json::from_str(&cleaned)
        .map_err(|e| GleanerError::ParseValidation(format!("response is not valid JSON: {}", e)))
}

/// Contents of the first fenced code block, or the trimmed text.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Append closers for unbalanced braces and brackets outside strings.
fn balance_braces(text: &str) -> String {
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    let mut result = text.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = open.pop() {
        result.push(closer);
    }
    result
}

/// Validate `value` against the schema, reporting every violation with its instance path.
fn validate(schema: &OutputSchema, value: &Value) -> Result<()> {
    let compiled = JSONSchema::compile(&schema.schema).map_err(|e| {
        GleanerError::ParseValidation(format!(
            "schema '{}' is not a valid JSON Schema: {}",
            schema.name, e
        ))
    })?;

    if let Err(errors) = compiled.validate(value) {
        let issues: Vec<String> = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/" } else { path.as_str() };
                format!("at '{}': {}", path, error)
            })
            .collect();
        return Err(GleanerError::ParseValidation(format!(
            "answer does not match schema '{}': {}",
            schema.name,
            issues.join("; ")
        )));
    }
    Ok(())
}
