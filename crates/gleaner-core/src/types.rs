use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{GleanerError, Result};

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to the answer-generation capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// What an answer-generation backend can do.
///
/// Populated by whichever adapter wraps a provider. Parser and template
/// selection dispatch on these flags, never on the adapter type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The backend enforces a JSON Schema on its own output.
    pub native_structured_output: bool,
    /// The backend reliably follows textual formatting instructions.
    pub text_format_instructions: bool,
}

impl Capabilities {
    pub fn new(native_structured_output: bool, text_format_instructions: bool) -> Self {
        Self {
            native_structured_output,
            text_format_instructions,
        }
    }

    /// Flags supported by both `self` and `other`.
    pub fn intersect(self, other: Self) -> Self {
        Self {
            native_structured_output: self.native_structured_output
                && other.native_structured_output,
            text_format_instructions: self.text_format_instructions
                && other.text_format_instructions,
        }
    }
}

/// A caller-supplied JSON Schema for structured answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Schema name, sent to providers that require one.
    pub name: String,
    /// The JSON Schema document.
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Derive a schema from a Rust type.
    pub fn of<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        let mut schema = serde_json::to_value(root).unwrap_or_default();
        if let serde_json::Value::Object(map) = &mut schema {
            map.remove("$schema");
        }
        Self {
            name: T::schema_name(),
            schema,
        }
    }

    /// Load a schema from a JSON file. The file stem becomes the schema name.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GleanerError::ConfigNotFound(path.display().to_string()))?;
        let schema: serde_json::Value = serde_json::from_str(&content)?;
        if !schema.is_object() {
            return Err(GleanerError::Config(format!(
                "schema file {} is not a JSON object",
                path.display()
            )));
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("answer")
            .to_string();
        Ok(Self { name, schema })
    }
}

/// A fully formed prompt for one capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    /// When set, the capability is invoked in native structured mode.
    pub structured: Option<OutputSchema>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            structured: None,
        }
    }

    pub fn with_structured(mut self, schema: OutputSchema) -> Self {
        self.structured = Some(schema);
        self
    }

    /// System instructions of this request.
    pub fn system_text(&self) -> &str {
        self.text_for(Role::System)
    }

    /// User content of this request.
    pub fn user_text(&self) -> &str {
        self.text_for(Role::User)
    }

    fn text_for(&self, role: Role) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// What a capability invocation returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    Structured(serde_json::Value),
}

impl Generation {
    /// Convert into a JSON value; text becomes a JSON string.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::Text(text) => serde_json::Value::String(text),
            Self::Structured(value) => value,
        }
    }
}
