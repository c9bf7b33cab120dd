use std::time::Instant;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use gleaner_core::config::ModelConfig;
use gleaner_core::error::{GleanerError, Result};
use gleaner_core::traits::LlmClient;
use gleaner_core::types::*;

use super::presets::{build_extra_headers, get_preset, resolve_capabilities};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Mistral, Ollama, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    capabilities: Capabilities,
}

impl OpenAiClient {
    /// Create a client whose capability flags come from the provider preset
    /// and any overrides in `config`.
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            http: Client::new(),
            capabilities: resolve_capabilities(config),
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
pub(crate) struct OaiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
pub(crate) struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| OaiMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_string(),
            content: msg.content,
        })
        .collect()
}

/// OpenAI rejects schema names outside `[a-zA-Z0-9_-]`.
fn schema_format(schema: OutputSchema) -> ResponseFormat {
    let name: String = schema
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    ResponseFormat {
        format_type: "json_schema".to_string(),
        json_schema: JsonSchemaFormat {
            name: if name.is_empty() { "answer".to_string() } else { name },
            strict: false,
            schema: schema.schema,
        },
    }
}

/// Turn a decoded response into a `Generation`.
fn into_generation(response: ChatResponse, structured: bool) -> Result<Generation> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| GleanerError::Generation("response contained no choices".into()))?;

    if let Some(refusal) = message.refusal {
        return Err(GleanerError::Generation(format!("model refused: {}", refusal)));
    }

    let content = message.content.unwrap_or_default();
    if structured {
        let value = serde_json::from_str(&content).map_err(|e| {
            GleanerError::Generation(format!("structured response is not JSON: {}", e))
        })?;
        Ok(Generation::Structured(value))
    } else {
        Ok(Generation::Text(content))
    }
}

impl LlmClient for OpenAiClient {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn generate(
        &self,
        config: &ModelConfig,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<Generation>> {
        let config = config.clone();

        Box::pin(async move {
            let preset = get_preset(&config.provider);
            let base_url = config
                .base_url
                .as_deref()
                .or(preset.as_ref().map(|p| p.default_base_url))
                .unwrap_or(OPENAI_API_URL)
                .to_string();

            let structured = request.structured.is_some();
            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(request.messages),
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                stream: false,
                response_format: request.structured.map(schema_format),
            };

            let mut req = self.http.post(&base_url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            // Preset headers first, user headers on top
            let headers = match &preset {
                Some(p) => build_extra_headers(p, &config.extra_headers),
                None => config
                    .extra_headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            };
            for (k, v) in &headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let start = Instant::now();
            let response = req
                .send()
                .await
                .map_err(|e| GleanerError::Generation(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(GleanerError::Generation(format!("HTTP {}: {}", status, body)));
            }

            let decoded: ChatResponse = response
                .json()
                .await
                .map_err(|e| GleanerError::Generation(format!("malformed response: {}", e)))?;

            if let Some(usage) = &decoded.usage {
                debug!(
                    model = %config.model_id,
                    input_tokens = usage.prompt_tokens,
                    output_tokens = usage.completion_tokens,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    structured,
                    "Chat completion finished"
                );
            }

            into_generation(decoded, structured)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ChatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_convert_messages_roles() {
        let msgs = convert_messages(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(msgs[1].content, "hi");
    }

    #[test]
    fn test_schema_format_sanitizes_name() {
        let fmt = schema_format(OutputSchema::new("my schema.v1", serde_json::json!({})));
        assert_eq!(fmt.format_type, "json_schema");
        assert_eq!(fmt.json_schema.name, "my_schema_v1");
        assert!(!fmt.json_schema.strict);
    }

    #[test]
    fn test_request_omits_response_format_for_text() {
        let body = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![],
            max_tokens: 10,
            temperature: None,
            stream: false,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("response_format").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_text_generation() {
        let r = response(r#"{"choices":[{"message":{"content":"Paris"}}]}"#);
        assert_eq!(
            into_generation(r, false).unwrap(),
            Generation::Text("Paris".into())
        );
    }

    #[test]
    fn test_structured_generation() {
        let r = response(r#"{"choices":[{"message":{"content":"{\"city\":\"Paris\"}"}}]}"#);
        assert_eq!(
            into_generation(r, true).unwrap(),
            Generation::Structured(serde_json::json!({"city": "Paris"}))
        );
    }

    #[test]
    fn test_structured_generation_rejects_non_json() {
        let r = response(r#"{"choices":[{"message":{"content":"Paris"}}]}"#);
        assert!(matches!(
            into_generation(r, true),
            Err(GleanerError::Generation(_))
        ));
    }

    #[test]
    fn test_refusal_and_empty_choices() {
        let r = response(r#"{"choices":[{"message":{"content":null,"refusal":"no"}}]}"#);
        assert!(into_generation(r, false).is_err());
        let r = response(r#"{"choices":[]}"#);
        assert!(into_generation(r, false).is_err());
    }
}
