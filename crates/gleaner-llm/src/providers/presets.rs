use std::collections::HashMap;

use gleaner_core::config::ModelConfig;
use gleaner_core::types::Capabilities;

/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
    /// Accepts `response_format: json_schema`.
    pub native_structured_output: bool,
    /// Follows textual output-format instructions reliably.
    pub text_format_instructions: bool,
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
            native_structured_output: true,
            text_format_instructions: true,
        }),
        "mistral" => Some(ProviderPreset {
            default_base_url: "https://api.mistral.ai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
            native_structured_output: true,
            text_format_instructions: true,
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
            extra_headers: &[],
            native_structured_output: false,
            text_format_instructions: true,
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
            native_structured_output: false,
            text_format_instructions: true,
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[("X-Title", "Gleaner")],
            native_structured_output: false,
            text_format_instructions: true,
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
            native_structured_output: false,
            text_format_instructions: true,
        }),
        "deepseek" => Some(ProviderPreset {
            default_base_url: "https://api.deepseek.com/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
            native_structured_output: false,
            text_format_instructions: true,
        }),
        // Bedrock-hosted models behind an OpenAI-compatible gateway: no
        // schema or JSON affordance, raw text only.
        "bedrock" => Some(ProviderPreset {
            default_base_url: "http://localhost:8080/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
            native_structured_output: false,
            text_format_instructions: false,
        }),
        _ => None,
    }
}

/// Resolve capability flags: explicit config overrides win over the preset.
/// Unknown providers are assumed to follow instructions but not enforce schemas.
pub fn resolve_capabilities(config: &ModelConfig) -> Capabilities {
    let (native, text) = get_preset(&config.provider)
        .map(|p| (p.native_structured_output, p.text_format_instructions))
        .unwrap_or((false, true));

    Capabilities::new(
        config.structured_output.unwrap_or(native),
        config.format_instructions.unwrap_or(text),
    )
}

/// Build extra headers from a preset + user config overrides.
pub fn build_extra_headers(
    preset: &ProviderPreset,
    user_headers: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = preset
        .extra_headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for (k, v) in user_headers {
        // User overrides take precedence
        if let Some(pos) = headers.iter().position(|(hk, _)| hk == k) {
            headers[pos].1 = v.clone();
        } else {
            headers.push((k.clone(), v.clone()));
        }
    }

    headers
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &[
        "openai",
        "mistral",
        "ollama",
        "groq",
        "openrouter",
        "together",
        "deepseek",
        "bedrock",
    ]
}
