use novel_core::{
    GenerationFailure, GenerationRequest, GenerationResult, ProviderId, TextProvider, TokenUsage,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::base_url::{resolve_base_url, ANTHROPIC_BASE_URL};
use crate::error::AdapterError;
use crate::http::{build_client, read_json, require_key, settle, with_stop_notice, ProviderOptions};

const PROVIDER: ProviderId = ProviderId::Anthropic;
const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// The messages API has no listing endpoint; these are the known ids, sorted.
pub const KNOWN_MODELS: [&str; 5] = [
    "claude-3-5-sonnet-20240620",
    "claude-3-haiku-20240307",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-instant-1.2",
];

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, options: &ProviderOptions) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(options.timeout)?,
            base_url: resolve_base_url(options.base_url.as_deref(), ANTHROPIC_BASE_URL),
            api_key: require_key(PROVIDER, api_key)?,
        })
    }

    fn try_generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AdapterError> {
        let system = request.system_prompt.trim();
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            system: (!system.is_empty()).then_some(system),
            messages: vec![MessageRequest {
                role: "user",
                content: &request.prompt,
            }],
            temperature: PROVIDER.clamp_temperature(request.temperature),
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()?;
        let parsed: MessagesResponse = read_json(response)?;
        Ok(interpret_response(parsed))
    }
}

impl TextProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn list_models(&self) -> Vec<String> {
        KNOWN_MODELS.iter().map(|model| model.to_string()).collect()
    }

    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        settle(PROVIDER, &request.model, self.try_generate(request))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<MessageRequest<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn interpret_response(response: MessagesResponse) -> GenerationResult {
    let stop = response.stop_reason.as_deref();
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if stop == Some("refusal") && text.trim().is_empty() {
        return GenerationResult::failure(GenerationFailure::Blocked {
            provider: PROVIDER,
            reason: "the model refused the request".to_string(),
        });
    }
    if text.trim().is_empty() {
        return GenerationResult::failure(GenerationFailure::EmptyResponse { provider: PROVIDER });
    }

    let usage = response
        .usage
        .map(|usage| TokenUsage::new(usage.input_tokens, usage.output_tokens))
        .unwrap_or_default();
    GenerationResult::success(
        with_stop_notice(text, stop, &["end_turn", "stop_sequence"]),
        usage,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerationResult {
        interpret_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn extracts_text_blocks_and_usage() {
        let result = parse(
            r#"{
                "id": "msg_1", "type": "message", "role": "assistant",
                "content": [{"type": "text", "text": "The hero "}, {"type": "text", "text": "woke."}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 40, "output_tokens": 9}
            }"#,
        );
        assert_eq!(result.outcome.as_deref(), Ok("The hero woke."));
        assert_eq!(result.usage, TokenUsage::new(40, 9));
    }

    #[test]
    fn max_tokens_appends_notice() {
        let result = parse(
            r#"{"content": [{"type": "text", "text": "Cut"}], "stop_reason": "max_tokens",
                "usage": {"input_tokens": 1, "output_tokens": 4096}}"#,
        );
        let text = result.outcome.unwrap();
        assert!(text.starts_with("Cut\n\n["));
        assert!(text.contains("max_tokens"));
    }

    #[test]
    fn refusal_without_text_is_blocked() {
        let result = parse(r#"{"content": [], "stop_reason": "refusal"}"#);
        assert!(matches!(result.outcome, Err(GenerationFailure::Blocked { .. })));
        assert_eq!(result.usage, TokenUsage::default());
    }

    #[test]
    fn known_models_are_sorted() {
        let mut sorted = KNOWN_MODELS.to_vec();
        sorted.sort();
        assert_eq!(sorted, KNOWN_MODELS.to_vec());
        assert!(KNOWN_MODELS.contains(&PROVIDER.default_model()));
    }
}
