use novel_core::{
    GenerationFailure, GenerationRequest, GenerationResult, ProviderId, TextProvider, TokenUsage,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::base_url::{resolve_base_url, GEMINI_BASE_URL};
use crate::error::AdapterError;
use crate::http::{build_client, read_json, require_key, settle, with_stop_notice, ProviderOptions};

const PROVIDER: ProviderId = ProviderId::Gemini;
const GENERATE_METHOD: &str = "generateContent";
const BLOCKING_FINISH_REASONS: [&str; 4] =
    ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, options: &ProviderOptions) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(options.timeout)?,
            base_url: resolve_base_url(options.base_url.as_deref(), GEMINI_BASE_URL),
            api_key: require_key(PROVIDER, api_key)?,
        })
    }

    fn try_list_models(&self) -> Result<Vec<String>, AdapterError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("pageSize", "1000")])
            .send()?;
        let parsed: ModelList = read_json(response)?;
        Ok(generation_models(parsed))
    }

    fn try_generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AdapterError> {
        let system = request.system_prompt.trim();
        let body = GeminiRequest {
            contents: vec![GeminiRequestContent {
                role: "user",
                parts: vec![GeminiRequestPart {
                    text: &request.prompt,
                }],
            }],
            system_instruction: (!system.is_empty()).then(|| GeminiSystemInstruction {
                parts: vec![GeminiRequestPart { text: system }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: PROVIDER.clamp_temperature(request.temperature),
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:{GENERATE_METHOD}",
                self.base_url, request.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?;
        let parsed: GeminiResponse = read_json(response)?;
        Ok(interpret_response(parsed))
    }
}

impl TextProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn list_models(&self) -> Vec<String> {
        self.try_list_models().unwrap_or_else(|err| {
            log::warn!("failed to list Gemini models: {err}");
            Vec::new()
        })
    }

    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        settle(PROVIDER, &request.model, self.try_generate(request))
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiRequestContent<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiRequestContent<'a> {
    role: &'static str,
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Serialize)]
struct GeminiRequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

fn generation_models(list: ModelList) -> Vec<String> {
    let mut names: Vec<String> = list
        .models
        .into_iter()
        .filter(|model| {
            model
                .supported_generation_methods
                .iter()
                .any(|method| method == GENERATE_METHOD)
        })
        .map(|model| {
            model
                .name
                .strip_prefix("models/")
                .unwrap_or(&model.name)
                .to_string()
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

fn interpret_response(response: GeminiResponse) -> GenerationResult {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return GenerationResult::failure(GenerationFailure::Blocked {
            provider: PROVIDER,
            reason: format!("prompt blocked: {reason}"),
        });
    }

    let usage = response
        .usage_metadata
        .map(|usage| TokenUsage::new(usage.prompt_token_count, usage.candidates_token_count))
        .unwrap_or_default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        return GenerationResult::failure(GenerationFailure::EmptyResponse { provider: PROVIDER });
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| match part {
                    GeminiPart::Text { text } => Some(text),
                    GeminiPart::Other(_) => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let finish = candidate.finish_reason.as_deref();

    if let Some(reason) = finish.filter(|reason| BLOCKING_FINISH_REASONS.contains(reason)) {
        if text.trim().is_empty() {
            return GenerationResult::failure(GenerationFailure::Blocked {
                provider: PROVIDER,
                reason: format!("response blocked: {reason}"),
            });
        }
    }
    if text.trim().is_empty() {
        return GenerationResult::failure(GenerationFailure::EmptyResponse { provider: PROVIDER });
    }

    GenerationResult::success(
        with_stop_notice(text, finish, &["STOP", "FINISH_REASON_UNSPECIFIED"]),
        usage,
    )
}
