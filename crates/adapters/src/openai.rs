use novel_core::{
    GenerationFailure, GenerationRequest, GenerationResult, ProviderId, TextProvider, TokenUsage,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::base_url::{resolve_base_url, OPENAI_BASE_URL};
use crate::error::AdapterError;
use crate::http::{build_client, read_json, require_key, settle, with_stop_notice, ProviderOptions};

const PROVIDER: ProviderId = ProviderId::OpenAi;
const MODEL_FAMILIES: [&str; 2] = ["gpt-4", "gpt-3.5"];

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, options: &ProviderOptions) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(options.timeout)?,
            base_url: resolve_base_url(options.base_url.as_deref(), OPENAI_BASE_URL),
            api_key: require_key(PROVIDER, api_key)?,
        })
    }

    fn try_list_models(&self) -> Result<Vec<String>, AdapterError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()?;
        let parsed: ModelList = read_json(response)?;
        Ok(chat_models(parsed))
    }

    fn try_generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AdapterError> {
        let mut messages = Vec::with_capacity(2);
        let system = request.system_prompt.trim();
        if !system.is_empty() {
            messages.push(ChatMessageRequest {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessageRequest {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatCompletionRequest {
            model: &request.model,
            messages,
            temperature: PROVIDER.clamp_temperature(request.temperature),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let parsed: ChatCompletionResponse = read_json(response)?;
        Ok(interpret_response(parsed))
    }
}

impl TextProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn list_models(&self) -> Vec<String> {
        self.try_list_models().unwrap_or_else(|err| {
            log::warn!("failed to list OpenAI models: {err}");
            Vec::new()
        })
    }

    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        settle(PROVIDER, &request.model, self.try_generate(request))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn chat_models(list: ModelList) -> Vec<String> {
    let mut names: Vec<String> = list
        .data
        .into_iter()
        .map(|model| model.id)
        .filter(|id| MODEL_FAMILIES.iter().any(|family| id.starts_with(family)))
        .collect();
    names.sort();
    names.dedup();
    names
}

fn interpret_response(response: ChatCompletionResponse) -> GenerationResult {
    let Some(choice) = response.choices.into_iter().next() else {
        return GenerationResult::failure(GenerationFailure::EmptyResponse { provider: PROVIDER });
    };
    let finish = choice.finish_reason.as_deref();
    let text = choice
        .message
        .and_then(|message| message.content)
        .unwrap_or_default();

    if finish == Some("content_filter") && text.trim().is_empty() {
        return GenerationResult::failure(GenerationFailure::Blocked {
            provider: PROVIDER,
            reason: "content_filter".to_string(),
        });
    }
    if text.trim().is_empty() {
        return GenerationResult::failure(GenerationFailure::EmptyResponse { provider: PROVIDER });
    }

    let usage = response
        .usage
        .map(|usage| TokenUsage::new(usage.prompt_tokens, usage.completion_tokens))
        .unwrap_or_default();
    GenerationResult::success(with_stop_notice(text, finish, &["stop"]), usage)
}
