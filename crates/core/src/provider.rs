use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{ProviderId, TokenUsage};

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: String,
    /// Raw requested value; providers clamp it into their own range.
    pub temperature: Option<f32>,
}

/// A classified provider failure. `Display` is the message shown to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("{provider}: the response was blocked by the content filter ({reason})")]
    Blocked { provider: ProviderId, reason: String },
    #[error("{provider}: the request was rejected as invalid: {detail}")]
    InvalidArgument { provider: ProviderId, detail: String },
    #[error("{provider}: quota or rate limit exceeded, try again later")]
    QuotaExceeded { provider: ProviderId },
    #[error("{provider}: the request timed out")]
    Timeout { provider: ProviderId },
    #[error("{provider}: permission denied for this API key")]
    PermissionDenied { provider: ProviderId },
    #[error("{provider}: the API key is missing or invalid")]
    InvalidKey { provider: ProviderId },
    #[error("{provider}: model `{model}` was not found")]
    ModelNotFound { provider: ProviderId, model: String },
    #[error("{provider}: the request was malformed: {detail}")]
    MalformedRequest { provider: ProviderId, detail: String },
    #[error("{provider}: the response contained no text")]
    EmptyResponse { provider: ProviderId },
    #[error("{provider}: unexpected error: {detail}")]
    Other { provider: ProviderId, detail: String },
}

impl GenerationFailure {
    pub fn provider(&self) -> ProviderId {
        match self {
            GenerationFailure::Blocked { provider, .. }
            | GenerationFailure::InvalidArgument { provider, .. }
            | GenerationFailure::QuotaExceeded { provider }
            | GenerationFailure::Timeout { provider }
            | GenerationFailure::PermissionDenied { provider }
            | GenerationFailure::InvalidKey { provider }
            | GenerationFailure::ModelNotFound { provider, .. }
            | GenerationFailure::MalformedRequest { provider, .. }
            | GenerationFailure::EmptyResponse { provider }
            | GenerationFailure::Other { provider, .. } => *provider,
        }
    }
}

/// Outcome of one generation call. Failures always carry zeroed usage.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationResult {
    pub outcome: Result<String, GenerationFailure>,
    pub usage: TokenUsage,
}

impl GenerationResult {
    pub fn success(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            outcome: Ok(text.into()),
            usage,
        }
    }

    pub fn failure(failure: GenerationFailure) -> Self {
        Self {
            outcome: Err(failure),
            usage: TokenUsage::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Appended to text whose generation stopped for a reason other than a clean
/// finish, so partial output is kept and flagged.
pub fn truncation_notice(reason: &str) -> String {
    format!("\n\n[Generation stopped early: {reason}]")
}

/// One text-generation backend.
///
/// Implementations never panic or return transport errors to the caller:
/// every path ends in a [`GenerationResult`], and model listing degrades to an
/// empty list.
pub trait TextProvider: Send + Sync {
    fn id(&self) -> ProviderId;
    fn list_models(&self) -> Vec<String>;
    fn generate(&self, request: &GenerationRequest) -> GenerationResult;
}

#[derive(Clone)]
struct RegisteredProvider {
    provider: Arc<dyn TextProvider>,
    models: Vec<String>,
}

/// The providers that are configured for this session, with their cached
/// model lists.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` with an explicit model list (no network call).
    pub fn insert_with_models(&mut self, provider: Arc<dyn TextProvider>, models: Vec<String>) {
        let id = provider.id();
        self.providers
            .insert(id, RegisteredProvider { provider, models });
    }

    /// Registers `provider`, enumerating its models now.
    pub fn insert(&mut self, provider: Arc<dyn TextProvider>) {
        let models = provider.list_models();
        if models.is_empty() {
            log::warn!("{} reported no usable models", provider.id().label());
        }
        self.insert_with_models(provider, models);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.providers.contains_key(&id)
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn TextProvider>> {
        self.providers
            .get(&id)
            .map(|entry| Arc::clone(&entry.provider))
    }

    pub fn models(&self, id: ProviderId) -> &[String] {
        self.providers
            .get(&id)
            .map(|entry| entry.models.as_slice())
            .unwrap_or(&[])
    }

    pub fn refresh_models(&mut self, id: ProviderId) {
        if let Some(entry) = self.providers.get_mut(&id) {
            entry.models = entry.provider.list_models();
        }
    }
}

/// Picks the model to use after the active provider changes: the stored
/// preference, then the current session model, then the provider default,
/// then the first available model.
pub fn resolve_model(
    provider: ProviderId,
    models: &[String],
    preferred: Option<&str>,
    current: Option<&str>,
) -> Option<String> {
    let available = |name: &str| models.iter().any(|model| model == name);
    preferred
        .filter(|name| available(name))
        .or_else(|| current.filter(|name| available(name)))
        .or_else(|| Some(provider.default_model()).filter(|name| available(name)))
        .map(str::to_string)
        .or_else(|| models.first().cloned())
}
