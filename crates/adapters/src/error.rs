use novel_core::{GenerationFailure, ProviderId};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

const MAX_DETAIL_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("API returned an empty response")]
    EmptyResponse,
}

impl AdapterError {
    /// Maps a transport or protocol error onto the user-facing failure kinds.
    pub fn classify(self, provider: ProviderId, model: &str) -> GenerationFailure {
        match self {
            AdapterError::Http(err) if err.is_timeout() => GenerationFailure::Timeout { provider },
            AdapterError::Http(err) if err.is_connect() => GenerationFailure::Other {
                provider,
                detail: format!("could not connect to the API: {err}"),
            },
            AdapterError::Http(err) => GenerationFailure::Other {
                provider,
                detail: err.to_string(),
            },
            AdapterError::Json(err) => GenerationFailure::Other {
                provider,
                detail: format!("unreadable response: {err}"),
            },
            AdapterError::InvalidConfig(detail) => GenerationFailure::Other { provider, detail },
            AdapterError::EmptyResponse => GenerationFailure::EmptyResponse { provider },
            AdapterError::HttpStatus { status, body } => {
                classify_status(provider, model, status, &body)
            }
        }
    }
}

fn classify_status(
    provider: ProviderId,
    model: &str,
    status: StatusCode,
    body: &str,
) -> GenerationFailure {
    let detail = error_detail(body);
    match status.as_u16() {
        400 if mentions_api_key(&detail) => GenerationFailure::InvalidKey { provider },
        400 => GenerationFailure::InvalidArgument { provider, detail },
        401 => GenerationFailure::InvalidKey { provider },
        403 => GenerationFailure::PermissionDenied { provider },
        404 => GenerationFailure::ModelNotFound {
            provider,
            model: model.to_string(),
        },
        408 | 504 => GenerationFailure::Timeout { provider },
        422 => GenerationFailure::MalformedRequest { provider, detail },
        429 => GenerationFailure::QuotaExceeded { provider },
        // Anthropic reports overload as 529.
        529 => GenerationFailure::QuotaExceeded { provider },
        _ => GenerationFailure::Other {
            provider,
            detail: format!("HTTP {status}: {detail}"),
        },
    }
}

fn mentions_api_key(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("api key") || lower.contains("api_key")
}

/// Pulls `error.message` out of a JSON error body, falling back to the raw
/// body cut to a readable length.
pub(crate) fn error_detail(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let text = message.unwrap_or_else(|| body.trim().to_string());
    if text.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = text.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{cut}...")
    } else {
        text
    }
}
