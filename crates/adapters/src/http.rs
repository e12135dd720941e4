use std::time::Duration;

use novel_core::{truncation_notice, GenerationResult, ProviderId};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::AdapterError;

/// Generation calls can take minutes on long scenes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12 * 60);

#[derive(Clone, Debug)]
pub struct ProviderOptions {
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AdapterError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn require_key(provider: ProviderId, api_key: &str) -> Result<String, AdapterError> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(AdapterError::InvalidConfig(format!(
            "{} requires {}",
            provider.label(),
            provider.secret_key()
        )));
    }
    Ok(key.to_string())
}

/// Reads the body, turning non-success statuses into [`AdapterError::HttpStatus`].
pub(crate) fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AdapterError> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(AdapterError::HttpStatus { status, body });
    }
    if body.trim().is_empty() {
        return Err(AdapterError::EmptyResponse);
    }
    Ok(serde_json::from_str(&body)?)
}

/// Collapses the adapter-internal error path into a result value.
pub(crate) fn settle(
    provider: ProviderId,
    model: &str,
    result: Result<GenerationResult, AdapterError>,
) -> GenerationResult {
    match result {
        Ok(result) => {
            if let Err(failure) = &result.outcome {
                log::warn!("{failure}");
            }
            result
        }
        Err(err) => {
            log::warn!("{} generation with `{model}` failed: {err}", provider.label());
            GenerationResult::failure(err.classify(provider, model))
        }
    }
}

/// Appends a notice when the stop reason is not one of the clean ones.
pub(crate) fn with_stop_notice(mut text: String, reason: Option<&str>, clean: &[&str]) -> String {
    if let Some(reason) = reason.filter(|reason| !clean.contains(reason)) {
        log::warn!("generation stopped early: {reason}");
        text.push_str(&truncation_notice(reason));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_notice_only_for_unclean_reasons() {
        assert_eq!(with_stop_notice("a".into(), Some("stop"), &["stop"]), "a");
        assert_eq!(with_stop_notice("a".into(), None, &["stop"]), "a");
        let text = with_stop_notice("a".into(), Some("length"), &["stop"]);
        assert!(text.starts_with("a\n\n["));
        assert!(text.contains("length"));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            require_key(ProviderId::Gemini, "  "),
            Err(AdapterError::InvalidConfig(_))
        ));
        assert_eq!(require_key(ProviderId::Gemini, " k ").unwrap(), "k");
    }
}
