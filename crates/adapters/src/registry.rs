use std::sync::Arc;
use std::time::Duration;

use novel_core::{ProviderId, ProviderRegistry, SecretsFile, TextProvider};

use crate::anthropic::AnthropicProvider;
use crate::error::AdapterError;
use crate::gemini::GeminiProvider;
use crate::http::ProviderOptions;
use crate::openai::OpenAiProvider;

pub fn create_provider(
    id: ProviderId,
    api_key: &str,
    options: &ProviderOptions,
) -> Result<Arc<dyn TextProvider>, AdapterError> {
    Ok(match id {
        ProviderId::Gemini => Arc::new(GeminiProvider::new(api_key, options)?),
        ProviderId::Anthropic => Arc::new(AnthropicProvider::new(api_key, options)?),
        ProviderId::OpenAi => Arc::new(OpenAiProvider::new(api_key, options)?),
    })
}

pub fn provider_options(secrets: &SecretsFile, id: ProviderId, timeout: Duration) -> ProviderOptions {
    ProviderOptions {
        base_url: secrets.get(id.base_url_key()),
        timeout,
    }
}

/// Builds a provider for every configured secret and enumerates its models.
/// Providers without a secret are skipped; the registry may end up empty.
pub fn connect_providers(secrets: &SecretsFile, timeout: Duration) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for id in ProviderId::ALL {
        let Some(key) = secrets.provider_key(id) else {
            log::info!("{} is not configured ({} missing)", id.label(), id.secret_key());
            continue;
        };
        match create_provider(id, &key, &provider_options(secrets, id, timeout)) {
            Ok(provider) => {
                registry.insert(provider);
                log::info!(
                    "{} ready with {} models",
                    id.label(),
                    registry.models(id).len()
                );
            }
            Err(err) => log::warn!("{} could not be initialised: {err}", id.label()),
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn creates_each_provider_kind() {
        let options = ProviderOptions::default();
        for id in ProviderId::ALL {
            let provider = create_provider(id, "test-key", &options).unwrap();
            assert_eq!(provider.id(), id);
        }
        assert!(create_provider(ProviderId::OpenAi, "", &options).is_err());
    }

    #[test]
    fn connect_skips_unconfigured_providers() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, "ANTHROPIC_API_KEY=sk-ant-test\n").unwrap();
        let secrets = SecretsFile::load(&path).unwrap().file_only();

        let registry = connect_providers(&secrets, Duration::from_secs(1));
        assert_eq!(registry.ids(), vec![ProviderId::Anthropic]);
        assert!(registry
            .models(ProviderId::Anthropic)
            .iter()
            .any(|model| model == ProviderId::Anthropic.default_model()));
    }
}
