use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    Anthropic,
    OpenAi,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [ProviderId::Gemini, ProviderId::Anthropic, ProviderId::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenAi => "openai",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "Google Gemini",
            ProviderId::Anthropic => "Anthropic Claude",
            ProviderId::OpenAi => "OpenAI",
        }
    }

    /// Name of the secret that enables this provider.
    pub fn secret_key(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "GOOGLE_API_KEY",
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn base_url_key(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "GEMINI_BASE_URL",
            ProviderId::Anthropic => "ANTHROPIC_BASE_URL",
            ProviderId::OpenAi => "OPENAI_BASE_URL",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini-1.5-pro-latest",
            ProviderId::Anthropic => "claude-3-5-sonnet-20240620",
            ProviderId::OpenAi => "gpt-4o",
        }
    }

    pub fn temperature_range(&self) -> (f32, f32) {
        match self {
            ProviderId::Anthropic => (0.0, 1.0),
            ProviderId::Gemini | ProviderId::OpenAi => (0.0, MAX_TEMPERATURE),
        }
    }

    /// Clamps into the provider's accepted range. Missing or non-finite values
    /// fall back to [`DEFAULT_TEMPERATURE`] before clamping.
    pub fn clamp_temperature(&self, value: Option<f32>) -> f32 {
        let (min, max) = self.temperature_range();
        let value = value
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_TEMPERATURE);
        value.clamp(min, max)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider `{0}`")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "openai" | "gpt" => Ok(ProviderId::OpenAi),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Target length of a generated scene.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthOption {
    Short,
    #[default]
    Medium,
    Long,
    VeryLong,
}

impl LengthOption {
    pub const ALL: [Self; 4] = [
        LengthOption::Short,
        LengthOption::Medium,
        LengthOption::Long,
        LengthOption::VeryLong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthOption::Short => "short",
            LengthOption::Medium => "medium",
            LengthOption::Long => "long",
            LengthOption::VeryLong => "very_long",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            LengthOption::Short => "about 1,500 characters",
            LengthOption::Medium => "about 3,000 characters",
            LengthOption::Long => "about 5,000 characters",
            LengthOption::VeryLong => "about 8,000 characters",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|option| option.as_str().eq_ignore_ascii_case(needle))
    }
}

impl fmt::Display for LengthOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Persisted per-scene generation parameters and metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    pub plot: String,
    pub temperature: f32,
    pub length: LengthOption,
    pub model: Option<String>,
    pub provider: Option<ProviderId>,
    pub token_usage: TokenUsage,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            plot: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            length: LengthOption::default(),
            model: None,
            provider: None,
            token_usage: TokenUsage::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelSettings {
    pub novel_settings: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSettings {
    pub arc_notes: String,
}

/// Parameters captured when a scene is generated, written into that scene's
/// settings file once the result arrives.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSnapshot {
    pub provider: ProviderId,
    pub model: String,
    pub temperature: f32,
    pub length: LengthOption,
    pub plot: String,
}

impl GenerationSnapshot {
    pub fn into_settings(self, usage: TokenUsage) -> SceneSettings {
        SceneSettings {
            plot: self.plot,
            temperature: self.temperature,
            length: self.length,
            model: Some(self.model),
            provider: Some(self.provider),
            token_usage: usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_temperature_per_provider() {
        assert_eq!(ProviderId::Anthropic.clamp_temperature(Some(1.7)), 1.0);
        assert_eq!(ProviderId::Gemini.clamp_temperature(Some(1.7)), 1.7);
        assert_eq!(ProviderId::OpenAi.clamp_temperature(Some(9.0)), 2.0);
        assert_eq!(ProviderId::OpenAi.clamp_temperature(Some(-1.0)), 0.0);
        assert_eq!(
            ProviderId::Gemini.clamp_temperature(None),
            DEFAULT_TEMPERATURE
        );
        assert_eq!(
            ProviderId::Gemini.clamp_temperature(Some(f32::NAN)),
            DEFAULT_TEMPERATURE
        );
    }

    #[test]
    fn parses_provider_aliases() {
        assert_eq!("Claude".parse::<ProviderId>(), Ok(ProviderId::Anthropic));
        assert_eq!("openai".parse::<ProviderId>(), Ok(ProviderId::OpenAi));
        let err = "mistral".parse::<ProviderId>().unwrap_err();
        assert_eq!(err.to_string(), "unknown provider `mistral`");
    }

    #[test]
    fn length_option_parse_is_case_insensitive() {
        assert_eq!(LengthOption::parse("LONG"), Some(LengthOption::Long));
        assert_eq!(LengthOption::parse("very_long"), Some(LengthOption::VeryLong));
        assert_eq!(LengthOption::parse("epic"), None);
    }
}
