use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::ProviderId;

pub const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional web novel author. Write vivid, \
engaging prose with natural dialogue, keep characters consistent with the provided settings, \
and never break the fourth wall.";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_bg_color() -> String {
    "#1e1e1e".to_string()
}

fn default_fg_color() -> String {
    "#e0e0e0".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Process-wide settings persisted as a single flat JSON object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub last_provider: Option<ProviderId>,
    #[serde(default)]
    pub last_model: Option<String>,
    #[serde(default)]
    pub summary_model_gemini: Option<String>,
    #[serde(default)]
    pub summary_model_anthropic: Option<String>,
    #[serde(default)]
    pub summary_model_openai: Option<String>,
    #[serde(default = "default_bg_color")]
    pub output_bg_color: String,
    #[serde(default = "default_fg_color")]
    pub output_fg_color: String,
    #[serde(default = "default_true")]
    pub ask_for_missing_keys: bool,
    #[serde(default)]
    pub image_font_path: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            last_provider: None,
            last_model: None,
            summary_model_gemini: None,
            summary_model_anthropic: None,
            summary_model_openai: None,
            output_bg_color: default_bg_color(),
            output_fg_color: default_fg_color(),
            ask_for_missing_keys: true,
            image_font_path: None,
        }
    }
}

impl GlobalConfig {
    pub fn summary_model(&self, provider: ProviderId) -> Option<&str> {
        let value = match provider {
            ProviderId::Gemini => &self.summary_model_gemini,
            ProviderId::Anthropic => &self.summary_model_anthropic,
            ProviderId::OpenAi => &self.summary_model_openai,
        };
        value.as_deref().filter(|name| !name.trim().is_empty())
    }

    pub fn set_summary_model(&mut self, provider: ProviderId, model: Option<String>) {
        let slot = match provider {
            ProviderId::Gemini => &mut self.summary_model_gemini,
            ProviderId::Anthropic => &mut self.summary_model_anthropic,
            ProviderId::OpenAi => &mut self.summary_model_openai,
        };
        *slot = model;
    }

    /// Parses a stored document, back-filling every missing key. The boolean
    /// reports whether the stored document lacked keys (or was unusable) and
    /// should be re-saved.
    pub fn from_json_str(input: &str) -> (Self, bool) {
        if input.trim().is_empty() {
            return (Self::default(), true);
        }

        let value: Value = match serde_json::from_str(input) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("config is not valid JSON, using defaults: {err}");
                return (Self::default(), true);
            }
        };

        let Value::Object(stored) = value else {
            log::warn!("config root is not a JSON object, using defaults");
            return (Self::default(), true);
        };

        let mut merged = canonical_object(&Self::default());
        let mut changed = false;
        for key in merged.keys().cloned().collect::<Vec<_>>() {
            match stored.get(&key) {
                Some(found) => {
                    merged.insert(key, found.clone());
                }
                None => changed = true,
            }
        }

        match serde_json::from_value::<Self>(Value::Object(merged)) {
            Ok(config) => (config, changed),
            Err(err) => {
                log::warn!("config has values of the wrong type, using defaults: {err}");
                (Self::default(), true)
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<(Self, bool), ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_json_str(&data))
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn canonical_object(config: &GlobalConfig) -> Map<String, Value> {
    match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: GlobalConfig,
}

impl ConfigStore {
    /// Loads the config at `path`, creating it with defaults when absent and
    /// re-saving it when keys had to be back-filled.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let (config, needs_save) = if path.exists() {
            GlobalConfig::from_path(&path)?
        } else {
            (GlobalConfig::default(), true)
        };

        let store = Self { path, config };
        if needs_save {
            store.save()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GlobalConfig {
        &mut self.config
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.config.to_path(&self.path)
    }

    pub fn touch_provider(&mut self, provider: ProviderId) {
        self.config.last_provider = Some(provider);
    }

    pub fn touch_model(&mut self, model: Option<String>) {
        self.config.last_model = model;
    }
}
