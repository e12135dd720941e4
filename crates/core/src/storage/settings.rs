use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::model::{
    ChapterSettings, LengthOption, NovelSettings, ProviderId, SceneSettings, TokenUsage,
    DEFAULT_TEMPERATURE, MAX_TEMPERATURE,
};

use super::StorageError;

pub const NOVEL_SETTINGS_KEY: &str = "novel_settings";
pub const ARC_NOTES_KEY: &str = "arc_notes";

/// Reads a JSON object. Absent files, malformed JSON and non-object roots all
/// come back as `None`; the latter two are logged.
fn read_object(path: &Path) -> Option<Map<String, Value>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            log::warn!("failed to read settings `{}`: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            log::warn!(
                "settings `{}` is not a JSON object, using defaults",
                path.display()
            );
            None
        }
        Err(err) => {
            log::warn!(
                "settings `{}` is malformed, using defaults: {err}",
                path.display()
            );
            None
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::io(parent, source))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| StorageError::io(path, source))
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    }
}

fn number_field(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn token_field(map: Option<&Map<String, Value>>, key: &str) -> u64 {
    map.and_then(|m| number_field(m.get(key)))
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u64)
        .unwrap_or(0)
}

pub fn load_novel_settings(path: &Path) -> NovelSettings {
    read_object(path)
        .map(|map| NovelSettings {
            novel_settings: string_field(&map, NOVEL_SETTINGS_KEY),
        })
        .unwrap_or_default()
}

pub fn save_novel_settings(path: &Path, settings: &NovelSettings) -> Result<(), StorageError> {
    write_json(path, &json!({ NOVEL_SETTINGS_KEY: settings.novel_settings }))
}

pub fn load_chapter_settings(path: &Path) -> ChapterSettings {
    read_object(path)
        .map(|map| ChapterSettings {
            arc_notes: string_field(&map, ARC_NOTES_KEY),
        })
        .unwrap_or_default()
}

pub fn save_chapter_settings(path: &Path, settings: &ChapterSettings) -> Result<(), StorageError> {
    write_json(path, &json!({ ARC_NOTES_KEY: settings.arc_notes }))
}

/// Never fails: every key is validated individually and replaced by its
/// default when missing or of the wrong shape.
pub fn load_scene_settings(path: &Path) -> SceneSettings {
    match read_object(path) {
        Some(map) => scene_settings_from_map(&map),
        None => SceneSettings::default(),
    }
}

fn scene_settings_from_map(map: &Map<String, Value>) -> SceneSettings {
    let temperature = number_field(map.get("temperature"))
        .map(|v| v as f32)
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_TEMPERATURE)
        .clamp(0.0, MAX_TEMPERATURE);

    let length = map
        .get("length")
        .and_then(Value::as_str)
        .and_then(LengthOption::parse)
        .unwrap_or_default();

    let model = map
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let provider = map
        .get("provider")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<ProviderId>().ok());

    let usage = map.get("token_usage").and_then(Value::as_object);

    SceneSettings {
        plot: string_field(map, "plot"),
        temperature,
        length,
        model,
        provider,
        token_usage: TokenUsage {
            input_tokens: token_field(usage, "input_tokens"),
            output_tokens: token_field(usage, "output_tokens"),
        },
    }
}

/// Writes the complete canonical key set, clamping out-of-range values.
pub fn save_scene_settings(path: &Path, settings: &SceneSettings) -> Result<(), StorageError> {
    let temperature = if settings.temperature.is_finite() {
        settings.temperature.clamp(0.0, MAX_TEMPERATURE)
    } else {
        DEFAULT_TEMPERATURE
    };
    let document = json!({
        "plot": settings.plot,
        "temperature": temperature,
        "length": settings.length.as_str(),
        "model": settings.model,
        "provider": settings.provider.map(|p| p.as_str()),
        "token_usage": {
            "input_tokens": settings.token_usage.input_tokens,
            "output_tokens": settings.token_usage.output_tokens,
        },
    });
    write_json(path, &document)
}
