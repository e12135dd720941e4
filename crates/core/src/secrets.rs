//! dotenv-style `KEY=value` secrets file.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::ProviderId;

pub const SECRETS_FILE_NAME: &str = ".env";

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("failed to access secrets file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid secret name `{0}`")]
    InvalidKey(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

#[derive(Clone, Debug)]
pub struct SecretsFile {
    path: PathBuf,
    lines: Vec<Line>,
    use_process_env: bool,
}

impl SecretsFile {
    /// Reads the file at `path`; a missing file is an empty secrets set.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SecretsError> {
        let path = path.into();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(SecretsError::Io { path, source }),
        };
        Ok(Self {
            path,
            lines: text.lines().map(parse_line).collect(),
            use_process_env: true,
        })
    }

    /// Ignores process environment variables; only the file is consulted.
    pub fn file_only(mut self) -> Self {
        self.use_process_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Environment variables take precedence over the file.
    pub fn get(&self, key: &str) -> Option<String> {
        if self.use_process_env {
            if let Ok(value) = env::var(key) {
                if !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key && !value.trim().is_empty() => {
                Some(value.trim().to_string())
            }
            _ => None,
        })
    }

    pub fn provider_key(&self, provider: ProviderId) -> Option<String> {
        self.get(provider.secret_key())
    }

    pub fn missing_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|provider| self.provider_key(*provider).is_none())
            .collect()
    }

    /// Replaces the first line for `key` (dropping later duplicates) or appends
    /// a new one; every other line is preserved verbatim.
    pub fn upsert(&mut self, key: &str, value: &str) -> Result<(), SecretsError> {
        let key = key.trim();
        if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
            return Err(SecretsError::InvalidKey(key.to_string()));
        }

        let mut replaced = false;
        self.lines.retain_mut(|line| match line {
            Line::Entry { key: k, value: v } if k == key => {
                if replaced {
                    false
                } else {
                    *v = value.trim().to_string();
                    replaced = true;
                    true
                }
            }
            _ => true,
        });

        if !replaced {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.trim().to_string(),
            });
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), SecretsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SecretsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let mut text = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    text.push_str(key);
                    text.push('=');
                    text.push_str(value);
                }
                Line::Other(raw) => text.push_str(raw),
            }
            text.push('\n');
        }
        fs::write(&self.path, text).map_err(|source| SecretsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Other(raw.to_string());
    }
    let body = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    match body.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Line::Entry {
            key: key.trim().to_string(),
            value: unquote(value.trim()).to_string(),
        },
        _ => Line::Other(raw.to_string()),
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_entries_and_ignores_comments() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SECRETS_FILE_NAME);
        fs::write(
            &path,
            "# keys\nGOOGLE_API_KEY=\"g-123\"\nexport OPENAI_API_KEY=sk-1\nbroken line\n",
        )
        .unwrap();

        let secrets = SecretsFile::load(&path).unwrap().file_only();
        assert_eq!(secrets.get("GOOGLE_API_KEY").as_deref(), Some("g-123"));
        assert_eq!(
            secrets.provider_key(ProviderId::OpenAi).as_deref(),
            Some("sk-1")
        );
        assert_eq!(secrets.missing_providers(), vec![ProviderId::Anthropic]);
    }

    #[test]
    fn upsert_preserves_other_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SECRETS_FILE_NAME);
        fs::write(&path, "# header\nOPENAI_API_KEY=old\nOTHER=keep\n").unwrap();

        let mut secrets = SecretsFile::load(&path).unwrap().file_only();
        secrets.upsert("OPENAI_API_KEY", "new").unwrap();
        secrets.upsert("ANTHROPIC_API_KEY", "ant").unwrap();
        secrets.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "# header\nOPENAI_API_KEY=new\nOTHER=keep\nANTHROPIC_API_KEY=ant\n"
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let secrets = SecretsFile::load(temp.path().join("absent.env"))
            .unwrap()
            .file_only();
        assert_eq!(secrets.missing_providers().len(), 3);
    }

    #[test]
    fn rejects_invalid_key() {
        let temp = tempdir().unwrap();
        let mut secrets = SecretsFile::load(temp.path().join(".env")).unwrap();
        assert!(secrets.upsert("BAD KEY", "x").is_err());
        assert!(secrets.upsert("", "x").is_err());
    }
}
