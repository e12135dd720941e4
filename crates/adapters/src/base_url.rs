use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/v\d+[a-z0-9]*$").unwrap());

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Resolves an optional override against a default, appending `/v1` when the
/// override carries no version segment. A trailing `#` keeps the override
/// verbatim (minus the `#`).
pub fn resolve_base_url(input: Option<&str>, default: &str) -> String {
    let trimmed = input.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return default.to_string();
    }

    if trimmed.ends_with('#') {
        return trimmed
            .trim_end_matches('#')
            .trim_end_matches('/')
            .to_string();
    }

    let without_slash = trimmed.trim_end_matches('/');
    if VERSION_SUFFIX_RE.is_match(without_slash) || without_slash.contains("/v1") {
        without_slash.to_string()
    } else {
        format!("{without_slash}/v1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_override_uses_default() {
        assert_eq!(resolve_base_url(None, OPENAI_BASE_URL), OPENAI_BASE_URL);
        assert_eq!(resolve_base_url(Some("  "), OPENAI_BASE_URL), OPENAI_BASE_URL);
    }

    #[test]
    fn appends_v1_when_missing() {
        assert_eq!(
            resolve_base_url(Some("http://127.0.0.1:8080/"), OPENAI_BASE_URL),
            "http://127.0.0.1:8080/v1"
        );
    }

    #[test]
    fn keeps_existing_version() {
        assert_eq!(
            resolve_base_url(Some("https://example.com/v2"), OPENAI_BASE_URL),
            "https://example.com/v2"
        );
        assert_eq!(
            resolve_base_url(Some("https://proxy.local/v1beta/"), GEMINI_BASE_URL),
            "https://proxy.local/v1beta"
        );
    }

    #[test]
    fn respects_hash_suffix() {
        assert_eq!(
            resolve_base_url(Some("https://example.com/raw/#"), OPENAI_BASE_URL),
            "https://example.com/raw"
        );
    }
}
