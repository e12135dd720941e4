use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

pub const UNTITLED: &str = "Untitled";
pub const MAX_NAME_BYTES: usize = 200;

static FORBIDDEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid forbidden-char regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
// `\w` is Unicode-aware, which keeps Hangul alongside ASCII word characters.
static DISALLOWED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-가-힣ㄱ-ㅎㅏ-ㅣ]").expect("valid disallowed-char regex"));
static CHAPTER_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Chapter_(\d+)(?:_(.*))?$").expect("valid chapter regex"));
static SCENE_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.txt$").expect("valid scene regex"));

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_edge_char(c: char) -> bool {
    c == '_' || c == '-' || c == '.' || c.is_whitespace()
}

/// Makes `name` safe to use as a single path component.
///
/// Total and idempotent: the result is never empty and feeding it back in
/// returns it unchanged.
pub fn sanitize(name: &str) -> String {
    let stripped = FORBIDDEN_RE.replace_all(name, "");
    let underscored = WHITESPACE_RE.replace_all(stripped.trim(), "_");
    let cleaned = DISALLOWED_RE.replace_all(&underscored, "");

    let trimmed = cleaned.trim_matches(is_edge_char);
    let truncated = truncate_bytes(trimmed, MAX_NAME_BYTES).trim_matches(is_edge_char);

    let base = if truncated.is_empty() {
        UNTITLED
    } else {
        truncated
    };

    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
    {
        format!("_{base}_")
    } else {
        base.to_string()
    }
}

fn truncate_bytes(value: &str, limit: usize) -> &str {
    if value.len() <= limit {
        return value;
    }
    let mut end = limit;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// `Chapter_007` or `Chapter_007_The_Duel`.
pub fn chapter_folder_name(number: u32, title: &str) -> String {
    if title.trim().is_empty() {
        format!("Chapter_{number:03}")
    } else {
        format!("Chapter_{number:03}_{}", sanitize(title))
    }
}

/// Returns the chapter number and the (possibly empty) title suffix.
pub fn parse_chapter_folder(name: &str) -> Option<(u32, String)> {
    let captures = CHAPTER_DIR_RE.captures(name)?;
    let number = captures.get(1)?.as_str().parse().ok()?;
    let title = captures
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Some((number, title))
}

pub fn scene_file_name(number: u32) -> String {
    format!("{number:03}.txt")
}

pub fn scene_settings_file_name(number: u32) -> String {
    format!("{number:03}_settings.json")
}

pub fn parse_scene_file(name: &str) -> Option<u32> {
    SCENE_FILE_RE
        .captures(name)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn scan_numbers<F>(dir: &Path, want_dirs: bool, parse: F) -> Vec<u32>
where
    F: Fn(&str) -> Option<u32>,
{
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut numbers: Vec<u32> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_type()
                .map(|kind| kind.is_dir() == want_dirs)
                .unwrap_or(false)
        })
        .filter_map(|entry| parse(&entry.file_name().to_string_lossy()))
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

/// Scene numbers present in `chapter_dir`, ascending.
pub fn scene_numbers(chapter_dir: &Path) -> Vec<u32> {
    scan_numbers(chapter_dir, false, parse_scene_file)
}

/// Chapter numbers present in `novel_dir`, ascending.
pub fn chapter_numbers(novel_dir: &Path) -> Vec<u32> {
    scan_numbers(novel_dir, true, |name| {
        parse_chapter_folder(name).map(|(number, _)| number)
    })
}

/// Highest existing number plus one. Numbers freed by deleting the highest
/// entry are handed out again on the next scan.
pub fn next_chapter_number(novel_dir: &Path) -> u32 {
    chapter_numbers(novel_dir)
        .last()
        .map_or(1, |max| max.saturating_add(1))
}

pub fn next_scene_number(chapter_dir: &Path) -> u32 {
    scene_numbers(chapter_dir)
        .last()
        .map_or(1, |max| max.saturating_add(1))
}
