use std::fs;
use std::path::Path;

use super::naming::{parse_chapter_folder, scene_file_name, scene_numbers};
use super::read_text_lossy;

pub const READ_ERROR_MARKER: &str = "(read error)";

fn scene_banner(number: u32) -> String {
    format!("--- Scene {number} ---")
}

fn chapter_banner(number: u32, title: &str) -> String {
    if title.is_empty() {
        format!("=== Chapter {number} ===")
    } else {
        format!("=== Chapter {number}: {} ===", title.replace('_', " "))
    }
}

/// Scene blocks of one chapter, each prefixed by its banner. Empty scenes are
/// skipped; unreadable ones keep their banner with an inline marker.
fn scene_blocks(chapter_dir: &Path, numbers: impl IntoIterator<Item = u32>) -> Vec<String> {
    let mut blocks = Vec::new();
    for number in numbers {
        let path = chapter_dir.join(scene_file_name(number));
        match read_text_lossy(&path) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    blocks.push(format!("{}\n{}", scene_banner(number), text));
                }
            }
            Err(err) => {
                log::warn!("failed to read scene `{}`: {err}", path.display());
                blocks.push(format!("{}\n{}", scene_banner(number), READ_ERROR_MARKER));
            }
        }
    }
    blocks
}

/// Concatenates every scene before `before` in ascending order, separated by
/// blank lines. Empty when `before <= 1`.
pub fn previous_scenes_text(chapter_dir: &Path, before: u32) -> String {
    if before <= 1 {
        return String::new();
    }
    let numbers = scene_numbers(chapter_dir)
        .into_iter()
        .filter(|number| *number < before);
    scene_blocks(chapter_dir, numbers).join("\n\n")
}

/// Every chapter (by number) and every scene within it (by number), wrapped
/// in chapter and scene banners.
pub fn all_novel_content(novel_dir: &Path) -> String {
    let Ok(entries) = fs::read_dir(novel_dir) else {
        return String::new();
    };

    let mut chapters: Vec<(u32, String, std::path::PathBuf)> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            parse_chapter_folder(&name).map(|(number, title)| (number, title, entry.path()))
        })
        .collect();
    chapters.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut sections = Vec::new();
    for (number, title, dir) in chapters {
        let blocks = scene_blocks(&dir, scene_numbers(&dir));
        if blocks.is_empty() {
            continue;
        }
        sections.push(format!(
            "{}\n\n{}",
            chapter_banner(number, &title),
            blocks.join("\n\n")
        ));
    }
    sections.join("\n\n")
}
