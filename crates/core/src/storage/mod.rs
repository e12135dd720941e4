//! Maps novels, chapters and scenes onto a directory tree:
//!
//! ```text
//! <base>/<Novel>/novel_settings.json
//! <base>/<Novel>/Chapter_<NNN>[_<Title>]/chapter_settings.json
//! <base>/<Novel>/Chapter_<NNN>[_<Title>]/<SSS>.txt
//! <base>/<Novel>/Chapter_<NNN>[_<Title>]/<SSS>_settings.json
//! ```
//!
//! Numbers are allocated by scanning for the highest existing prefix, so a
//! number removed from the top of a listing (by deletion or by an outside
//! tool) is reused by the next allocation. There is no file locking; the
//! last writer wins.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{ChapterSettings, NovelSettings, SceneSettings};

mod aggregate;
pub mod naming;
pub mod settings;

pub use aggregate::{all_novel_content, previous_scenes_text, READ_ERROR_MARKER};
pub use naming::{
    chapter_folder_name, next_chapter_number, next_scene_number, parse_chapter_folder,
    parse_scene_file, sanitize, scene_file_name, scene_settings_file_name,
};

pub const NOVEL_SETTINGS_FILE_NAME: &str = "novel_settings.json";
pub const CHAPTER_SETTINGS_FILE_NAME: &str = "chapter_settings.json";
pub const SUMMARY_FILE_NAME: &str = "novel_summary.txt";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file operation failed on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode `{path}`: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("`{0}` does not exist")]
    NotFound(String),
    #[error("`{0}` is not a chapter folder")]
    NotAChapter(String),
}

impl StorageError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterEntry {
    pub number: u32,
    pub title: String,
    pub folder: String,
    pub scenes: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NovelEntry {
    pub name: String,
    pub chapters: Vec<ChapterEntry>,
}

/// Root of the on-disk hierarchy. Cheap to clone; holds only the base path.
#[derive(Clone, Debug)]
pub struct NovelStore {
    base: PathBuf,
}

impl NovelStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn ensure_base(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base).map_err(|source| StorageError::io(&self.base, source))
    }

    pub fn novel_dir(&self, novel: &str) -> PathBuf {
        self.base.join(novel)
    }

    pub fn chapter_dir(&self, novel: &str, folder: &str) -> PathBuf {
        self.novel_dir(novel).join(folder)
    }

    pub fn scene_path(&self, novel: &str, folder: &str, scene: u32) -> PathBuf {
        self.chapter_dir(novel, folder).join(scene_file_name(scene))
    }

    pub fn scene_settings_path(&self, novel: &str, folder: &str, scene: u32) -> PathBuf {
        self.chapter_dir(novel, folder)
            .join(scene_settings_file_name(scene))
    }

    pub fn summary_path(&self, novel: &str) -> PathBuf {
        self.novel_dir(novel).join(SUMMARY_FILE_NAME)
    }

    pub fn novel_exists(&self, novel: &str) -> bool {
        self.novel_dir(novel).is_dir()
    }

    pub fn chapter_exists(&self, novel: &str, folder: &str) -> bool {
        self.chapter_dir(novel, folder).is_dir()
    }

    pub fn list_novels(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.base) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    /// Chapter folders of `novel`, ordered by chapter number.
    pub fn list_chapters(&self, novel: &str) -> Vec<ChapterEntry> {
        let dir = self.novel_dir(novel);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut chapters: Vec<ChapterEntry> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let folder = entry.file_name().to_string_lossy().to_string();
                let (number, title) = parse_chapter_folder(&folder)?;
                Some(ChapterEntry {
                    number,
                    title,
                    scenes: naming::scene_numbers(&entry.path()),
                    folder,
                })
            })
            .collect();
        chapters.sort_by(|a, b| a.number.cmp(&b.number).then(a.folder.cmp(&b.folder)));
        chapters
    }

    pub fn list_tree(&self) -> Vec<NovelEntry> {
        self.list_novels()
            .into_iter()
            .map(|name| NovelEntry {
                chapters: self.list_chapters(&name),
                name,
            })
            .collect()
    }

    /// Creates the directory for a new novel and returns its sanitized name.
    pub fn create_novel(&self, name: &str) -> Result<String, StorageError> {
        let safe = sanitize(name);
        let dir = self.novel_dir(&safe);
        if dir.exists() {
            return Err(StorageError::AlreadyExists(safe));
        }
        fs::create_dir_all(&dir).map_err(|source| StorageError::io(&dir, source))?;
        settings::save_novel_settings(
            &dir.join(NOVEL_SETTINGS_FILE_NAME),
            &NovelSettings::default(),
        )?;
        log::info!("created novel `{safe}`");
        Ok(safe)
    }

    /// Allocates the next chapter number and returns the new folder name.
    pub fn create_chapter(&self, novel: &str, title: &str) -> Result<String, StorageError> {
        let novel_dir = self.novel_dir(novel);
        if !novel_dir.is_dir() {
            return Err(StorageError::NotFound(novel.to_string()));
        }
        let number = next_chapter_number(&novel_dir);
        let folder = chapter_folder_name(number, title);
        let dir = novel_dir.join(&folder);
        fs::create_dir_all(&dir).map_err(|source| StorageError::io(&dir, source))?;
        settings::save_chapter_settings(
            &dir.join(CHAPTER_SETTINGS_FILE_NAME),
            &ChapterSettings::default(),
        )?;
        log::info!("created chapter `{folder}` in `{novel}`");
        Ok(folder)
    }

    pub fn load_novel_settings(&self, novel: &str) -> NovelSettings {
        settings::load_novel_settings(&self.novel_dir(novel).join(NOVEL_SETTINGS_FILE_NAME))
    }

    pub fn save_novel_settings(
        &self,
        novel: &str,
        value: &NovelSettings,
    ) -> Result<(), StorageError> {
        settings::save_novel_settings(&self.novel_dir(novel).join(NOVEL_SETTINGS_FILE_NAME), value)
    }

    pub fn load_chapter_settings(&self, novel: &str, folder: &str) -> ChapterSettings {
        settings::load_chapter_settings(
            &self
                .chapter_dir(novel, folder)
                .join(CHAPTER_SETTINGS_FILE_NAME),
        )
    }

    pub fn save_chapter_settings(
        &self,
        novel: &str,
        folder: &str,
        value: &ChapterSettings,
    ) -> Result<(), StorageError> {
        settings::save_chapter_settings(
            &self
                .chapter_dir(novel, folder)
                .join(CHAPTER_SETTINGS_FILE_NAME),
            value,
        )
    }

    pub fn load_scene_settings(&self, novel: &str, folder: &str, scene: u32) -> SceneSettings {
        settings::load_scene_settings(&self.scene_settings_path(novel, folder, scene))
    }

    pub fn save_scene_settings(
        &self,
        novel: &str,
        folder: &str,
        scene: u32,
        value: &SceneSettings,
    ) -> Result<(), StorageError> {
        settings::save_scene_settings(&self.scene_settings_path(novel, folder, scene), value)
    }

    /// Absent files read as empty; invalid UTF-8 is replaced rather than rejected.
    pub fn load_scene_content(&self, novel: &str, folder: &str, scene: u32) -> String {
        read_text_lossy(&self.scene_path(novel, folder, scene)).unwrap_or_default()
    }

    pub fn save_scene_content(
        &self,
        novel: &str,
        folder: &str,
        scene: u32,
        content: &str,
    ) -> Result<(), StorageError> {
        write_text(&self.scene_path(novel, folder, scene), content)
    }

    pub fn load_summary(&self, novel: &str) -> String {
        read_text_lossy(&self.summary_path(novel)).unwrap_or_default()
    }

    pub fn save_summary(&self, novel: &str, summary: &str) -> Result<(), StorageError> {
        write_text(&self.summary_path(novel), summary)
    }

    pub fn next_chapter_number(&self, novel: &str) -> u32 {
        next_chapter_number(&self.novel_dir(novel))
    }

    pub fn next_scene_number(&self, novel: &str, folder: &str) -> u32 {
        next_scene_number(&self.chapter_dir(novel, folder))
    }

    pub fn previous_scenes_text(&self, novel: &str, folder: &str, before: u32) -> String {
        previous_scenes_text(&self.chapter_dir(novel, folder), before)
    }

    pub fn all_novel_content(&self, novel: &str) -> String {
        all_novel_content(&self.novel_dir(novel))
    }

    /// Replaces the title suffix of a chapter folder, keeping its number.
    /// Returns the new folder name.
    pub fn rename_chapter(
        &self,
        novel: &str,
        folder: &str,
        new_title: &str,
    ) -> Result<String, StorageError> {
        let (number, _) = parse_chapter_folder(folder)
            .ok_or_else(|| StorageError::NotAChapter(folder.to_string()))?;
        let from = self.chapter_dir(novel, folder);
        if !from.is_dir() {
            return Err(StorageError::NotFound(folder.to_string()));
        }
        let renamed = chapter_folder_name(number, new_title);
        if renamed == folder {
            return Ok(renamed);
        }
        let to = self.chapter_dir(novel, &renamed);
        if to.exists() {
            return Err(StorageError::AlreadyExists(renamed));
        }
        fs::rename(&from, &to).map_err(|source| StorageError::io(&from, source))?;
        log::info!("renamed chapter `{folder}` to `{renamed}` in `{novel}`");
        Ok(renamed)
    }

    /// Returns the sanitized new novel name.
    pub fn rename_novel(&self, novel: &str, new_name: &str) -> Result<String, StorageError> {
        let from = self.novel_dir(novel);
        if !from.is_dir() {
            return Err(StorageError::NotFound(novel.to_string()));
        }
        let renamed = sanitize(new_name);
        if renamed == novel {
            return Ok(renamed);
        }
        let to = self.novel_dir(&renamed);
        if to.exists() {
            return Err(StorageError::AlreadyExists(renamed));
        }
        fs::rename(&from, &to).map_err(|source| StorageError::io(&from, source))?;
        log::info!("renamed novel `{novel}` to `{renamed}`");
        Ok(renamed)
    }

    pub fn delete_chapter(&self, novel: &str, folder: &str) -> Result<(), StorageError> {
        remove_tree(&self.chapter_dir(novel, folder), folder)?;
        log::info!("deleted chapter `{folder}` from `{novel}`");
        Ok(())
    }

    pub fn delete_novel(&self, novel: &str) -> Result<(), StorageError> {
        remove_tree(&self.novel_dir(novel), novel)?;
        log::info!("deleted novel `{novel}`");
        Ok(())
    }

    /// Removes the content and settings files of one scene. Either file may
    /// already be missing.
    pub fn delete_scene(&self, novel: &str, folder: &str, scene: u32) -> Result<(), StorageError> {
        for path in [
            self.scene_path(novel, folder, scene),
            self.scene_settings_path(novel, folder, scene),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::io(&path, source)),
            }
        }
        log::info!("deleted scene {scene} from `{novel}/{folder}`");
        Ok(())
    }
}

fn remove_tree(path: &Path, label: &str) -> Result<(), StorageError> {
    if !path.is_dir() {
        return Err(StorageError::NotFound(label.to_string()));
    }
    fs::remove_dir_all(path).map_err(|source| StorageError::io(path, source))
}

pub(crate) fn read_text_lossy(path: &Path) -> io::Result<String> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err),
    }
}

fn write_text(path: &Path, content: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::io(parent, source))?;
    }
    fs::write(path, content).map_err(|source| StorageError::io(path, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_hierarchy_with_allocated_numbers() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());

        let novel = store.create_novel("Foo").unwrap();
        assert_eq!(novel, "Foo");
        assert!(store.novel_dir("Foo").join(NOVEL_SETTINGS_FILE_NAME).exists());
        assert!(matches!(
            store.create_novel("Foo"),
            Err(StorageError::AlreadyExists(_))
        ));

        assert_eq!(store.create_chapter("Foo", "").unwrap(), "Chapter_001");
        assert_eq!(
            store.create_chapter("Foo", "Night Raid").unwrap(),
            "Chapter_002_Night_Raid"
        );
        assert!(matches!(
            store.create_chapter("Missing", ""),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn lists_tree_in_numeric_order() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());
        store.create_novel("B").unwrap();
        store.create_novel("A").unwrap();
        for _ in 0..10 {
            store.create_chapter("A", "").unwrap();
        }
        store.save_scene_content("A", "Chapter_002", 3, "x").unwrap();
        store.save_scene_content("A", "Chapter_002", 1, "y").unwrap();

        let tree = store.list_tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "A");
        let numbers: Vec<u32> = tree[0].chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
        assert_eq!(tree[0].chapters[1].scenes, vec![1, 3]);
    }

    #[test]
    fn scene_content_reads_lossy_and_missing_as_empty() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());
        assert_eq!(store.load_scene_content("N", "Chapter_001", 1), "");

        let path = store.scene_path("N", "Chapter_001", 1);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [b'o', b'k', 0xff, b'!']).unwrap();
        assert_eq!(store.load_scene_content("N", "Chapter_001", 1), "ok\u{fffd}!");
    }

    #[test]
    fn rename_chapter_keeps_number_and_rejects_collisions() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());
        store.create_novel("Foo").unwrap();
        store.create_chapter("Foo", "Old").unwrap();
        store.create_chapter("Foo", "").unwrap();
        store
            .save_scene_content("Foo", "Chapter_001_Old", 1, "scene")
            .unwrap();

        let renamed = store
            .rename_chapter("Foo", "Chapter_001_Old", "New Dawn")
            .unwrap();
        assert_eq!(renamed, "Chapter_001_New_Dawn");
        assert_eq!(store.load_scene_content("Foo", &renamed, 1), "scene");
        assert!(!store.chapter_exists("Foo", "Chapter_001_Old"));

        fs::create_dir(store.chapter_dir("Foo", "Chapter_002_Taken")).unwrap();
        assert!(matches!(
            store.rename_chapter("Foo", "Chapter_002", "Taken"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.rename_chapter("Foo", "Extras", "x"),
            Err(StorageError::NotAChapter(_))
        ));
    }

    #[test]
    fn rename_novel_rejects_collision() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());
        store.create_novel("Foo").unwrap();
        store.create_novel("Bar").unwrap();
        assert!(matches!(
            store.rename_novel("Foo", "Bar"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(store.rename_novel("Foo", "Baz Qux").unwrap(), "Baz_Qux");
        assert!(store.novel_exists("Baz_Qux"));
        assert!(!store.novel_exists("Foo"));
    }

    #[test]
    fn delete_scene_tolerates_missing_files() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());
        store.create_novel("Foo").unwrap();
        let folder = store.create_chapter("Foo", "").unwrap();
        store.save_scene_content("Foo", &folder, 1, "text").unwrap();

        store.delete_scene("Foo", &folder, 1).unwrap();
        assert!(!store.scene_path("Foo", &folder, 1).exists());
        store.delete_scene("Foo", &folder, 1).unwrap();
    }

    #[test]
    fn delete_tree_reports_missing() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path());
        store.create_novel("Foo").unwrap();
        let folder = store.create_chapter("Foo", "").unwrap();
        store.delete_chapter("Foo", &folder).unwrap();
        assert!(!store.chapter_exists("Foo", &folder));
        assert!(matches!(
            store.delete_chapter("Foo", &folder),
            Err(StorageError::NotFound(_))
        ));
        store.delete_novel("Foo").unwrap();
        assert!(store.list_novels().is_empty());
    }
}
