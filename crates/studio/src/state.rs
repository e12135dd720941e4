use novel_core::{LengthOption, DEFAULT_TEMPERATURE};

use crate::tasks::TaskKind;

/// At most one background task runs at a time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BusyState {
    #[default]
    Idle,
    Generating,
    Summarizing,
    Capturing,
}

impl BusyState {
    pub fn label(&self) -> &'static str {
        match self {
            BusyState::Idle => "idle",
            BusyState::Generating => "generating",
            BusyState::Summarizing => "summarizing",
            BusyState::Capturing => "exporting image",
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == BusyState::Idle
    }
}

impl From<TaskKind> for BusyState {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Generate => BusyState::Generating,
            TaskKind::Summarize => BusyState::Summarizing,
            TaskKind::Capture => BusyState::Capturing,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TreeItem {
    Novel(String),
    Chapter {
        novel: String,
        folder: String,
    },
    Scene {
        novel: String,
        folder: String,
        scene: u32,
    },
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selection {
    pub novel: Option<String>,
    pub chapter: Option<String>,
    pub scene: Option<u32>,
}

impl Selection {
    pub fn matches(&self, item: &TreeItem) -> bool {
        match item {
            TreeItem::Novel(novel) => {
                self.novel.as_ref() == Some(novel) && self.chapter.is_none()
            }
            TreeItem::Chapter { novel, folder } => {
                self.novel.as_ref() == Some(novel)
                    && self.chapter.as_ref() == Some(folder)
                    && self.scene.is_none()
            }
            TreeItem::Scene {
                novel,
                folder,
                scene,
            } => {
                self.novel.as_ref() == Some(novel)
                    && self.chapter.as_ref() == Some(folder)
                    && self.scene == Some(*scene)
            }
        }
    }

    pub fn is_chapter(&self, novel: &str, folder: &str) -> bool {
        self.novel.as_deref() == Some(novel) && self.chapter.as_deref() == Some(folder)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneOptions {
    pub temperature: f32,
    pub length: LengthOption,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            length: LengthOption::default(),
        }
    }
}

/// Current values of the editable fields, which may be ahead of disk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditorBuffers {
    pub novel_settings: String,
    pub chapter_notes: String,
    pub scene_plot: String,
    pub scene_content: String,
    pub options: SceneOptions,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ModifiedFlags {
    pub scene_content: bool,
    pub novel_settings: bool,
    pub chapter_notes: bool,
    pub scene_options: bool,
}

impl ModifiedFlags {
    pub fn any(&self) -> bool {
        self.scene_content || self.novel_settings || self.chapter_notes || self.scene_options
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug, Default)]
pub struct StudioState {
    pub selection: Selection,
    pub buffers: EditorBuffers,
    pub modified: ModifiedFlags,
    /// Model recorded in the loaded scene's settings, preferred on re-validation.
    pub stored_model: Option<String>,
}

impl StudioState {
    pub fn clear_scene(&mut self) {
        self.selection.scene = None;
        self.buffers.scene_content.clear();
        self.modified.scene_content = false;
        self.modified.scene_options = false;
        self.stored_model = None;
    }

    pub fn clear_chapter(&mut self) {
        self.clear_scene();
        self.selection.chapter = None;
        self.buffers.chapter_notes.clear();
        self.modified.chapter_notes = false;
    }

    pub fn clear_novel(&mut self) {
        self.clear_chapter();
        self.selection.novel = None;
        self.buffers.novel_settings.clear();
        self.modified.novel_settings = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_matches_exact_item_only() {
        let selection = Selection {
            novel: Some("Foo".into()),
            chapter: Some("Chapter_001".into()),
            scene: Some(2),
        };
        assert!(selection.matches(&TreeItem::Scene {
            novel: "Foo".into(),
            folder: "Chapter_001".into(),
            scene: 2
        }));
        assert!(!selection.matches(&TreeItem::Chapter {
            novel: "Foo".into(),
            folder: "Chapter_001".into()
        }));
        assert!(!selection.matches(&TreeItem::Novel("Foo".into())));
    }

    #[test]
    fn clearing_a_level_clears_everything_below() {
        let mut state = StudioState::default();
        state.selection = Selection {
            novel: Some("Foo".into()),
            chapter: Some("Chapter_001".into()),
            scene: Some(1),
        };
        state.buffers.scene_content = "text".into();
        state.modified.scene_content = true;
        state.modified.novel_settings = true;

        state.clear_chapter();
        assert_eq!(state.selection.novel.as_deref(), Some("Foo"));
        assert_eq!(state.selection.chapter, None);
        assert_eq!(state.selection.scene, None);
        assert!(state.buffers.scene_content.is_empty());
        assert!(state.modified.novel_settings);
        assert!(!state.modified.scene_content);
    }
}
