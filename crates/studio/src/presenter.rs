//! Callbacks into the presentation layer.

use std::path::PathBuf;

use novel_core::{NovelEntry, TokenUsage};
use thiserror::Error;

use crate::state::EditorBuffers;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnsavedChoice {
    Save,
    Discard,
    Cancel,
}

/// Which actions the presentation layer should currently enable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ActionState {
    pub busy: bool,
    pub can_create_chapter: bool,
    pub can_generate: bool,
    pub can_regenerate: bool,
    pub can_save: bool,
    pub can_export: bool,
    /// False while a generation will overwrite the scene fields.
    pub can_edit_scene: bool,
}

pub trait Presenter {
    fn refresh_tree(&mut self, tree: &[NovelEntry]);
    fn show_fields(&mut self, buffers: &EditorBuffers);
    fn show_generation(&mut self, text: &str, usage: TokenUsage);
    /// Critical messages stay until replaced; the others may be auto-cleared.
    fn set_status(&mut self, text: &str, critical: bool);
    fn set_actions(&mut self, actions: ActionState);
    fn confirm_unsaved(&mut self) -> UnsavedChoice;
    fn confirm(&mut self, message: &str) -> bool;
    fn show_error(&mut self, title: &str, message: &str);
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub text: String,
    pub destination: PathBuf,
    pub background: String,
    pub foreground: String,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExportError(pub String);

/// Renders text to an image file. Runs on a worker thread.
pub trait ImageExporter: Send + Sync {
    fn export(&self, request: &CaptureRequest) -> Result<(), ExportError>;
}
