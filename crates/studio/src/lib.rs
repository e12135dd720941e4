//! Generation orchestrator for the web-novel studio.
//!
//! [`Studio`] owns the loaded novel/chapter/scene, the edit buffers and the
//! single background task slot. A front end implements [`Presenter`] and
//! calls [`Studio::tick`] from its event loop.

pub mod debounce;
pub mod error;
pub mod presenter;
pub mod state;
pub mod studio;
pub mod tasks;

pub use debounce::Debouncer;
pub use error::StudioError;
pub use presenter::{
    ActionState, CaptureRequest, ExportError, ImageExporter, Presenter, UnsavedChoice,
};
pub use state::{
    BusyState, EditorBuffers, ModifiedFlags, SceneOptions, Selection, StudioState, TreeItem,
};
pub use studio::{Studio, DEFAULT_AUTOSAVE_DELAY, STATUS_CLEAR_AFTER};
pub use tasks::{SceneTarget, SummaryError, TaskController, TaskEvent, TaskKind};
