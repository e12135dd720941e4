use novel_core::{ConfigError, ProviderId, StorageError};
use thiserror::Error;

use crate::state::BusyState;
use crate::tasks::TaskSendError;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("another task is still running ({})", .0.label())]
    Busy(BusyState),
    #[error("no novel is loaded")]
    NoNovel,
    #[error("no chapter is loaded")]
    NoChapter,
    #[error("no scene is loaded")]
    NoScene,
    #[error("no model is selected")]
    NoModel,
    #[error("no summary model is configured for {0}")]
    NoSummaryModel(ProviderId),
    #[error("{} is not configured", .0.label())]
    ProviderUnavailable(ProviderId),
    #[error("model `{0}` is not available for the active provider")]
    UnknownModel(String),
    #[error("the action was cancelled")]
    Cancelled,
    #[error("failed to save pending changes: {0}")]
    SaveFailed(String),
    #[error("no image exporter is available")]
    NoExporter,
    #[error("there is no text to export")]
    NothingToExport,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Task(#[from] TaskSendError),
}
