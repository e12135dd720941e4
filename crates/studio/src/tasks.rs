use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use novel_core::logging::{LogRecord, LogSink};
use novel_core::{
    build_summary_prompt, GenerationFailure, GenerationRequest, GenerationResult,
    GenerationSnapshot, NovelStore, StorageError, TextProvider, TokenUsage,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::presenter::{CaptureRequest, ExportError, ImageExporter};

pub type EventSender = UnboundedSender<TaskEvent>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    Generate,
    Summarize,
    Capture,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Generate => "Generating scene",
            TaskKind::Summarize => "Updating novel summary",
            TaskKind::Capture => "Exporting image",
        }
    }
}

/// Where a generated scene will be written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SceneTarget {
    pub novel: String,
    pub folder: String,
    pub scene: u32,
}

#[derive(Clone)]
pub struct GenerateJob {
    pub provider: Arc<dyn TextProvider>,
    pub request: GenerationRequest,
    pub snapshot: GenerationSnapshot,
    pub target: SceneTarget,
    /// The scene number was freshly allocated for this job.
    pub is_new: bool,
}

#[derive(Clone)]
pub struct SummarizeJob {
    pub provider: Arc<dyn TextProvider>,
    pub model: String,
    pub system_prompt: String,
    pub store: NovelStore,
    pub novel: String,
}

#[derive(Clone)]
pub struct CaptureJob {
    pub exporter: Arc<dyn ImageExporter>,
    pub request: CaptureRequest,
}

#[derive(Clone)]
pub enum TaskCommand {
    Generate(GenerateJob),
    Summarize(SummarizeJob),
    Capture(CaptureJob),
}

impl TaskCommand {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskCommand::Generate(_) => TaskKind::Generate,
            TaskCommand::Summarize(_) => TaskKind::Summarize,
            TaskCommand::Capture(_) => TaskKind::Capture,
        }
    }
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("the novel has no content to summarize")]
    NothingToSummarize,
    #[error(transparent)]
    Generation(#[from] GenerationFailure),
    #[error("failed to write the summary: {0}")]
    Storage(#[from] StorageError),
    #[error("background task crashed: {0}")]
    Join(String),
}

pub enum TaskEvent {
    Log(LogRecord),
    GenerationFinished {
        job: GenerateJob,
        result: GenerationResult,
    },
    SummaryFinished {
        novel: String,
        result: Result<TokenUsage, SummaryError>,
    },
    CaptureFinished {
        destination: PathBuf,
        result: Result<(), ExportError>,
    },
}

impl TaskEvent {
    pub fn kind(&self) -> Option<TaskKind> {
        match self {
            TaskEvent::Log(_) => None,
            TaskEvent::GenerationFinished { .. } => Some(TaskKind::Generate),
            TaskEvent::SummaryFinished { .. } => Some(TaskKind::Summarize),
            TaskEvent::CaptureFinished { .. } => Some(TaskKind::Capture),
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskSendError {
    #[error("the background task channel is closed")]
    ChannelClosed,
}

/// Runs commands on a dedicated runtime thread, one blocking worker per
/// command. Results come back through [`TaskController::try_recv`], which
/// the owner polls from its own thread.
pub struct TaskController {
    sender: UnboundedSender<TaskCommand>,
    receiver: UnboundedReceiver<TaskEvent>,
    _worker: thread::JoinHandle<()>,
}

impl TaskController {
    pub fn new() -> Self {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<TaskCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handle = thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("failed to start the background task runtime: {err}");
                    return;
                }
            };

            runtime.block_on(async move {
                while let Some(command) = command_rx.recv().await {
                    tokio::spawn(run_command(command, event_tx.clone()));
                }
            });
        });

        Self {
            sender: command_tx,
            receiver: event_rx,
            _worker: handle,
        }
    }

    pub fn send(&self, command: TaskCommand) -> Result<(), TaskSendError> {
        self.sender
            .send(command)
            .map_err(|_| TaskSendError::ChannelClosed)
    }

    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}

struct ChannelLogSink {
    sender: EventSender,
}

impl LogSink for ChannelLogSink {
    fn log(&self, record: LogRecord) {
        let _ = self.sender.send(TaskEvent::Log(record));
    }
}

async fn run_command(command: TaskCommand, sender: EventSender) {
    let event = match command {
        TaskCommand::Generate(job) => {
            let worker_job = job.clone();
            let result = tokio::task::spawn_blocking(move || {
                worker_job.provider.generate(&worker_job.request)
            })
            .await
            .unwrap_or_else(|err| {
                GenerationResult::failure(GenerationFailure::Other {
                    provider: job.snapshot.provider,
                    detail: format!("background task crashed: {err}"),
                })
            });
            TaskEvent::GenerationFinished { job, result }
        }
        TaskCommand::Summarize(job) => {
            let novel = job.novel.clone();
            let sink = ChannelLogSink {
                sender: sender.clone(),
            };
            let result = tokio::task::spawn_blocking(move || summarize(job, &sink))
                .await
                .unwrap_or_else(|err| Err(SummaryError::Join(err.to_string())));
            TaskEvent::SummaryFinished { novel, result }
        }
        TaskCommand::Capture(job) => {
            let destination = job.request.destination.clone();
            let result =
                tokio::task::spawn_blocking(move || job.exporter.export(&job.request))
                    .await
                    .unwrap_or_else(|err| Err(ExportError(format!("background task crashed: {err}"))));
            TaskEvent::CaptureFinished {
                destination,
                result,
            }
        }
    };
    let _ = sender.send(event);
}

fn summarize(job: SummarizeJob, sink: &dyn LogSink) -> Result<TokenUsage, SummaryError> {
    let content = job.store.all_novel_content(&job.novel);
    if content.trim().is_empty() {
        return Err(SummaryError::NothingToSummarize);
    }
    sink.log(LogRecord::info(format!(
        "Summarizing `{}` with {} ({} chars)",
        job.novel,
        job.model,
        content.chars().count()
    )));

    let request = GenerationRequest {
        model: job.model,
        prompt: build_summary_prompt(&content),
        system_prompt: job.system_prompt,
        temperature: None,
    };
    let result = job.provider.generate(&request);
    let summary = result.outcome?;
    job.store.save_summary(&job.novel, &summary)?;
    sink.log(LogRecord::info(format!(
        "Summary written to {}",
        job.store.summary_path(&job.novel).display()
    )));
    Ok(result.usage)
}
