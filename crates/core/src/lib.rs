pub mod config;
pub mod logging;
pub mod model;
pub mod prompts;
pub mod provider;
pub mod secrets;
pub mod storage;

pub use config::{ConfigError, ConfigStore, GlobalConfig, CONFIG_FILE_NAME};
pub use logging::{
    FacadeLogSink, LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink, StdoutLogSink,
    VecLogSink,
};
pub use model::{
    ChapterSettings, GenerationSnapshot, LengthOption, NovelSettings, ProviderId, SceneSettings,
    TokenUsage, UnknownProvider, DEFAULT_TEMPERATURE, MAX_TEMPERATURE,
};
pub use prompts::{build_prompt, build_summary_prompt, PromptInputs};
pub use provider::{
    resolve_model, truncation_notice, GenerationFailure, GenerationRequest, GenerationResult,
    ProviderRegistry, TextProvider,
};
pub use secrets::{SecretsError, SecretsFile, SECRETS_FILE_NAME};
pub use storage::{ChapterEntry, NovelEntry, NovelStore, StorageError};
