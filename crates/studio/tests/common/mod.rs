#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use novel_core::{
    ConfigStore, GenerationFailure, GenerationRequest, GenerationResult, NovelEntry, NovelStore,
    ProviderId, ProviderRegistry, TextProvider, TokenUsage, CONFIG_FILE_NAME,
};
use novel_studio::{
    ActionState, CaptureRequest, EditorBuffers, ExportError, ImageExporter, Presenter, Studio,
    UnsavedChoice,
};
use tempfile::{tempdir, TempDir};

/// Replays queued results and records every request it receives.
pub struct MockProvider {
    id: ProviderId,
    models: Vec<String>,
    delay: Duration,
    responses: Mutex<VecDeque<GenerationResult>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    pub fn new(id: ProviderId, models: &[&str]) -> Self {
        Self {
            id,
            models: models.iter().map(|name| name.to_string()).collect(),
            delay: Duration::ZERO,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, result: GenerationResult) {
        self.responses.lock().expect("mock mutex poisoned").push_back(result);
    }

    pub fn push_text(&self, text: &str, input: u64, output: u64) {
        self.push(GenerationResult::success(text, TokenUsage::new(input, output)));
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("mock mutex poisoned").clone()
    }
}

impl TextProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.requests
            .lock()
            .expect("mock mutex poisoned")
            .push(request.clone());
        self.responses
            .lock()
            .expect("mock mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                GenerationResult::failure(GenerationFailure::Other {
                    provider: self.id,
                    detail: "no queued response".into(),
                })
            })
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub trees: Vec<Vec<NovelEntry>>,
    pub fields: Vec<EditorBuffers>,
    pub generations: Vec<(String, TokenUsage)>,
    pub statuses: Vec<(String, bool)>,
    pub actions: Vec<ActionState>,
    pub errors: Vec<(String, String)>,
    pub unsaved_choices: VecDeque<UnsavedChoice>,
    pub unsaved_prompts: usize,
    pub refuse_confirm: bool,
}

impl RecordingPresenter {
    pub fn last_status(&self) -> Option<&(String, bool)> {
        self.statuses.last()
    }

    pub fn has_critical(&self, needle: &str) -> bool {
        self.statuses
            .iter()
            .any(|(text, critical)| *critical && text.contains(needle))
    }
}

impl Presenter for RecordingPresenter {
    fn refresh_tree(&mut self, tree: &[NovelEntry]) {
        self.trees.push(tree.to_vec());
    }

    fn show_fields(&mut self, buffers: &EditorBuffers) {
        self.fields.push(buffers.clone());
    }

    fn show_generation(&mut self, text: &str, usage: TokenUsage) {
        self.generations.push((text.to_string(), usage));
    }

    fn set_status(&mut self, text: &str, critical: bool) {
        self.statuses.push((text.to_string(), critical));
    }

    fn set_actions(&mut self, actions: ActionState) {
        self.actions.push(actions);
    }

    fn confirm_unsaved(&mut self) -> UnsavedChoice {
        self.unsaved_prompts += 1;
        self.unsaved_choices
            .pop_front()
            .unwrap_or(UnsavedChoice::Cancel)
    }

    fn confirm(&mut self, _message: &str) -> bool {
        !self.refuse_confirm
    }

    fn show_error(&mut self, title: &str, message: &str) {
        self.errors.push((title.to_string(), message.to_string()));
    }
}

#[derive(Default)]
pub struct MockExporter {
    pub requests: Mutex<Vec<CaptureRequest>>,
}

impl ImageExporter for MockExporter {
    fn export(&self, request: &CaptureRequest) -> Result<(), ExportError> {
        self.requests
            .lock()
            .expect("mock mutex poisoned")
            .push(request.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub store: NovelStore,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let store = NovelStore::new(dir.path().join("novels"));
        store.ensure_base().expect("create base dir");
        Self { dir, store }
    }

    pub fn config(&self) -> ConfigStore {
        ConfigStore::open(self.dir.path().join(CONFIG_FILE_NAME)).expect("open config")
    }

    pub fn studio(&self, providers: &[Arc<MockProvider>]) -> Studio<RecordingPresenter> {
        self.studio_with_config(providers, self.config())
    }

    pub fn studio_with_config(
        &self,
        providers: &[Arc<MockProvider>],
        config: ConfigStore,
    ) -> Studio<RecordingPresenter> {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.insert(provider.clone() as Arc<dyn TextProvider>);
        }
        Studio::new(
            self.store.clone(),
            config,
            registry,
            RecordingPresenter::default(),
        )
    }
}

pub fn gemini() -> Arc<MockProvider> {
    Arc::new(MockProvider::new(
        ProviderId::Gemini,
        &["gemini-1.5-flash", "gemini-1.5-pro-latest"],
    ))
}

/// Ticks until no background task is running.
pub fn run_until_idle(studio: &mut Studio<RecordingPresenter>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        studio.tick(Instant::now());
        if studio.busy().is_idle() {
            return;
        }
        assert!(Instant::now() < deadline, "background task did not finish");
        thread::sleep(Duration::from_millis(10));
    }
}
