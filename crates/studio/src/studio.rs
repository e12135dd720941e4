use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use novel_core::logging::{FacadeLogSink, LogLevel, LogRecord, SharedLogSink};
use novel_core::{
    build_prompt, resolve_model, ChapterSettings, ConfigStore, GenerationRequest,
    GenerationResult, GenerationSnapshot, NovelSettings, NovelStore, PromptInputs, ProviderId,
    ProviderRegistry, SceneSettings, StorageError, MAX_TEMPERATURE,
};

use crate::debounce::Debouncer;
use crate::error::StudioError;
use crate::presenter::{ActionState, CaptureRequest, ImageExporter, Presenter, UnsavedChoice};
use crate::state::{BusyState, EditorBuffers, ModifiedFlags, SceneOptions, Selection, StudioState, TreeItem};
use crate::tasks::{
    CaptureJob, GenerateJob, SceneTarget, SummaryError, SummarizeJob, TaskCommand,
    TaskController, TaskEvent, TaskKind,
};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(2);
pub const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(8);

struct RunningTask {
    kind: TaskKind,
    started: Instant,
    elapsed_shown: u64,
}

struct StatusLine {
    critical: bool,
    shown_at: Instant,
}

/// The application core: owns what is loaded, what is running, and the
/// unsaved edits. Every method runs on the caller's (interactive) thread;
/// provider calls and summaries run on workers and come back through
/// [`Studio::tick`].
pub struct Studio<P: Presenter> {
    store: NovelStore,
    config: ConfigStore,
    registry: ProviderRegistry,
    presenter: P,
    sink: SharedLogSink,
    tasks: TaskController,
    exporter: Option<Arc<dyn ImageExporter>>,
    state: StudioState,
    provider: Option<ProviderId>,
    model: Option<String>,
    running: Option<RunningTask>,
    autosave: Debouncer,
    status: Option<StatusLine>,
}

impl<P: Presenter> Studio<P> {
    pub fn new(
        store: NovelStore,
        config: ConfigStore,
        registry: ProviderRegistry,
        presenter: P,
    ) -> Self {
        let provider = initial_provider(&registry, config.config().last_provider);
        let model = provider.and_then(|id| {
            resolve_model(
                id,
                registry.models(id),
                config.config().last_model.as_deref(),
                None,
            )
        });

        let mut studio = Self {
            store,
            config,
            registry,
            presenter,
            sink: Arc::new(FacadeLogSink),
            tasks: TaskController::new(),
            exporter: None,
            state: StudioState::default(),
            provider,
            model,
            running: None,
            autosave: Debouncer::new(DEFAULT_AUTOSAVE_DELAY),
            status: None,
        };
        studio.refresh_tree();
        studio.update_actions();
        if studio.registry.is_empty() {
            studio.notify("No text-generation provider is configured", true);
        }
        studio
    }

    pub fn with_log_sink(mut self, sink: SharedLogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ImageExporter>) -> Self {
        self.exporter = Some(exporter);
        self.update_actions();
        self
    }

    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave = Debouncer::new(delay);
        self
    }

    pub fn busy(&self) -> BusyState {
        self.running
            .as_ref()
            .map(|task| BusyState::from(task.kind))
            .unwrap_or_default()
    }

    pub fn selection(&self) -> &Selection {
        &self.state.selection
    }

    pub fn buffers(&self) -> &EditorBuffers {
        &self.state.buffers
    }

    pub fn modified(&self) -> ModifiedFlags {
        self.state.modified
    }

    pub fn provider(&self) -> Option<ProviderId> {
        self.provider
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn available_providers(&self) -> Vec<ProviderId> {
        self.registry.ids()
    }

    pub fn models(&self, provider: ProviderId) -> &[String] {
        self.registry.models(provider)
    }

    pub fn store(&self) -> &NovelStore {
        &self.store
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Drains finished background work, fires a due auto-save, and keeps the
    /// status line current. Call it regularly from the interactive thread.
    pub fn tick(&mut self, now: Instant) {
        while let Some(event) = self.tasks.try_recv() {
            self.handle_event(event);
        }
        if self.autosave.fire_if_due(now) {
            self.autosave_now();
        }
        self.refresh_elapsed(now);
        self.expire_status(now);
    }

    // Structure

    pub fn create_novel(&mut self, name: &str) -> Result<String, StudioError> {
        self.ensure_idle()?;
        self.resolve_unsaved()?;
        let novel = self.store.create_novel(name)?;
        self.state.clear_novel();
        self.state.selection.novel = Some(novel.clone());
        self.load_selection();
        self.after_structure_change(&format!("Created novel `{novel}`"));
        Ok(novel)
    }

    pub fn create_chapter(&mut self, title: &str) -> Result<String, StudioError> {
        self.ensure_idle()?;
        let novel = self.state.selection.novel.clone().ok_or(StudioError::NoNovel)?;
        self.resolve_unsaved()?;
        let folder = self.store.create_chapter(&novel, title)?;
        self.state.clear_chapter();
        self.state.selection.chapter = Some(folder.clone());
        self.load_selection();
        self.after_structure_change(&format!("Created `{folder}` in `{novel}`"));
        Ok(folder)
    }

    pub fn load_item(&mut self, item: TreeItem) -> Result<(), StudioError> {
        if self.state.selection.matches(&item) {
            return Ok(());
        }
        self.resolve_unsaved()?;

        let selection = match item {
            TreeItem::Novel(novel) => {
                self.require_novel(&novel)?;
                Selection {
                    novel: Some(novel),
                    ..Selection::default()
                }
            }
            TreeItem::Chapter { novel, folder } => {
                self.require_chapter(&novel, &folder)?;
                Selection {
                    novel: Some(novel),
                    chapter: Some(folder),
                    scene: None,
                }
            }
            TreeItem::Scene {
                novel,
                folder,
                scene,
            } => {
                self.require_chapter(&novel, &folder)?;
                Selection {
                    novel: Some(novel),
                    chapter: Some(folder),
                    scene: Some(scene),
                }
            }
        };

        self.state = StudioState {
            selection,
            ..StudioState::default()
        };
        self.autosave.cancel();
        if let Some(settings) = self.load_selection() {
            self.adopt_scene_provider(settings.provider);
        }
        self.update_actions();
        let label = describe_selection(&self.state.selection);
        self.notify(&format!("Loaded {label}"), false);
        Ok(())
    }

    pub fn rename_novel(&mut self, novel: &str, new_name: &str) -> Result<String, StudioError> {
        self.ensure_idle()?;
        let renamed = self.store.rename_novel(novel, new_name)?;
        if self.state.selection.novel.as_deref() == Some(novel) {
            self.state.selection.novel = Some(renamed.clone());
        }
        self.after_structure_change(&format!("Renamed novel `{novel}` to `{renamed}`"));
        Ok(renamed)
    }

    pub fn rename_chapter(
        &mut self,
        novel: &str,
        folder: &str,
        new_title: &str,
    ) -> Result<String, StudioError> {
        self.ensure_idle()?;
        let renamed = self.store.rename_chapter(novel, folder, new_title)?;
        if self.state.selection.is_chapter(novel, folder) {
            self.state.selection.chapter = Some(renamed.clone());
        }
        self.after_structure_change(&format!("Renamed `{folder}` to `{renamed}`"));
        Ok(renamed)
    }

    pub fn delete_novel(&mut self, novel: &str) -> Result<(), StudioError> {
        self.ensure_idle()?;
        self.confirm(&format!("Delete novel `{novel}` and everything in it?"))?;
        self.store.delete_novel(novel)?;
        if self.state.selection.novel.as_deref() == Some(novel) {
            self.state.clear_novel();
            self.presenter.show_fields(&self.state.buffers);
        }
        self.after_structure_change(&format!("Deleted novel `{novel}`"));
        Ok(())
    }

    pub fn delete_chapter(&mut self, novel: &str, folder: &str) -> Result<(), StudioError> {
        self.ensure_idle()?;
        self.confirm(&format!("Delete `{folder}` and all of its scenes?"))?;
        self.store.delete_chapter(novel, folder)?;
        if self.state.selection.is_chapter(novel, folder) {
            self.state.clear_chapter();
            self.presenter.show_fields(&self.state.buffers);
        }
        self.after_structure_change(&format!("Deleted `{folder}` from `{novel}`"));
        Ok(())
    }

    /// Removes one scene and refreshes the novel summary.
    pub fn delete_scene(&mut self, novel: &str, folder: &str, scene: u32) -> Result<(), StudioError> {
        self.ensure_idle()?;
        self.confirm(&format!("Delete scene {scene} of `{folder}`?"))?;
        self.store.delete_scene(novel, folder, scene)?;
        if self.state.selection.is_chapter(novel, folder) && self.state.selection.scene == Some(scene)
        {
            self.state.clear_scene();
            self.presenter.show_fields(&self.state.buffers);
        }
        self.after_structure_change(&format!("Deleted scene {scene} of `{folder}`"));
        self.chain_summary(novel);
        Ok(())
    }

    // Generation

    /// Allocates the next scene number in the loaded chapter and starts
    /// generating it. Returns the allocated number.
    pub fn new_scene(&mut self) -> Result<u32, StudioError> {
        self.ensure_idle()?;
        let (novel, folder) = self.loaded_chapter()?;
        let (provider, model) = self.active_model()?;
        self.resolve_unsaved()?;

        let scene = self.store.next_scene_number(&novel, &folder);
        self.state.clear_scene();
        self.state.selection.scene = Some(scene);
        let target = SceneTarget {
            novel,
            folder,
            scene,
        };
        if let Err(err) = self.start_generation(provider, model, target, true) {
            self.state.clear_scene();
            self.update_actions();
            return Err(err);
        }
        Ok(scene)
    }

    pub fn regenerate_scene(&mut self) -> Result<(), StudioError> {
        self.ensure_idle()?;
        let (novel, folder) = self.loaded_chapter()?;
        let scene = self.state.selection.scene.ok_or(StudioError::NoScene)?;
        let (provider, model) = self.active_model()?;
        self.resolve_unsaved()?;
        let target = SceneTarget {
            novel,
            folder,
            scene,
        };
        self.start_generation(provider, model, target, false)
    }

    /// Starts a summary of `novel` (or the loaded novel) with the configured
    /// summary model of the active provider.
    pub fn summarize_novel(&mut self, novel: Option<&str>) -> Result<(), StudioError> {
        self.ensure_idle()?;
        let novel = match novel {
            Some(novel) => novel.to_string(),
            None => self.state.selection.novel.clone().ok_or(StudioError::NoNovel)?,
        };
        self.require_novel(&novel)?;
        let provider = self.provider.ok_or(StudioError::NoModel)?;
        let job = self
            .summary_job(&novel)
            .ok_or(StudioError::NoSummaryModel(provider))?;
        self.dispatch(TaskCommand::Summarize(job))
    }

    pub fn export_image(&mut self, destination: PathBuf) -> Result<(), StudioError> {
        self.ensure_idle()?;
        let exporter = self.exporter.clone().ok_or(StudioError::NoExporter)?;
        let text = self.state.buffers.scene_content.clone();
        if text.trim().is_empty() {
            return Err(StudioError::NothingToExport);
        }
        let config = self.config.config();
        let request = CaptureRequest {
            text,
            destination,
            background: config.output_bg_color.clone(),
            foreground: config.output_fg_color.clone(),
            font_path: config.image_font_path.as_ref().map(PathBuf::from),
        };
        self.dispatch(TaskCommand::Capture(CaptureJob { exporter, request }))
    }

    // Provider selection

    pub fn change_provider(&mut self, provider: ProviderId) -> Result<Option<String>, StudioError> {
        if !self.registry.contains(provider) {
            return Err(StudioError::ProviderUnavailable(provider));
        }
        self.provider = Some(provider);
        self.revalidate_model();
        self.config.touch_provider(provider);
        self.config.touch_model(self.model.clone());
        self.persist_config();
        self.update_actions();
        let message = match &self.model {
            Some(model) => format!("Using {} / {model}", provider.label()),
            None => format!("{} has no available models", provider.label()),
        };
        self.notify(&message, self.model.is_none());
        Ok(self.model.clone())
    }

    pub fn change_model(&mut self, model: &str) -> Result<(), StudioError> {
        let provider = self.provider.ok_or(StudioError::NoModel)?;
        if !self.registry.models(provider).iter().any(|name| name == model) {
            return Err(StudioError::UnknownModel(model.to_string()));
        }
        self.model = Some(model.to_string());
        self.config.touch_model(self.model.clone());
        self.persist_config();
        self.update_actions();
        Ok(())
    }

    // Edits

    pub fn edit_novel_settings(&mut self, text: &str) {
        if self.state.selection.novel.is_none() {
            return;
        }
        self.state.buffers.novel_settings = text.to_string();
        self.state.modified.novel_settings = true;
        self.mark_edited();
    }

    pub fn edit_chapter_notes(&mut self, text: &str) {
        if self.state.selection.chapter.is_none() {
            return;
        }
        self.state.buffers.chapter_notes = text.to_string();
        self.state.modified.chapter_notes = true;
        self.mark_edited();
    }

    /// The plot field doubles as input for the next new scene, so it only
    /// counts as an unsaved edit while a scene is loaded.
    ///
    /// Scene edits are ignored while a generation is running: its result
    /// replaces the scene fields when it lands.
    pub fn edit_scene_plot(&mut self, text: &str) {
        if self.scene_locked() {
            return;
        }
        self.state.buffers.scene_plot = text.to_string();
        if self.state.selection.scene.is_some() {
            self.state.modified.scene_options = true;
            self.mark_edited();
        }
    }

    pub fn edit_scene_options(&mut self, options: SceneOptions) {
        if self.scene_locked() {
            return;
        }
        let temperature = if options.temperature.is_finite() {
            options.temperature.clamp(0.0, MAX_TEMPERATURE)
        } else {
            SceneOptions::default().temperature
        };
        self.state.buffers.options = SceneOptions {
            temperature,
            length: options.length,
        };
        if self.state.selection.scene.is_some() {
            self.state.modified.scene_options = true;
            self.mark_edited();
        }
    }

    pub fn edit_scene_content(&mut self, text: &str) {
        if self.scene_locked() {
            return;
        }
        self.state.buffers.scene_content = text.to_string();
        if self.state.selection.scene.is_some() {
            self.state.modified.scene_content = true;
            self.mark_edited();
        }
    }

    /// Writes every modified field of the loaded items. Fields that saved
    /// are marked clean even when others fail. The scene being generated
    /// is left alone until its result arrives.
    pub fn save_pending(&mut self) -> Result<(), StudioError> {
        let selection = self.state.selection.clone();
        let scene = selection.scene.filter(|_| !self.scene_locked());
        let mut failures: Vec<String> = Vec::new();
        let mut record = |result: Result<(), StorageError>, flag: &mut bool| match result {
            Ok(()) => *flag = false,
            Err(err) => failures.push(err.to_string()),
        };

        let modified = &mut self.state.modified;
        let buffers = &self.state.buffers;
        let store = &self.store;

        if modified.novel_settings {
            if let Some(novel) = &selection.novel {
                let value = NovelSettings {
                    novel_settings: buffers.novel_settings.clone(),
                };
                record(store.save_novel_settings(novel, &value), &mut modified.novel_settings);
            }
        }

        if let (Some(novel), Some(folder)) = (&selection.novel, &selection.chapter) {
            if modified.chapter_notes {
                let value = ChapterSettings {
                    arc_notes: buffers.chapter_notes.clone(),
                };
                record(
                    store.save_chapter_settings(novel, folder, &value),
                    &mut modified.chapter_notes,
                );
            }

            if let Some(scene) = scene {
                if modified.scene_content {
                    record(
                        store.save_scene_content(novel, folder, scene, &buffers.scene_content),
                        &mut modified.scene_content,
                    );
                }
                if modified.scene_options {
                    let mut settings = store.load_scene_settings(novel, folder, scene);
                    settings.plot = buffers.scene_plot.clone();
                    settings.temperature = buffers.options.temperature;
                    settings.length = buffers.options.length;
                    record(
                        store.save_scene_settings(novel, folder, scene, &settings),
                        &mut modified.scene_options,
                    );
                }
            }
        }

        self.update_actions();
        if failures.is_empty() {
            self.autosave.cancel();
            self.sink.log(LogRecord::info("Saved pending changes"));
            Ok(())
        } else {
            Err(StudioError::SaveFailed(failures.join("; ")))
        }
    }

    /// Runs the unsaved-changes gate before the application exits. Returns
    /// `false` when the user cancelled.
    pub fn request_quit(&mut self) -> bool {
        if self.resolve_unsaved().is_err() {
            return false;
        }
        self.persist_config();
        true
    }

    // Internals

    fn handle_event(&mut self, event: TaskEvent) {
        if event.kind().is_some() {
            self.running = None;
        }
        match event {
            TaskEvent::Log(record) => self.sink.log(record),
            TaskEvent::GenerationFinished { job, result } => self.process_generation(job, result),
            TaskEvent::SummaryFinished { novel, result } => match result {
                Ok(usage) => self.notify(
                    &format!(
                        "Summary of `{novel}` updated ({} tokens)",
                        usage.total()
                    ),
                    false,
                ),
                Err(SummaryError::NothingToSummarize) => {
                    self.sink.log(LogRecord::info(format!(
                        "Skipped summary of `{novel}`: nothing written yet"
                    )));
                }
                Err(err) => self.notify(&format!("Summary failed: {err}"), true),
            },
            TaskEvent::CaptureFinished {
                destination,
                result,
            } => match result {
                Ok(()) => self.notify(
                    &format!("Image saved to {}", destination.display()),
                    false,
                ),
                Err(err) => {
                    self.notify(&format!("Image export failed: {err}"), true);
                    self.presenter.show_error("Image export failed", &err.to_string());
                }
            },
        }
        self.update_actions();
    }

    fn process_generation(&mut self, job: GenerateJob, result: GenerationResult) {
        let GenerateJob {
            snapshot,
            target,
            is_new,
            ..
        } = job;
        let is_current = self.state.selection.is_chapter(&target.novel, &target.folder)
            && self.state.selection.scene == Some(target.scene);

        let text = match result.outcome {
            Ok(text) => text,
            Err(failure) => {
                if is_new && is_current {
                    self.state.clear_scene();
                    self.presenter.show_fields(&self.state.buffers);
                }
                self.notify(&format!("Generation failed: {failure}"), true);
                self.presenter
                    .show_error("Generation failed", &failure.to_string());
                return;
            }
        };
        let usage = result.usage;
        let settings = snapshot.into_settings(usage);

        let content_saved = self.store.save_scene_content(
            &target.novel,
            &target.folder,
            target.scene,
            &text,
        );
        // A new scene without text does not exist, so it gets no settings file.
        let settings_saved = if is_new && content_saved.is_err() {
            None
        } else {
            Some(self.store.save_scene_settings(
                &target.novel,
                &target.folder,
                target.scene,
                &settings,
            ))
        };

        if is_current {
            if content_saved.is_ok() {
                self.state.buffers.scene_content = text.clone();
                self.state.modified.scene_content = false;
            } else if is_new {
                self.state.clear_scene();
            }
            if self.state.selection.scene.is_some() {
                match &settings_saved {
                    Some(Ok(())) => {
                        self.apply_scene_settings(&settings);
                        self.state.modified.scene_options = false;
                    }
                    _ => self.state.modified.scene_options = true,
                }
            }
            self.presenter.show_fields(&self.state.buffers);
        }
        if content_saved.is_ok() {
            self.presenter.show_generation(&text, usage);
        }
        self.refresh_tree();

        match (content_saved, settings_saved) {
            (Ok(()), Some(Err(err))) => self.notify(
                &format!("Scene text saved, but its settings could not be written: {err}"),
                true,
            ),
            (Ok(()), _) => {
                self.notify(
                    &format!(
                        "Scene {} saved ({} input / {} output tokens)",
                        target.scene, usage.input_tokens, usage.output_tokens
                    ),
                    false,
                );
                self.chain_summary(&target.novel);
            }
            (Err(err), Some(Ok(()))) => self.notify(
                &format!("Scene settings saved, but the text could not be written: {err}"),
                true,
            ),
            (Err(err), _) => {
                self.notify(&format!("Failed to save the generated scene: {err}"), true)
            }
        }
    }

    fn start_generation(
        &mut self,
        provider_id: ProviderId,
        model: String,
        target: SceneTarget,
        is_new: bool,
    ) -> Result<(), StudioError> {
        let provider = self
            .registry
            .get(provider_id)
            .ok_or(StudioError::ProviderUnavailable(provider_id))?;
        let previous =
            self.store
                .previous_scenes_text(&target.novel, &target.folder, target.scene);
        let buffers = &self.state.buffers;
        let snapshot = GenerationSnapshot {
            provider: provider_id,
            model: model.clone(),
            temperature: buffers.options.temperature,
            length: buffers.options.length,
            plot: buffers.scene_plot.clone(),
        };
        let prompt = build_prompt(&PromptInputs {
            novel_settings: &buffers.novel_settings,
            chapter_arc_notes: &buffers.chapter_notes,
            scene_plot: &snapshot.plot,
            length: snapshot.length,
            previous_content: &previous,
        });
        let request = GenerationRequest {
            model,
            prompt,
            system_prompt: self.config.config().system_prompt.clone(),
            temperature: Some(snapshot.temperature),
        };
        let message = format!(
            "Generating scene {} of `{}` with {}",
            target.scene, target.folder, snapshot.model
        );

        self.dispatch(TaskCommand::Generate(GenerateJob {
            provider,
            request,
            snapshot,
            target,
            is_new,
        }))?;
        self.notify(&message, false);
        Ok(())
    }

    fn summary_job(&self, novel: &str) -> Option<SummarizeJob> {
        let provider_id = self.provider?;
        let model = self.config.config().summary_model(provider_id)?.to_string();
        let provider = self.registry.get(provider_id)?;
        Some(SummarizeJob {
            provider,
            model,
            system_prompt: self.config.config().system_prompt.clone(),
            store: self.store.clone(),
            novel: novel.to_string(),
        })
    }

    /// Fire-and-forget summary after a structural or generation change.
    fn chain_summary(&mut self, novel: &str) {
        if !self.busy().is_idle() {
            log::debug!("summary of `{novel}` skipped: {}", self.busy().label());
            return;
        }
        let Some(job) = self.summary_job(novel) else {
            log::debug!("summary of `{novel}` skipped: no summary model configured");
            return;
        };
        if let Err(err) = self.dispatch(TaskCommand::Summarize(job)) {
            log::warn!("failed to start summary of `{novel}`: {err}");
        }
    }

    fn dispatch(&mut self, command: TaskCommand) -> Result<(), StudioError> {
        let kind = command.kind();
        self.tasks.send(command)?;
        self.running = Some(RunningTask {
            kind,
            started: Instant::now(),
            elapsed_shown: 0,
        });
        self.sink.log(LogRecord::info(format!("{} started", kind.label())));
        self.notify(&format!("{}...", kind.label()), false);
        self.update_actions();
        Ok(())
    }

    fn scene_locked(&self) -> bool {
        self.busy() == BusyState::Generating
    }

    fn ensure_idle(&self) -> Result<(), StudioError> {
        match self.busy() {
            BusyState::Idle => Ok(()),
            busy => Err(StudioError::Busy(busy)),
        }
    }

    fn confirm(&mut self, message: &str) -> Result<(), StudioError> {
        if self.presenter.confirm(message) {
            Ok(())
        } else {
            Err(StudioError::Cancelled)
        }
    }

    /// The unsaved-changes gate. `Save` must fully succeed for the pending
    /// action to go ahead.
    fn resolve_unsaved(&mut self) -> Result<(), StudioError> {
        if !self.state.modified.any() {
            return Ok(());
        }
        match self.presenter.confirm_unsaved() {
            UnsavedChoice::Save => self.save_pending().map_err(|err| {
                self.notify(&format!("{err}; the action was aborted"), true);
                err
            }),
            UnsavedChoice::Discard => {
                self.state.modified.clear();
                self.autosave.cancel();
                self.load_selection();
                self.update_actions();
                Ok(())
            }
            UnsavedChoice::Cancel => Err(StudioError::Cancelled),
        }
    }

    fn loaded_chapter(&self) -> Result<(String, String), StudioError> {
        let novel = self.state.selection.novel.clone().ok_or(StudioError::NoNovel)?;
        let folder = self
            .state
            .selection
            .chapter
            .clone()
            .ok_or(StudioError::NoChapter)?;
        Ok((novel, folder))
    }

    fn active_model(&self) -> Result<(ProviderId, String), StudioError> {
        match (self.provider, &self.model) {
            (Some(provider), Some(model)) => Ok((provider, model.clone())),
            _ => Err(StudioError::NoModel),
        }
    }

    fn require_novel(&self, novel: &str) -> Result<(), StudioError> {
        if self.store.novel_exists(novel) {
            Ok(())
        } else {
            Err(StorageError::NotFound(novel.to_string()).into())
        }
    }

    fn require_chapter(&self, novel: &str, folder: &str) -> Result<(), StudioError> {
        if self.store.chapter_exists(novel, folder) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("{novel}/{folder}")).into())
        }
    }

    /// Reloads every buffer of the current selection from disk and shows it.
    /// Returns the loaded scene settings, if a scene is selected.
    fn load_selection(&mut self) -> Option<SceneSettings> {
        let selection = self.state.selection.clone();
        let buffers = &mut self.state.buffers;
        buffers.novel_settings = selection
            .novel
            .as_deref()
            .map(|novel| self.store.load_novel_settings(novel).novel_settings)
            .unwrap_or_default();
        buffers.chapter_notes = match (&selection.novel, &selection.chapter) {
            (Some(novel), Some(folder)) => self.store.load_chapter_settings(novel, folder).arc_notes,
            _ => String::new(),
        };

        let scene_settings = match (&selection.novel, &selection.chapter, selection.scene) {
            (Some(novel), Some(folder), Some(scene)) => {
                buffers.scene_content = self.store.load_scene_content(novel, folder, scene);
                Some(self.store.load_scene_settings(novel, folder, scene))
            }
            _ => {
                buffers.scene_content.clear();
                None
            }
        };
        if let Some(settings) = &scene_settings {
            self.apply_scene_settings(settings);
        }
        self.presenter.show_fields(&self.state.buffers);
        scene_settings
    }

    fn apply_scene_settings(&mut self, settings: &SceneSettings) {
        self.state.buffers.scene_plot = settings.plot.clone();
        self.state.buffers.options = SceneOptions {
            temperature: settings.temperature,
            length: settings.length,
        };
        self.state.stored_model = settings.model.clone();
    }

    /// Switches to the provider a loaded scene was generated with, when that
    /// provider is available, then re-derives the model.
    fn adopt_scene_provider(&mut self, provider: Option<ProviderId>) {
        if let Some(provider) = provider {
            if self.registry.contains(provider) {
                self.provider = Some(provider);
            } else {
                log::info!(
                    "scene was generated with {}, which is not configured",
                    provider.label()
                );
            }
        }
        self.revalidate_model();
    }

    fn revalidate_model(&mut self) {
        self.model = self.provider.and_then(|provider| {
            resolve_model(
                provider,
                self.registry.models(provider),
                self.state.stored_model.as_deref(),
                self.model.as_deref(),
            )
        });
    }

    fn persist_config(&mut self) {
        if let Err(err) = self.config.save() {
            log::warn!("failed to save config: {err}");
            self.notify(&format!("Failed to save settings: {err}"), false);
        }
    }

    fn mark_edited(&mut self) {
        self.autosave.arm(Instant::now());
        self.update_actions();
    }

    fn autosave_now(&mut self) {
        if !self.state.modified.any() {
            return;
        }
        match self.save_pending() {
            Ok(()) => self.notify("Changes saved", false),
            Err(err) => self.notify(&format!("Auto-save failed: {err}"), true),
        }
    }

    fn after_structure_change(&mut self, message: &str) {
        self.refresh_tree();
        self.update_actions();
        self.notify(message, false);
    }

    fn refresh_tree(&mut self) {
        let tree = self.store.list_tree();
        self.presenter.refresh_tree(&tree);
    }

    fn update_actions(&mut self) {
        let idle = self.busy().is_idle();
        let selection = &self.state.selection;
        let has_model = self.provider.is_some() && self.model.is_some();
        let can_generate = idle && has_model && selection.chapter.is_some();
        let actions = ActionState {
            busy: !idle,
            can_create_chapter: selection.novel.is_some(),
            can_generate,
            can_regenerate: can_generate && selection.scene.is_some(),
            can_save: self.state.modified.any(),
            can_export: idle
                && self.exporter.is_some()
                && !self.state.buffers.scene_content.trim().is_empty(),
            can_edit_scene: !self.scene_locked(),
        };
        self.presenter.set_actions(actions);
    }

    fn notify(&mut self, text: &str, critical: bool) {
        self.presenter.set_status(text, critical);
        let level = if critical {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        self.sink.log(LogRecord::new(level, text));
        self.status = Some(StatusLine {
            critical,
            shown_at: Instant::now(),
        });
    }

    fn refresh_elapsed(&mut self, now: Instant) {
        let Some(task) = self.running.as_mut() else {
            return;
        };
        let seconds = now.saturating_duration_since(task.started).as_secs();
        if seconds > task.elapsed_shown {
            task.elapsed_shown = seconds;
            let text = format!("{}... {seconds}s", task.kind.label());
            self.presenter.set_status(&text, false);
            self.status = Some(StatusLine {
                critical: false,
                shown_at: now,
            });
        }
    }

    fn expire_status(&mut self, now: Instant) {
        if !self.busy().is_idle() {
            return;
        }
        let expired = matches!(
            &self.status,
            Some(line) if !line.critical
                && now.saturating_duration_since(line.shown_at) >= STATUS_CLEAR_AFTER
        );
        if expired {
            self.presenter.set_status("", false);
            self.status = None;
        }
    }
}

fn initial_provider(registry: &ProviderRegistry, last: Option<ProviderId>) -> Option<ProviderId> {
    if let Some(last) = last.filter(|id| registry.contains(*id)) {
        return Some(last);
    }
    let ids = registry.ids();
    ids.iter()
        .copied()
        .find(|id| !registry.models(*id).is_empty())
        .or_else(|| ids.first().copied())
}

fn describe_selection(selection: &Selection) -> String {
    match (&selection.novel, &selection.chapter, selection.scene) {
        (Some(novel), Some(folder), Some(scene)) => format!("scene {scene} of `{novel}/{folder}`"),
        (Some(novel), Some(folder), None) => format!("`{novel}/{folder}`"),
        (Some(novel), None, _) => format!("novel `{novel}`"),
        _ => "nothing".to_string(),
    }
}
