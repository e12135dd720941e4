use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use novel_adapters::{connect_providers, DEFAULT_TIMEOUT};
use novel_core::{
    ConfigStore, LengthOption, NovelEntry, NovelStore, ProviderId, ProviderRegistry, SecretsFile,
    TokenUsage, CONFIG_FILE_NAME, SECRETS_FILE_NAME,
};
use novel_studio::{
    ActionState, EditorBuffers, Presenter, SceneOptions, Studio, StudioError, TreeItem,
    UnsavedChoice,
};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let store = NovelStore::new(&cli.data_dir);
    store.ensure_base()?;
    let config = ConfigStore::open(&cli.config)?;
    let env_file = cli
        .env_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(SECRETS_FILE_NAME));

    if let Command::Keys(KeysCommand::Set { provider, value }) = &cli.command {
        return set_key(&env_file, *provider, value);
    }

    let secrets = SecretsFile::load(&env_file)?;
    if config.config().ask_for_missing_keys {
        for provider in secrets.missing_providers() {
            log::warn!(
                "{} is disabled: set {} (webnovelctl keys set {} <KEY>)",
                provider.label(),
                provider.secret_key(),
                provider.as_str()
            );
        }
    }

    match cli.command {
        Command::Providers => {
            let registry = connect_providers(&secrets, DEFAULT_TIMEOUT);
            print_providers(&registry);
            Ok(())
        }
        Command::Novel(command) => handle_novel(open_studio(store, config, &secrets, cli.yes), command),
        Command::Chapter(command) => {
            handle_chapter(open_studio(store, config, &secrets, cli.yes), command)
        }
        Command::Scene(command) => {
            let studio = open_studio(store, config, &secrets, cli.yes);
            handle_scene(studio, command)
        }
        Command::Summarize(args) => {
            let mut studio = open_studio(store, config, &secrets, cli.yes);
            if let Some(provider) = args.provider {
                studio.change_provider(provider)?;
            }
            require_provider(&studio)?;
            studio.summarize_novel(Some(&args.novel))?;
            wait_for_idle(&mut studio)
        }
        Command::Keys(_) => Ok(()),
    }
}

fn open_studio(
    store: NovelStore,
    config: ConfigStore,
    secrets: &SecretsFile,
    assume_yes: bool,
) -> Studio<HeadlessPresenter> {
    let registry = connect_providers(secrets, DEFAULT_TIMEOUT);
    let mut studio = Studio::new(store, config, registry, HeadlessPresenter::new(assume_yes));
    // Startup problems were already logged; only task failures decide the exit code.
    studio.presenter_mut().failures.clear();
    studio
}

fn require_provider(studio: &Studio<HeadlessPresenter>) -> Result<(), CliError> {
    if studio.available_providers().is_empty() || studio.model().is_none() {
        Err(CliError::NoProvider)
    } else {
        Ok(())
    }
}

fn set_key(env_file: &Path, provider: ProviderId, value: &str) -> Result<(), CliError> {
    let mut secrets = SecretsFile::load(env_file)?.file_only();
    secrets.upsert(provider.secret_key(), value.trim())?;
    secrets.save()?;
    println!(
        "Stored {} in {}",
        provider.secret_key(),
        secrets.path().display()
    );
    Ok(())
}

fn print_providers(registry: &ProviderRegistry) {
    for provider in ProviderId::ALL {
        if !registry.contains(provider) {
            println!("{:<10} not configured ({})", provider.as_str(), provider.secret_key());
            continue;
        }
        let models = registry.models(provider);
        if models.is_empty() {
            println!("{:<10} no models available", provider.as_str());
        } else {
            println!("{:<10} {}", provider.as_str(), models.join(", "));
        }
    }
}

fn print_tree(tree: &[NovelEntry]) {
    if tree.is_empty() {
        println!("(no novels)");
    }
    for novel in tree {
        println!("{}", novel.name);
        for chapter in &novel.chapters {
            let scenes: Vec<String> = chapter.scenes.iter().map(u32::to_string).collect();
            println!("  {} [{}]", chapter.folder, scenes.join(" "));
        }
    }
}

fn handle_novel(mut studio: Studio<HeadlessPresenter>, command: NovelCommand) -> Result<(), CliError> {
    match command {
        NovelCommand::List => print_tree(&studio.store().list_tree()),
        NovelCommand::Create { name } => {
            let novel = studio.create_novel(&name)?;
            println!("{novel}");
        }
        NovelCommand::Rename { novel, new_name } => {
            let renamed = studio.rename_novel(&novel, &new_name)?;
            println!("{renamed}");
        }
        NovelCommand::Delete { novel } => studio.delete_novel(&novel)?,
        NovelCommand::Settings { novel, text } => {
            studio.load_item(TreeItem::Novel(novel))?;
            studio.edit_novel_settings(&text);
            studio.save_pending()?;
        }
    }
    Ok(())
}

fn handle_chapter(
    mut studio: Studio<HeadlessPresenter>,
    command: ChapterCommand,
) -> Result<(), CliError> {
    match command {
        ChapterCommand::Create { novel, title } => {
            studio.load_item(TreeItem::Novel(novel))?;
            let folder = studio.create_chapter(title.as_deref().unwrap_or_default())?;
            println!("{folder}");
        }
        ChapterCommand::Rename {
            novel,
            chapter,
            title,
        } => {
            let renamed = studio.rename_chapter(&novel, &chapter, &title)?;
            println!("{renamed}");
        }
        ChapterCommand::Delete { novel, chapter } => studio.delete_chapter(&novel, &chapter)?,
        ChapterCommand::Notes {
            novel,
            chapter,
            text,
        } => {
            studio.load_item(TreeItem::Chapter {
                novel,
                folder: chapter,
            })?;
            studio.edit_chapter_notes(&text);
            studio.save_pending()?;
        }
    }
    Ok(())
}

fn handle_scene(mut studio: Studio<HeadlessPresenter>, command: SceneCommand) -> Result<(), CliError> {
    match command {
        SceneCommand::Generate { target, options } => {
            studio.load_item(TreeItem::Chapter {
                novel: target.novel,
                folder: target.chapter,
            })?;
            prepare_generation(&mut studio, &options)?;
            let scene = studio.new_scene()?;
            log::info!("allocated scene {scene}");
            wait_for_idle(&mut studio)
        }
        SceneCommand::Regenerate {
            target,
            scene,
            options,
        } => {
            studio.load_item(TreeItem::Scene {
                novel: target.novel,
                folder: target.chapter,
                scene,
            })?;
            prepare_generation(&mut studio, &options)?;
            studio.regenerate_scene()?;
            wait_for_idle(&mut studio)
        }
        SceneCommand::Show { target, scene } => {
            let store = studio.store();
            if !store.scene_path(&target.novel, &target.chapter, scene).exists() {
                return Err(CliError::MissingScene(scene));
            }
            println!(
                "{}",
                store.load_scene_content(&target.novel, &target.chapter, scene)
            );
            Ok(())
        }
        SceneCommand::Delete { target, scene } => {
            studio.delete_scene(&target.novel, &target.chapter, scene)?;
            wait_for_idle(&mut studio)
        }
    }
}

/// Applies the command-line overrides, then checks that the resulting
/// provider can generate.
fn prepare_generation(
    studio: &mut Studio<HeadlessPresenter>,
    options: &GenerationArgs,
) -> Result<(), CliError> {
    apply_options(studio, options)?;
    require_provider(studio)
}

fn apply_options(
    studio: &mut Studio<HeadlessPresenter>,
    options: &GenerationArgs,
) -> Result<(), CliError> {
    if let Some(provider) = options.provider {
        studio.change_provider(provider)?;
    }
    if let Some(model) = &options.model {
        studio.change_model(model)?;
    }
    if let Some(plot) = &options.plot {
        studio.edit_scene_plot(plot);
    }
    if options.temperature.is_some() || options.length.is_some() {
        let current = studio.buffers().options;
        studio.edit_scene_options(SceneOptions {
            temperature: options.temperature.unwrap_or(current.temperature),
            length: options.length.unwrap_or(current.length),
        });
    }
    Ok(())
}

/// Polls the studio until its background task and any chained summary finish.
fn wait_for_idle(studio: &mut Studio<HeadlessPresenter>) -> Result<(), CliError> {
    loop {
        studio.tick(Instant::now());
        if studio.busy().is_idle() {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    match studio.presenter_mut().failures.drain(..).next() {
        Some(message) => Err(CliError::TaskFailed(message)),
        None => Ok(()),
    }
}

fn parse_length(value: &str) -> Result<LengthOption, String> {
    LengthOption::parse(value).ok_or_else(|| {
        let known: Vec<&str> = LengthOption::ALL.iter().map(LengthOption::as_str).collect();
        format!("expected one of: {}", known.join(", "))
    })
}

/// Prints status updates and answers prompts without user interaction.
struct HeadlessPresenter {
    assume_yes: bool,
    last_status: String,
    failures: Vec<String>,
}

impl HeadlessPresenter {
    fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            last_status: String::new(),
            failures: Vec::new(),
        }
    }
}

impl Presenter for HeadlessPresenter {
    fn refresh_tree(&mut self, _tree: &[NovelEntry]) {}

    fn show_fields(&mut self, _buffers: &EditorBuffers) {}

    fn show_generation(&mut self, text: &str, usage: TokenUsage) {
        println!("{text}");
        log::info!(
            "tokens: {} input, {} output",
            usage.input_tokens,
            usage.output_tokens
        );
    }

    fn set_status(&mut self, text: &str, critical: bool) {
        if text.is_empty() || text == self.last_status {
            return;
        }
        self.last_status = text.to_string();
        if critical {
            log::error!("{text}");
            self.failures.push(text.to_string());
        } else {
            log::info!("{text}");
        }
    }

    fn set_actions(&mut self, _actions: ActionState) {}

    fn confirm_unsaved(&mut self) -> UnsavedChoice {
        UnsavedChoice::Save
    }

    fn confirm(&mut self, message: &str) -> bool {
        if !self.assume_yes {
            log::warn!("{message} Re-run with --yes to confirm.");
        }
        self.assume_yes
    }

    fn show_error(&mut self, title: &str, message: &str) {
        log::error!("{title}: {message}");
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Studio(#[from] StudioError),
    #[error(transparent)]
    Storage(#[from] novel_core::StorageError),
    #[error(transparent)]
    Config(#[from] novel_core::ConfigError),
    #[error(transparent)]
    Secrets(#[from] novel_core::SecretsError),
    #[error("no provider is usable: set an API key with `webnovelctl keys set`")]
    NoProvider,
    #[error("scene {0} does not exist")]
    MissingScene(u32),
    #[error("{0}")]
    TaskFailed(String),
}

#[derive(Parser)]
#[command(name = "webnovelctl", version, about = "Web novel studio command-line tool")]
struct Cli {
    /// Directory holding one folder per novel
    #[arg(long, global = true, default_value = "novels")]
    data_dir: PathBuf,

    /// Path of the global settings file
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Secrets file with provider API keys (defaults to ./.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Confirm deletions without asking
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured providers and their models
    Providers,
    /// Novel operations
    #[command(subcommand)]
    Novel(NovelCommand),
    /// Chapter operations
    #[command(subcommand)]
    Chapter(ChapterCommand),
    /// Scene operations
    #[command(subcommand)]
    Scene(SceneCommand),
    /// Rewrite the summary of a novel with the configured summary model
    Summarize(SummarizeArgs),
    /// API key management
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[derive(Subcommand)]
enum NovelCommand {
    /// Print every novel, chapter and scene number
    List,
    Create {
        name: String,
    },
    Rename {
        novel: String,
        new_name: String,
    },
    Delete {
        novel: String,
    },
    /// Replace the novel-level settings text
    Settings {
        novel: String,
        text: String,
    },
}

#[derive(Subcommand)]
enum ChapterCommand {
    Create {
        novel: String,
        #[arg(long)]
        title: Option<String>,
    },
    Rename {
        novel: String,
        chapter: String,
        title: String,
    },
    Delete {
        novel: String,
        chapter: String,
    },
    /// Replace the chapter arc notes
    Notes {
        novel: String,
        chapter: String,
        text: String,
    },
}

#[derive(Subcommand)]
enum SceneCommand {
    /// Generate the next scene of a chapter
    Generate {
        #[command(flatten)]
        target: ChapterTarget,
        #[command(flatten)]
        options: GenerationArgs,
    },
    /// Generate an existing scene again, replacing its text
    Regenerate {
        #[command(flatten)]
        target: ChapterTarget,
        scene: u32,
        #[command(flatten)]
        options: GenerationArgs,
    },
    Show {
        #[command(flatten)]
        target: ChapterTarget,
        scene: u32,
    },
    Delete {
        #[command(flatten)]
        target: ChapterTarget,
        scene: u32,
    },
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Store an API key in the secrets file
    Set { provider: ProviderId, value: String },
}

#[derive(Args)]
struct ChapterTarget {
    novel: String,
    /// Chapter folder name, e.g. Chapter_001_Dawn
    chapter: String,
}

#[derive(Args)]
struct GenerationArgs {
    #[arg(long)]
    plot: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    /// short, medium, long or very_long
    #[arg(long, value_parser = parse_length)]
    length: Option<LengthOption>,
    #[arg(long)]
    provider: Option<ProviderId>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args)]
struct SummarizeArgs {
    novel: String,
    #[arg(long)]
    provider: Option<ProviderId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use novel_core::{GenerationRequest, GenerationResult, TextProvider};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct StaticProvider {
        id: ProviderId,
        models: Vec<String>,
    }

    impl TextProvider for StaticProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn list_models(&self) -> Vec<String> {
            self.models.clone()
        }

        fn generate(&self, _request: &GenerationRequest) -> GenerationResult {
            GenerationResult::success("unused", TokenUsage::default())
        }
    }

    fn generation_args(provider: Option<ProviderId>) -> GenerationArgs {
        GenerationArgs {
            plot: None,
            temperature: None,
            length: None,
            provider,
            model: None,
        }
    }

    #[test]
    fn provider_override_is_applied_before_the_usability_check() {
        let temp = tempdir().unwrap();
        let store = NovelStore::new(temp.path().join("novels"));
        store.ensure_base().unwrap();
        let mut config = ConfigStore::open(temp.path().join(CONFIG_FILE_NAME)).unwrap();
        config.touch_provider(ProviderId::Gemini);

        let mut registry = ProviderRegistry::new();
        registry.insert(Arc::new(StaticProvider {
            id: ProviderId::Gemini,
            models: Vec::new(),
        }));
        registry.insert(Arc::new(StaticProvider {
            id: ProviderId::OpenAi,
            models: vec!["gpt-4o".into()],
        }));
        let mut studio = Studio::new(store, config, registry, HeadlessPresenter::new(true));
        assert_eq!(studio.provider(), Some(ProviderId::Gemini));

        assert!(matches!(
            prepare_generation(&mut studio, &generation_args(None)),
            Err(CliError::NoProvider)
        ));
        prepare_generation(&mut studio, &generation_args(Some(ProviderId::OpenAi))).unwrap();
        assert_eq!(studio.model(), Some("gpt-4o"));
    }
}
