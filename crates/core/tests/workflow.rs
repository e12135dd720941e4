use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

use novel_core::{
    build_prompt, build_summary_prompt, ChapterSettings, GenerationFailure, GenerationRequest,
    GenerationResult, GenerationSnapshot, LengthOption, NovelSettings, NovelStore, PromptInputs,
    ProviderId, ProviderRegistry, TextProvider, TokenUsage,
};
use tempfile::tempdir;

struct MockProvider {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn assert_empty(&self) {
        let guard = self.responses.lock().expect("mock mutex poisoned");
        assert!(
            guard.is_empty(),
            "expected all mock responses to be consumed"
        );
    }
}

impl TextProvider for MockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn list_models(&self) -> Vec<String> {
        vec!["claude-3-haiku-20240307".into()]
    }

    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        self.prompts
            .lock()
            .expect("mock mutex poisoned")
            .push(request.prompt.clone());
        let mut guard = self.responses.lock().expect("mock mutex poisoned");
        match guard.pop_front() {
            Some(text) => GenerationResult::success(text, TokenUsage::new(30, 12)),
            None => GenerationResult::failure(GenerationFailure::EmptyResponse {
                provider: ProviderId::Anthropic,
            }),
        }
    }
}

fn generate_scene(
    store: &NovelStore,
    provider: &dyn TextProvider,
    novel: &str,
    folder: &str,
    plot: &str,
) -> Result<u32, Box<dyn std::error::Error>> {
    let scene = store.next_scene_number(novel, folder);
    let previous = store.previous_scenes_text(novel, folder, scene);
    let novel_settings = store.load_novel_settings(novel).novel_settings;
    let arc_notes = store.load_chapter_settings(novel, folder).arc_notes;
    let snapshot = GenerationSnapshot {
        provider: provider.id(),
        model: "claude-3-haiku-20240307".into(),
        temperature: 0.9,
        length: LengthOption::Short,
        plot: plot.into(),
    };
    let prompt = build_prompt(&PromptInputs {
        novel_settings: &novel_settings,
        chapter_arc_notes: &arc_notes,
        scene_plot: plot,
        length: snapshot.length,
        previous_content: &previous,
    });
    let result = provider.generate(&GenerationRequest {
        model: snapshot.model.clone(),
        prompt,
        system_prompt: String::new(),
        temperature: Some(snapshot.temperature),
    });
    let usage = result.usage;
    let text = result.outcome?;
    store.save_scene_content(novel, folder, scene, &text)?;
    store.save_scene_settings(novel, folder, scene, &snapshot.into_settings(usage))?;
    Ok(scene)
}

#[test]
fn novel_lifecycle_produces_expected_layout() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let store = NovelStore::new(temp.path().join("novels"));
    store.ensure_base()?;
    let provider = MockProvider::new([
        "Rain falls on the harbour.",
        "The ferry never arrives.",
        "A harbour town waits for a ferry that never comes.",
    ]);

    let novel = store.create_novel("Harbour: Lights?")?;
    assert_eq!(novel, "Harbour_Lights");
    store.save_novel_settings(
        &novel,
        &NovelSettings {
            novel_settings: "Quiet mystery, third person.".into(),
        },
    )?;
    let folder = store.create_chapter(&novel, "Arrival")?;
    assert_eq!(folder, "Chapter_001_Arrival");
    store.save_chapter_settings(
        &novel,
        &folder,
        &ChapterSettings {
            arc_notes: "Establish the harbour.".into(),
        },
    )?;

    assert_eq!(generate_scene(&store, &provider, &novel, &folder, "rain")?, 1);
    assert_eq!(generate_scene(&store, &provider, &novel, &folder, "ferry")?, 2);

    let chapter_dir = store.chapter_dir(&novel, &folder);
    assert_eq!(fs::read_to_string(chapter_dir.join("002.txt"))?, "The ferry never arrives.");
    assert!(chapter_dir.join("002_settings.json").is_file());
    let settings = store.load_scene_settings(&novel, &folder, 2);
    assert_eq!(settings.plot, "ferry");
    assert_eq!(settings.provider, Some(ProviderId::Anthropic));
    assert_eq!(settings.token_usage.total(), 42);

    let prompts = provider.prompts.lock().expect("mock mutex poisoned").clone();
    assert!(!prompts[0].contains("Rain falls"));
    assert!(prompts[0].contains("Quiet mystery"));
    assert!(prompts[1].contains("Rain falls on the harbour."));
    assert!(prompts[1].contains("Establish the harbour."));

    let content = store.all_novel_content(&novel);
    let first = content.find("Rain falls").expect("first scene in aggregate");
    let second = content.find("The ferry").expect("second scene in aggregate");
    assert!(first < second);

    let mut registry = ProviderRegistry::new();
    registry.insert(std::sync::Arc::new(MockProvider::new(Vec::<String>::new())));
    assert_eq!(registry.models(ProviderId::Anthropic).len(), 1);

    let summary = provider.generate(&GenerationRequest {
        model: "claude-3-haiku-20240307".into(),
        prompt: build_summary_prompt(&content),
        system_prompt: String::new(),
        temperature: None,
    });
    store.save_summary(&novel, &summary.outcome?)?;
    assert_eq!(
        store.load_summary(&novel),
        "A harbour town waits for a ferry that never comes."
    );
    provider.assert_empty();

    let renamed = store.rename_chapter(&novel, &folder, "Landfall")?;
    assert_eq!(renamed, "Chapter_001_Landfall");
    assert_eq!(store.load_scene_content(&novel, &renamed, 1), "Rain falls on the harbour.");

    store.delete_scene(&novel, &renamed, 1)?;
    assert_eq!(store.next_scene_number(&novel, &renamed), 3);
    let tree = store.list_tree();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].chapters[0].scenes, vec![2]);
    Ok(())
}
