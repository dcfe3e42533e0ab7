//! End-to-end tests for the analysis pipeline.
//!
//! A scripted `StructuredCompletion` stands in for the model, returning
//! canned JSON per prompt, so every scenario runs the real orchestration,
//! schema checks, and history log.

use async_trait::async_trait;
use histify::analyze::Analyzer;
use histify::completion::{RenderedPrompt, StructuredCompletion};
use histify::error::{AnalysisError, CompletionError, PersistenceError, HISTORY_NOTICE};
use histify::flows::{extended_summary, summary, tags, validation};
use histify::history::{HistoryLog, HistoryStore, InMemoryHistory, JsonFileHistory};
use histify::image::ImageInput;
use histify::models::{AnalysisRecord, IRRELEVANT_SUMMARY, SELF_REVIEW_FALLBACK};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ─── Scripted model ─────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedModel {
    script: Mutex<HashMap<&'static str, Vec<Result<Value, CompletionError>>>>,
    prompts: Mutex<Vec<RenderedPrompt>>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self::default()
    }

    fn on(self, prompt: &'static str, response: Value) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(prompt)
            .or_default()
            .push(Ok(response));
        self
    }

    fn failing(self, prompt: &'static str, err: CompletionError) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(prompt)
            .or_default()
            .push(Err(err));
        self
    }

    fn prompts_named(&self, name: &str) -> Vec<RenderedPrompt> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StructuredCompletion for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Value, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let mut script = self.script.lock().unwrap();
        match script.get_mut(prompt.name.as_str()) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Err(CompletionError::invocation(&prompt.name, "unscripted prompt")),
        }
    }
}

/// A store whose writes always fail, as with a full disk.
struct ReadOnlyStore;

#[async_trait]
impl HistoryStore for ReadOnlyStore {
    async fn load(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn save(&self, _entries: &[AnalysisRecord]) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("quota exceeded".to_string()))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn photo() -> ImageInput {
    ImageInput::new("image/png", vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap()
}

fn memory_log() -> Arc<HistoryLog> {
    Arc::new(HistoryLog::new(Box::new(InMemoryHistory::new()), 5))
}

fn analyzer(model: Arc<ScriptedModel>, history: Arc<HistoryLog>) -> Analyzer {
    Analyzer::new(model, history)
}

fn eiffel_summary() -> Value {
    json!({
        "shortSummary": "The Eiffel Tower, completed in 1889, is the iron lattice landmark of Paris.",
        "longSummary": "Designed by Gustave Eiffel's company for the 1889 Exposition Universelle, the tower was the tallest man-made structure in the world until 1930.",
        "isHistorical": true
    })
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn historical_landmark_is_summarized_and_stored() {
    let model = Arc::new(
        ScriptedModel::new()
            .on(
                tags::PROMPT_NAME,
                json!({ "tags": ["Eiffel Tower", "Iron Lattice Architecture"] }),
            )
            .on(summary::PROMPT_NAME, eiffel_summary()),
    );
    let history = memory_log();

    let outcome = analyzer(model.clone(), history.clone())
        .analyze(&photo())
        .await
        .unwrap();

    let result = &outcome.result;
    assert_eq!(result.tags, ["Eiffel Tower", "Iron Lattice Architecture"]);
    assert!(result.is_historical);
    assert!(result.short_summary.contains("Eiffel Tower"));
    assert!(!result.long_summary.as_deref().unwrap_or("").is_empty());
    assert!(result.image_url.starts_with("data:image/png;base64,"));
    assert!(outcome.history_warning.is_none());

    let stored = history.entries().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, result.id);
    assert_eq!(stored[0].tags, result.tags);
    assert_eq!(stored[0].short_summary, result.short_summary);
    assert_eq!(stored[0].image_url, "");

    let summary_prompt = &model.prompts_named(summary::PROMPT_NAME)[0];
    assert!(summary_prompt
        .text
        .contains("Description: Image with tags: Eiffel Tower, Iron Lattice Architecture"));
}

#[tokio::test]
async fn people_only_photo_is_not_historical() {
    let model = Arc::new(
        ScriptedModel::new()
            .on(tags::PROMPT_NAME, json!({ "tags": ["portrait", "smiling person"] }))
            .on(
                summary::PROMPT_NAME,
                json!({
                    "shortSummary": SELF_REVIEW_FALLBACK,
                    "longSummary": "A cheerful person posing for the camera.",
                    "isHistorical": false
                }),
            ),
    );

    let outcome = analyzer(model, memory_log())
        .analyze(&photo())
        .await
        .unwrap();

    assert!(!outcome.result.is_historical);
    assert_eq!(outcome.result.long_summary.as_deref(), Some(""));
    assert_eq!(outcome.result.short_summary, SELF_REVIEW_FALLBACK);
}

#[tokio::test]
async fn empty_tags_abort_without_a_record() {
    let model = Arc::new(ScriptedModel::new().on(tags::PROMPT_NAME, json!({ "tags": [] })));
    let history = memory_log();

    let err = analyzer(model.clone(), history.clone())
        .analyze(&photo())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::EmptyTags));
    assert!(err.user_notice().starts_with("Analysis Incomplete"));
    assert!(history.entries().await.unwrap().is_empty());
    assert!(model.prompts_named(summary::PROMPT_NAME).is_empty());
}

#[tokio::test]
async fn whitespace_only_tags_count_as_empty() {
    let model = Arc::new(ScriptedModel::new().on(tags::PROMPT_NAME, json!({ "tags": ["  ", ""] })));
    let err = analyzer(model, memory_log())
        .analyze(&photo())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::EmptyTags));
}

#[tokio::test]
async fn off_topic_summary_fails_validation() {
    let model = ScriptedModel::new().on(
        validation::PROMPT_NAME,
        json!({ "isValid": false, "validatedSummary": "" }),
    );
    let result = validation::validate_relevance(&model, "A lovely sunny day", true)
        .await
        .unwrap();
    assert!(!result.is_valid);
    assert_eq!(
        result.validated_summary,
        "Summary is not relevant as it does not focus on location, architecture, statue, or artifact."
    );
    assert_eq!(result.validated_summary, IRRELEVANT_SUMMARY);
}

// ─── Failure handling ───────────────────────────────────────────────

#[tokio::test]
async fn summary_failure_is_an_analysis_error_and_stores_nothing() {
    let model = Arc::new(
        ScriptedModel::new()
            .on(tags::PROMPT_NAME, json!({ "tags": ["Colosseum"] }))
            .failing(
                summary::PROMPT_NAME,
                CompletionError::invocation(summary::PROMPT_NAME, "timed out"),
            ),
    );
    let history = memory_log();

    let err = analyzer(model, history.clone())
        .analyze(&photo())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Completion(CompletionError::ModelInvocation { .. })
    ));
    assert!(err.user_notice().starts_with("Analysis Error"));
    assert!(history.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_tag_response_is_a_schema_error() {
    let model = Arc::new(ScriptedModel::new().on(tags::PROMPT_NAME, json!({ "labels": ["x"] })));
    let err = analyzer(model, memory_log())
        .analyze(&photo())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Completion(CompletionError::SchemaValidation { .. })
    ));
}

#[tokio::test]
async fn history_write_failure_keeps_the_result() {
    let model = Arc::new(
        ScriptedModel::new()
            .on(tags::PROMPT_NAME, json!({ "tags": ["Eiffel Tower"] }))
            .on(summary::PROMPT_NAME, eiffel_summary()),
    );
    let history = Arc::new(HistoryLog::new(Box::new(ReadOnlyStore), 5));

    let outcome = analyzer(model, history).analyze(&photo()).await.unwrap();
    assert!(outcome.result.is_historical);
    assert_eq!(outcome.history_warning.as_deref(), Some(HISTORY_NOTICE));
}

#[tokio::test]
async fn corrupt_history_file_is_kept_and_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("history.json");
    let corrupt = r#"[{"id":"2024-05-01T10:00:00.000Z", truncated"#;
    std::fs::write(&path, corrupt).unwrap();

    let model = Arc::new(
        ScriptedModel::new()
            .on(tags::PROMPT_NAME, json!({ "tags": ["Eiffel Tower"] }))
            .on(summary::PROMPT_NAME, eiffel_summary()),
    );
    let history = Arc::new(HistoryLog::new(Box::new(JsonFileHistory::new(&path)), 5));

    let outcome = analyzer(model, history).analyze(&photo()).await.unwrap();
    assert!(outcome.result.is_historical);
    assert_eq!(outcome.history_warning.as_deref(), Some(HISTORY_NOTICE));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), corrupt);
}

// ─── Second-pass validation ─────────────────────────────────────────

#[tokio::test]
async fn second_pass_downgrades_vague_historical_summary() {
    let model = Arc::new(
        ScriptedModel::new()
            .on(tags::PROMPT_NAME, json!({ "tags": ["old street"] }))
            .on(
                summary::PROMPT_NAME,
                json!({
                    "shortSummary": "A charming scene full of atmosphere.",
                    "longSummary": "People stroll by on a warm evening.",
                    "isHistorical": true
                }),
            )
            .on(
                validation::PROMPT_NAME,
                json!({ "isValid": false, "validatedSummary": IRRELEVANT_SUMMARY }),
            ),
    );

    let outcome = analyzer(model, memory_log())
        .with_second_pass_validation(true)
        .analyze(&photo())
        .await
        .unwrap();

    assert!(!outcome.result.is_historical);
    assert_eq!(outcome.result.short_summary, SELF_REVIEW_FALLBACK);
    assert_eq!(outcome.result.long_summary.as_deref(), Some(""));
}

#[tokio::test]
async fn second_pass_is_skipped_by_default() {
    let model = Arc::new(
        ScriptedModel::new()
            .on(tags::PROMPT_NAME, json!({ "tags": ["Eiffel Tower"] }))
            .on(summary::PROMPT_NAME, eiffel_summary()),
    );
    analyzer(model.clone(), memory_log())
        .analyze(&photo())
        .await
        .unwrap();
    assert!(model.prompts_named(validation::PROMPT_NAME).is_empty());
}

// ─── History log ────────────────────────────────────────────────────

#[tokio::test]
async fn sixth_analysis_evicts_the_oldest() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("history.json");
    let history = Arc::new(HistoryLog::new(Box::new(JsonFileHistory::new(&path)), 5));

    let mut model = ScriptedModel::new();
    for i in 0..6 {
        model = model
            .on(tags::PROMPT_NAME, json!({ "tags": [format!("Landmark {}", i)] }))
            .on(summary::PROMPT_NAME, eiffel_summary());
    }
    let analyzer = analyzer(Arc::new(model), history.clone());

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(analyzer.analyze(&photo()).await.unwrap().result.id);
    }

    let stored = history.entries().await.unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored[0].tags, ["Landmark 5"]);
    assert_eq!(stored[4].tags, ["Landmark 1"]);
    assert!(stored.iter().all(|e| e.id != ids[0]));

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 6, "record ids must be unique");
}

// ─── Extended summary ───────────────────────────────────────────────

#[tokio::test]
async fn extended_summary_enforces_empty_long_summary() {
    let model = ScriptedModel::new().on(
        extended_summary::PROMPT_NAME,
        json!({
            "shortSummary": "No location of importance or historical significance was found.",
            "longSummary": "stray text",
            "isHistorical": false
        }),
    );
    let result = extended_summary::generate_extended_summary(&model, "A red sports car")
        .await
        .unwrap();
    assert!(!result.is_historical);
    assert_eq!(result.long_summary, "");
}
