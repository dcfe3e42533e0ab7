//! Summary generation from tags and a short description.
//!
//! The prompt carries the full decision policy, including the self-review
//! gate that downgrades a historical verdict whose short summary never
//! names a concrete location, landmark, architecture, statue, or artifact.
//! The returned result is normalized so a non-historical summary always
//! has an empty long summary.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::completion::{call_prompt, PromptTemplate, StructuredCompletion};
use crate::error::CompletionError;
use crate::models::{SummaryResult, TagSet};

pub const PROMPT_NAME: &str = "generateHistoricalSummary";

const TEMPLATE: &str = "\
You identify the historical significance of photos.

CRITICAL INSTRUCTIONS:
* IGNORE PEOPLE AND ANIMALS. They are irrelevant to this analysis. Look only at the \
background, the surrounding location, architecture, historical artifacts, and significant objects.
* Base the assessment on credible historical information, not opinion or speculation.
* Portraits, paintings, close shots of people or animals, photos of modern objects (cars, \
technology), and landscapes without clear historical elements have no historical importance.
* Keep the summary unbiased and free of assumptions or stereotypes.

Steps:
1. Decide whether the photo shows a discernible historical landmark, location, or specific \
architectural element.
2. If it does, set isHistorical to true, write a shortSummary of 1-2 sentences giving a \
high-level overview of the historical significance, and write a longSummary with more detail \
about the identified elements.
3. If it does not, set isHistorical to false, write a shortSummary of at most 2 sentences \
saying that no location of importance or historical significance was found, and set \
longSummary to an empty string.
4. Self-review: reread your shortSummary. If isHistorical is true but the shortSummary does \
not clearly discuss a specific historical location, landmark, architecture, statue, or \
artifact, set isHistorical to false, set shortSummary to exactly \
\"The image was analyzed, but a specific historical focus on a location, architecture, statue, or artifact could not be established.\" \
and set longSummary to an empty string.
5. Final review: correct any grammatical errors in both summaries.

Primary information about the photo:

Tags: {{{tags}}}
Description: {{{description}}}

Answer in JSON.";

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    tags: &'a [String],
    description: &'a str,
}

pub fn prompt() -> PromptTemplate {
    PromptTemplate {
        name: PROMPT_NAME,
        template: TEMPLATE,
        input_schema: json!({
            "type": "object",
            "properties": {
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags generated for the image."
                },
                "description": {
                    "type": "string",
                    "description": "Description of the image."
                }
            },
            "required": ["tags", "description"]
        }),
        output_schema: super::summary_output_schema(),
    }
}

/// Description used by the orchestrator when only tags are known.
pub fn describe_tags(tags: &TagSet) -> String {
    format!("Image with tags: {}", tags.joined())
}

pub async fn generate_summary(
    backend: &dyn StructuredCompletion,
    tags: &TagSet,
    description: &str,
) -> Result<SummaryResult, CompletionError> {
    let request = SummaryRequest {
        tags: tags.as_slice(),
        description,
    };
    let summary: SummaryResult = call_prompt(backend, &prompt(), &request).await?;
    let summary = summary.normalized();
    info!(is_historical = summary.is_historical, "summary generated");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::CannedCompletion;

    #[tokio::test]
    async fn renders_tags_comma_joined() {
        let tags = TagSet::from_raw(["Eiffel Tower", "Iron Lattice Architecture"]);
        let backend = CannedCompletion::new().respond(
            PROMPT_NAME,
            json!({
                "shortSummary": "The Eiffel Tower is an 1889 landmark in Paris.",
                "longSummary": "Built for the Exposition Universelle.",
                "isHistorical": true
            }),
        );
        let summary = generate_summary(&backend, &tags, &describe_tags(&tags))
            .await
            .unwrap();
        assert!(summary.is_historical);

        let calls = backend.calls.lock().unwrap();
        assert!(calls[0]
            .text
            .contains("Tags: Eiffel Tower, Iron Lattice Architecture\n"));
        assert!(calls[0]
            .text
            .contains("Description: Image with tags: Eiffel Tower, Iron Lattice Architecture"));
        assert!(calls[0].media.is_empty());
    }

    #[tokio::test]
    async fn non_historical_result_gets_empty_long_summary() {
        let tags = TagSet::from_raw(["portrait"]);
        let backend = CannedCompletion::new().respond(
            PROMPT_NAME,
            json!({
                "shortSummary": "No location of importance or historical significance was found in the image.",
                "longSummary": "The person is smiling.",
                "isHistorical": false
            }),
        );
        let summary = generate_summary(&backend, &tags, "Image with tags: portrait")
            .await
            .unwrap();
        assert!(!summary.is_historical);
        assert_eq!(summary.long_summary, "");
    }

    #[tokio::test]
    async fn missing_is_historical_is_a_schema_error() {
        let backend = CannedCompletion::new().respond(
            PROMPT_NAME,
            json!({ "shortSummary": "x", "longSummary": "" }),
        );
        let err = generate_summary(&backend, &TagSet::from_raw(["a"]), "d")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::SchemaValidation { .. }));
    }

    #[test]
    fn prompt_carries_the_exact_fallback_text() {
        assert!(TEMPLATE.contains(crate::models::SELF_REVIEW_FALLBACK));
    }

    #[tokio::test]
    async fn historical_without_subject_becomes_fallback() {
        let tags = TagSet::from_raw(["old street"]);
        for short in ["", crate::models::SELF_REVIEW_FALLBACK] {
            let backend = CannedCompletion::new().respond(
                PROMPT_NAME,
                json!({
                    "shortSummary": short,
                    "longSummary": "long text",
                    "isHistorical": true
                }),
            );
            let summary = generate_summary(&backend, &tags, &describe_tags(&tags))
                .await
                .unwrap();
            assert_eq!(summary, SummaryResult::fallback());
        }
    }
}
