//! Summary generation driven directly by a free-text image description.
//!
//! Same output contract and decision policy as
//! [`summary`](super::summary); used when a caller already has a
//! description and no image or tags.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::completion::{call_prompt, PromptTemplate, StructuredCompletion};
use crate::error::CompletionError;
use crate::models::SummaryResult;

pub const PROMPT_NAME: &str = "generateExtendedHistoricalSummary";

const TEMPLATE: &str = "\
You are an expert in image analysis and historical interpretation.

Read the image description below and decide whether the image contains elements of \
historical significance such as locations, landmarks, specific architectural styles, or \
historically significant artifacts and objects.

CRITICAL INSTRUCTIONS:
- IGNORE PEOPLE AND ANIMALS. Do not consider any person or animal for the historical \
analysis. Focus on the environment: background, surrounding locations, architecture, \
historical artifacts, and significant objects.
- Portraits, paintings, close shots of people or animals, photos of modern objects (cars, \
technology), and landscapes without clear historical elements have no historical importance.

Follow these steps strictly:
1. Assess historicity: does the description depict a historical location, landmark, specific \
architectural style, or historically significant artifact or object?
2. If it does not: set isHistorical to false; shortSummary is at most 2 sentences saying that \
no location of importance or historical significance was found; longSummary is an empty string.
3. If it does: set isHistorical to true; shortSummary is 1-2 sentences giving a high-level \
overview of the historical significance; longSummary gives additional context about the \
historical elements.
4. Self-review: reread your shortSummary. If isHistorical is true but the shortSummary does \
not clearly discuss a specific historical location, landmark, architecture, statue, or \
artifact, set isHistorical to false, set shortSummary to exactly \
\"The image was analyzed, but a specific historical focus on a location, architecture, statue, or artifact could not be established.\" \
and make sure longSummary is empty.
5. Make both summaries grammatically correct and clearly written.
6. Neither summary may consider or show bias toward any person or animal in the image.

Image Description: {{{imageDescription}}}
";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtendedSummaryRequest<'a> {
    image_description: &'a str,
}

pub fn prompt() -> PromptTemplate {
    PromptTemplate {
        name: PROMPT_NAME,
        template: TEMPLATE,
        input_schema: json!({
            "type": "object",
            "properties": {
                "imageDescription": {
                    "type": "string",
                    "description": "Description of the image content, focusing on historical aspects."
                }
            },
            "required": ["imageDescription"]
        }),
        output_schema: super::summary_output_schema(),
    }
}

pub async fn generate_extended_summary(
    backend: &dyn StructuredCompletion,
    image_description: &str,
) -> Result<SummaryResult, CompletionError> {
    let request = ExtendedSummaryRequest { image_description };
    let summary: SummaryResult = call_prompt(backend, &prompt(), &request).await?;
    let summary = summary.normalized();
    info!(is_historical = summary.is_historical, "extended summary generated");
    Ok(summary)
}
