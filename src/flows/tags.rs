//! Tag generation: up to four tags naming the historic subject matter of
//! a photo, ignoring people and animals.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::completion::{call_prompt, PromptTemplate, StructuredCompletion};
use crate::error::CompletionError;
use crate::image::ImageInput;
use crate::models::TagSet;

pub const PROMPT_NAME: &str = "generateTags";

const TEMPLATE: &str = "\
You generate tags for photos. Your goal is to identify and tag historic locations, \
landmarks, architecture, buildings, statues, and other significant historic symbols.

CRITICAL INSTRUCTIONS:
- IGNORE PEOPLE AND ANIMALS. Do not tag any person or animal in the photo. Look only at \
the background, the surrounding location, the architecture, historical artifacts, and \
significant objects.

Look for:
  - Historic locations and landmarks: famous sites, ruins, and other places of historical significance.
  - Important architecture: notable buildings, monuments, statues, and structures with historical relevance.
  - Historic symbols: recognizable symbols tied to historical events or movements.

Prefer specific, informative tags over generic ones. Return at most the 4 best tags.

Image: {{media url=photoDataUri}}

Tags: ";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TagRequest {
    photo_data_uri: String,
}

#[derive(Debug, Deserialize)]
struct TagResponse {
    tags: Vec<String>,
}

pub fn prompt() -> PromptTemplate {
    PromptTemplate {
        name: PROMPT_NAME,
        template: TEMPLATE,
        input_schema: json!({
            "type": "object",
            "properties": {
                "photoDataUri": {
                    "type": "string",
                    "description": "Photo as a data URI: data:<mimetype>;base64,<encoded_data>."
                }
            },
            "required": ["photoDataUri"]
        }),
        output_schema: json!({
            "type": "object",
            "properties": {
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Up to 4 tags for the image."
                }
            },
            "required": ["tags"]
        }),
    }
}

/// Generate at most [`MAX_TAGS`](crate::models::MAX_TAGS) tags for an image.
///
/// The model's choice of tags is not checked; only the shape is: tags are
/// trimmed, deduplicated, and capped. An empty result is not an error here.
pub async fn generate_tags(
    backend: &dyn StructuredCompletion,
    image: &ImageInput,
) -> Result<TagSet, CompletionError> {
    let request = TagRequest {
        photo_data_uri: image.to_data_uri(),
    };
    let response: TagResponse = call_prompt(backend, &prompt(), &request).await?;
    let raw_count = response.tags.len();
    let tags = TagSet::from_raw(response.tags);
    info!(raw = raw_count, kept = tags.len(), "tags generated");
    Ok(tags)
}
