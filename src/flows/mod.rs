//! The four prompt flows of the analysis pipeline.
//!
//! Each flow is a typed async function over a [`StructuredCompletion`]
//! backend with a fixed [`PromptTemplate`]:
//!
//! | Flow | Input | Output |
//! |------|-------|--------|
//! | [`tags::generate_tags`] | image | [`TagSet`](crate::models::TagSet) |
//! | [`summary::generate_summary`] | tags + description | [`SummaryResult`](crate::models::SummaryResult) |
//! | [`extended_summary::generate_extended_summary`] | image description | [`SummaryResult`](crate::models::SummaryResult) |
//! | [`validation::validate_relevance`] | short summary + historicity | [`ValidationResult`](crate::models::ValidationResult) |
//!
//! [`StructuredCompletion`]: crate::completion::StructuredCompletion
//! [`PromptTemplate`]: crate::completion::PromptTemplate

pub mod extended_summary;
pub mod summary;
pub mod tags;
pub mod validation;

use serde_json::{json, Value};

/// Output schema shared by both summary flows.
pub(crate) fn summary_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "shortSummary": {
                "type": "string",
                "description": "One or two sentences on the historical significance, or a statement that none was found."
            },
            "longSummary": {
                "type": "string",
                "description": "Detailed historical context when historical, otherwise an empty string."
            },
            "isHistorical": {
                "type": "boolean",
                "description": "True when the image shows a historically significant location, architecture, statue, or artifact."
            }
        },
        "required": ["shortSummary", "longSummary", "isHistorical"]
    })
}
