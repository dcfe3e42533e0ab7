//! Relevance validation: does a short summary actually discuss a location,
//! architecture, statue, or artifact?
//!
//! | isHistorical | discusses subject | isValid | validatedSummary |
//! |---|---|---|---|
//! | false | (not asked) | false | input summary |
//! | true | yes | true | input summary |
//! | true | no | false | [`IRRELEVANT_SUMMARY`] |
//!
//! The model is only consulted for the middle column, and only when
//! `isHistorical` is true. The table itself is applied here, so the step
//! is idempotent on its own output.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::completion::{call_prompt, PromptTemplate, StructuredCompletion};
use crate::error::CompletionError;
use crate::models::{is_known_non_subject, SummaryResult, ValidationResult, IRRELEVANT_SUMMARY};

pub const PROMPT_NAME: &str = "validateHistoricalRelevance";

const TEMPLATE: &str = "\
You validate the historical relevance of a summary.

Instructions:
- If isHistorical is false, return isValid as false and validatedSummary as the input shortSummary.
- If isHistorical is true, check whether the shortSummary discusses a location, architecture, statue, or artifact.
- If it does, return isValid as true and validatedSummary as the input shortSummary.
- If it does not, return isValid as false and validatedSummary as \
\"Summary is not relevant as it does not focus on location, architecture, statue, or artifact.\"

Input:
shortSummary: {{{shortSummary}}}
isHistorical: {{{isHistorical}}}
";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationRequest<'a> {
    short_summary: &'a str,
    is_historical: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelevanceVerdict {
    is_valid: bool,
}

pub fn prompt() -> PromptTemplate {
    PromptTemplate {
        name: PROMPT_NAME,
        template: TEMPLATE,
        input_schema: json!({
            "type": "object",
            "properties": {
                "shortSummary": { "type": "string", "description": "Short summary of the image." },
                "isHistorical": { "type": "boolean", "description": "Whether the image is considered historical." }
            },
            "required": ["shortSummary", "isHistorical"]
        }),
        output_schema: json!({
            "type": "object",
            "properties": {
                "isValid": {
                    "type": "boolean",
                    "description": "Whether the summary is valid based on historical relevance."
                },
                "validatedSummary": {
                    "type": "string",
                    "description": "The validated summary or a message indicating irrelevance."
                }
            },
            "required": ["isValid", "validatedSummary"]
        }),
    }
}

/// Apply the decision table given the relevance judgement.
pub fn decide(short_summary: &str, is_historical: bool, discusses_subject: bool) -> ValidationResult {
    match (is_historical, discusses_subject) {
        (false, _) => ValidationResult {
            is_valid: false,
            validated_summary: short_summary.to_string(),
        },
        (true, true) => ValidationResult {
            is_valid: true,
            validated_summary: short_summary.to_string(),
        },
        (true, false) => ValidationResult {
            is_valid: false,
            validated_summary: IRRELEVANT_SUMMARY.to_string(),
        },
    }
}


pub async fn validate_relevance(
    backend: &dyn StructuredCompletion,
    short_summary: &str,
    is_historical: bool,
) -> Result<ValidationResult, CompletionError> {
    if !is_historical {
        debug!("summary not historical; validation passes it through");
        return Ok(decide(short_summary, false, false));
    }
    if is_known_non_subject(short_summary) {
        return Ok(decide(short_summary, true, false));
    }

    let request = ValidationRequest {
        short_summary,
        is_historical,
    };
    let verdict: RelevanceVerdict = call_prompt(backend, &prompt(), &request).await?;
    let result = decide(short_summary, true, verdict.is_valid);
    info!(is_valid = result.is_valid, "summary relevance validated");
    Ok(result)
}

/// The self-review gate applied in code: a tentatively historical summary
/// that failed validation becomes the fixed fallback result.
pub fn apply_relevance(summary: SummaryResult, validation: &ValidationResult) -> SummaryResult {
    if summary.is_historical && !validation.is_valid {
        SummaryResult::fallback()
    } else {
        summary.normalized()
    }
}

/// Second-pass guard: validate a summary and apply the gate.
pub async fn review_summary(
    backend: &dyn StructuredCompletion,
    summary: SummaryResult,
) -> Result<SummaryResult, CompletionError> {
    let validation =
        validate_relevance(backend, &summary.short_summary, summary.is_historical).await?;
    Ok(apply_relevance(summary, &validation))
}
