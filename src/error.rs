//! Error taxonomy for the analysis pipeline.
//!
//! Step-level failures ([`CompletionError`]) bubble up through the flows
//! into [`AnalysisError`]. History writes fail with [`PersistenceError`],
//! which the orchestrator downgrades to a warning.

use thiserror::Error;

/// Failure of a single structured model call. Terminal for that call.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// The model answered, but not in the declared output shape.
    #[error("{prompt}: response does not match output schema: {message}")]
    SchemaValidation { prompt: String, message: String },

    /// Transport, quota, timeout, or provider-side failure.
    #[error("{prompt}: model invocation failed: {message}")]
    ModelInvocation { prompt: String, message: String },
}

impl CompletionError {
    pub fn schema(prompt: &str, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            prompt: prompt.to_string(),
            message: message.into(),
        }
    }

    pub fn invocation(prompt: &str, message: impl Into<String>) -> Self {
        Self::ModelInvocation {
            prompt: prompt.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Tag generation produced nothing usable; no summary was requested.
    #[error("tag generation produced no usable tags")]
    EmptyTags,

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

impl AnalysisError {
    /// Notice shown to the user, matching the wording of the upload page.
    pub fn user_notice(&self) -> &'static str {
        match self {
            AnalysisError::EmptyTags => {
                "Analysis Incomplete: Could not generate tags for the image."
            }
            AnalysisError::InvalidImage(_) => {
                "Invalid File Type: Please upload an image file (e.g., JPG, PNG, GIF)."
            }
            AnalysisError::Completion(_) => {
                "Analysis Error: An error occurred during image analysis. Please try again."
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The stored log exists but does not parse. It is left as is.
    #[error("history file is corrupt: {0}")]
    Corrupt(String),

    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

pub const HISTORY_NOTICE: &str =
    "History Error: Could not save to history. Storage might be full or unavailable.";
