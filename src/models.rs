//! Core data models used throughout Histify.
//!
//! These types flow through the analysis pipeline: tags from the tag step,
//! summaries from the summary steps, validation verdicts, and the records
//! kept in the recent-history log. JSON field names are camelCase to match
//! the presentation contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on the number of tags kept from the tag step.
pub const MAX_TAGS: usize = 4;

/// Replacement short summary when the self-review gate rejects a
/// tentatively historical result.
pub const SELF_REVIEW_FALLBACK: &str = "The image was analyzed, but a specific historical focus on a location, architecture, statue, or artifact could not be established.";

/// Replacement summary when the validation step finds the summary off-topic.
pub const IRRELEVANT_SUMMARY: &str =
    "Summary is not relevant as it does not focus on location, architecture, statue, or artifact.";

/// Ordered tags, at most [`MAX_TAGS`] long.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    /// Build a tag set from raw model output.
    ///
    /// Tags are trimmed; empty tags and case-insensitive duplicates are
    /// dropped; the first [`MAX_TAGS`] survivors are kept in order.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = Vec::with_capacity(MAX_TAGS);
        for tag in raw {
            if tags.len() == MAX_TAGS {
                break;
            }
            let tag = tag.as_ref().trim();
            if tag.is_empty() {
                continue;
            }
            let folded = tag.to_lowercase();
            if tags.iter().any(|t| t.to_lowercase() == folded) {
                continue;
            }
            tags.push(tag.to_string());
        }
        Self(tags)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Comma-joined form used when substituting tags into prompt text.
    pub fn joined(&self) -> String {
        self.0.join(", ")
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Output of both summary steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub short_summary: String,
    pub long_summary: String,
    pub is_historical: bool,
}

impl SummaryResult {
    /// The result the self-review gate substitutes for a rejected summary.
    pub fn fallback() -> Self {
        Self {
            short_summary: SELF_REVIEW_FALLBACK.to_string(),
            long_summary: String::new(),
            is_historical: false,
        }
    }

    /// Enforce the result invariants. A non-historical result has an empty
    /// long summary and a non-empty short summary; a historical result
    /// whose short summary names no subject becomes [`Self::fallback`].
    pub fn normalized(mut self) -> Self {
        self.short_summary = self.short_summary.trim().to_string();
        if self.is_historical && is_known_non_subject(&self.short_summary) {
            return Self::fallback();
        }
        if !self.is_historical {
            self.long_summary.clear();
            if self.short_summary.is_empty() {
                self.short_summary = SELF_REVIEW_FALLBACK.to_string();
            }
        }
        self
    }
}

/// Short summaries that can never count as discussing a concrete subject.
pub fn is_known_non_subject(short_summary: &str) -> bool {
    let s = short_summary.trim();
    s.is_empty() || s == IRRELEVANT_SUMMARY || s == SELF_REVIEW_FALLBACK
}

/// Verdict of the relevance validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub validated_summary: String,
}

/// One completed analysis, as shown to the user and stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// RFC 3339 timestamp of the analysis; unique within the history log.
    pub id: String,
    /// Data URI of the analysed image. Empty once stored in history.
    pub image_url: String,
    pub tags: Vec<String>,
    pub short_summary: String,
    #[serde(default)]
    pub long_summary: Option<String>,
    pub is_historical: bool,
    pub analysis_date: String,
}

impl AnalysisRecord {
    /// Copy of the record with the image payload dropped, for persistence.
    pub fn without_image(&self) -> Self {
        Self {
            image_url: String::new(),
            ..self.clone()
        }
    }

    /// Timestamp parsed from the id, if the id is a valid RFC 3339 string.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.id)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
