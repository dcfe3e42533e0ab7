//! The analysis orchestrator.
//!
//! ```text
//! image ─▶ generate_tags ─▶ (empty? abort) ─▶ generate_summary ─▶ [review_summary] ─▶ record ─▶ history
//! ```
//!
//! The chain is strictly sequential. Any step failure aborts the analysis
//! and nothing is stored. A failed history write does not invalidate the
//! result; it is reported alongside it as a warning.

use chrono::{DateTime, Duration, Local, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::create_backend;
use crate::completion::StructuredCompletion;
use crate::config::Config;
use crate::error::{AnalysisError, HISTORY_NOTICE};
use crate::flows::summary::{describe_tags, generate_summary};
use crate::flows::tags::generate_tags;
use crate::flows::validation::review_summary;
use crate::history::{HistoryLog, JsonFileHistory};
use crate::image::ImageInput;
use crate::models::AnalysisRecord;

/// A finished analysis plus an optional history notice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub result: AnalysisRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_warning: Option<String>,
}

pub struct Analyzer {
    backend: Arc<dyn StructuredCompletion>,
    history: Arc<HistoryLog>,
    second_pass_validation: bool,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn StructuredCompletion>, history: Arc<HistoryLog>) -> Self {
        Self {
            backend,
            history,
            second_pass_validation: false,
        }
    }

    /// Also run the relevance validation step after summary generation.
    pub fn with_second_pass_validation(mut self, enabled: bool) -> Self {
        self.second_pass_validation = enabled;
        self
    }

    /// Build the configured backend and a JSON-file history log.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend: Arc<dyn StructuredCompletion> = Arc::from(create_backend(&config.model)?);
        let history = Arc::new(HistoryLog::new(
            Box::new(JsonFileHistory::new(&config.history.path)),
            config.history.capacity,
        ));
        Ok(Self::new(backend, history)
            .with_second_pass_validation(config.pipeline.second_pass_validation))
    }

    pub fn backend(&self) -> &dyn StructuredCompletion {
        self.backend.as_ref()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Run tags → summary on one image and record the result.
    pub async fn analyze(&self, image: &ImageInput) -> Result<AnalysisOutcome, AnalysisError> {
        info!(
            backend = self.backend.name(),
            media_type = image.media_type(),
            bytes = image.data().len(),
            "analysis started"
        );

        let tags = generate_tags(self.backend(), image).await.map_err(|e| {
            warn!(error = %e, "tag generation failed");
            AnalysisError::from(e)
        })?;
        if tags.is_empty() {
            warn!("tag generation returned no tags; aborting");
            return Err(AnalysisError::EmptyTags);
        }

        let mut summary = generate_summary(self.backend(), &tags, &describe_tags(&tags))
            .await
            .map_err(|e| {
                warn!(error = %e, "summary generation failed");
                AnalysisError::from(e)
            })?;

        if self.second_pass_validation {
            summary = review_summary(self.backend(), summary).await?;
        }

        let newest_id = match self.history.newest().await {
            Ok(newest) => newest.map(|r| r.id),
            Err(e) => {
                warn!(error = %e, "could not read history for id assignment");
                None
            }
        };

        let result = AnalysisRecord {
            id: next_record_id(Utc::now(), newest_id.as_deref()),
            image_url: image.to_data_uri(),
            tags: tags.into_vec(),
            short_summary: summary.short_summary,
            long_summary: Some(summary.long_summary),
            is_historical: summary.is_historical,
            analysis_date: Local::now().format("%Y-%m-%d").to_string(),
        };

        let history_warning = match self.history.append(&result).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "failed to save analysis to history");
                Some(HISTORY_NOTICE.to_string())
            }
        };

        info!(id = %result.id, is_historical = result.is_historical, "analysis finished");
        Ok(AnalysisOutcome {
            result,
            history_warning,
        })
    }
}

/// Timestamp id for a new record: `now`, or one millisecond past the
/// newest stored id when the clock has not moved beyond it.
pub fn next_record_id(now: DateTime<Utc>, newest: Option<&str>) -> String {
    let newest = newest
        .and_then(|id| DateTime::parse_from_rfc3339(id).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let id_time = match newest {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    };
    id_time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_is_millisecond_rfc3339() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(next_record_id(now, None), "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn id_moves_past_colliding_newest() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            next_record_id(now, Some("2024-05-01T10:00:00.000Z")),
            "2024-05-01T10:00:00.001Z"
        );
        assert_eq!(
            next_record_id(now, Some("2024-05-01T10:00:05.000Z")),
            "2024-05-01T10:00:05.001Z"
        );
        assert_eq!(
            next_record_id(now, Some("2024-05-01T09:59:59.000Z")),
            "2024-05-01T10:00:00.000Z"
        );
        assert_eq!(next_record_id(now, Some("garbage")), "2024-05-01T10:00:00.000Z");
    }
}
