//! Bounded recent-history log.
//!
//! The log keeps the most recent analyses, newest first, and evicts the
//! oldest once it holds more than its capacity (default
//! [`DEFAULT_CAPACITY`]). Image payloads are stripped before an entry is
//! stored.
//!
//! Storage sits behind the [`HistoryStore`] trait:
//!
//! - **[`JsonFileHistory`]**: a JSON array in a file.
//! - **[`InMemoryHistory`]**: a `Vec` behind a lock, for tests and embedding.
//!
//! Appends are a plain read-modify-write. Two concurrent writers may race
//! and one entry can be lost; the log is a convenience cache, not a system
//! of record.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::models::AnalysisRecord;

pub const DEFAULT_CAPACITY: usize = 5;

/// Maximum number of tag suggestions returned by [`suggest_tags`].
pub const MAX_SUGGESTIONS: usize = 10;

/// Raw persistence for the serialized log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Read all stored entries, newest first. A missing log is empty; a log
    /// that does not parse is [`PersistenceError::Corrupt`].
    async fn load(&self) -> Result<Vec<AnalysisRecord>, PersistenceError>;

    /// Replace the stored entries.
    async fn save(&self, entries: &[AnalysisRecord]) -> Result<(), PersistenceError>;
}

/// Insert `record` at the front and drop everything past `capacity`.
pub fn push_bounded(entries: &mut Vec<AnalysisRecord>, record: AnalysisRecord, capacity: usize) {
    entries.insert(0, record);
    entries.truncate(capacity);
}

/// A [`HistoryStore`] plus the capacity rule.
pub struct HistoryLog {
    store: Box<dyn HistoryStore>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(store: Box<dyn HistoryStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record (image payload stripped), evicting the oldest entries.
    pub async fn append(&self, record: &AnalysisRecord) -> Result<(), PersistenceError> {
        let mut entries = self.store.load().await?;
        push_bounded(&mut entries, record.without_image(), self.capacity);
        self.store.save(&entries).await?;
        debug!(id = %record.id, len = entries.len(), "history entry appended");
        Ok(())
    }

    /// Stored entries for display. A corrupt log lists as empty; appends
    /// still refuse to overwrite it.
    pub async fn entries(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
        match self.store.load().await {
            Err(PersistenceError::Corrupt(detail)) => {
                warn!(error = %detail, "history log is corrupt; listing it as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn newest(&self) -> Result<Option<AnalysisRecord>, PersistenceError> {
        Ok(self.entries().await?.into_iter().next())
    }

    pub async fn clear(&self) -> Result<(), PersistenceError> {
        self.store.save(&[]).await
    }
}

// ============ JSON file store ============

/// History stored as a pretty-printed JSON array.
///
/// A missing file reads as an empty log. A file that does not parse is
/// reported as corrupt and never overwritten by an append.
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistory {
    async fn load(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| PersistenceError::Corrupt(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, entries: &[AnalysisRecord]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

// ============ In-memory store ============

#[derive(Default)]
pub struct InMemoryHistory {
    entries: RwLock<Vec<AnalysisRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn load(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .map_err(|_| PersistenceError::Unavailable("history lock poisoned".to_string()))
    }

    async fn save(&self, entries: &[AnalysisRecord]) -> Result<(), PersistenceError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| PersistenceError::Unavailable("history lock poisoned".to_string()))?;
        *guard = entries.to_vec();
        Ok(())
    }
}

// ============ Queries ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "date-desc")]
    Newest,
    #[serde(alias = "date-asc")]
    Oldest,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" | "date-desc" => Ok(SortOrder::Newest),
            "oldest" | "date-asc" => Ok(SortOrder::Oldest),
            other => Err(format!(
                "unknown sort order '{}': expected newest or oldest",
                other
            )),
        }
    }
}

/// Filter and ordering applied to the history list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// Case-insensitive substring matched against every tag.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl HistoryQuery {
    pub fn apply(&self, entries: &[AnalysisRecord]) -> Vec<AnalysisRecord> {
        let mut items = match self.tag.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => filter_by_tag(entries, needle),
            _ => entries.to_vec(),
        };
        sort_by_date(&mut items, self.sort);
        items
    }
}

pub fn filter_by_tag(entries: &[AnalysisRecord], needle: &str) -> Vec<AnalysisRecord> {
    let needle = needle.to_lowercase();
    entries
        .iter()
        .filter(|e| e.tags.iter().any(|t| t.to_lowercase().contains(&needle)))
        .cloned()
        .collect()
}

/// Sort by the timestamp in each record's id. Stable for equal timestamps.
pub fn sort_by_date(entries: &mut [AnalysisRecord], order: SortOrder) {
    match order {
        SortOrder::Newest => entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp())),
        SortOrder::Oldest => entries.sort_by_key(|e| e.timestamp()),
    }
}

/// Distinct tags across all entries, sorted.
pub fn unique_tags(entries: &[AnalysisRecord]) -> Vec<String> {
    let mut tags: Vec<String> = entries.iter().flat_map(|e| e.tags.clone()).collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Up to [`MAX_SUGGESTIONS`] distinct tags containing `needle`
/// (case-insensitive); the first ones when `needle` is empty.
pub fn suggest_tags(entries: &[AnalysisRecord], needle: &str) -> Vec<String> {
    let needle = needle.trim().to_lowercase();
    unique_tags(entries)
        .into_iter()
        .filter(|t| needle.is_empty() || t.to_lowercase().contains(&needle))
        .take(MAX_SUGGESTIONS)
        .collect()
}
