//! Dataset catalogue and curation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Processing state of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    /// Uploaded, not yet curated.
    #[default]
    Raw,
    /// A curation job is running.
    Curating,
    /// Curated and usable for training.
    Ready,
    /// Curation failed.
    Failed,
    /// Hidden from listings.
    Archived,
}

/// A video dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Server id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Processing state.
    #[serde(default)]
    pub status: DatasetStatus,
    /// Number of clips.
    #[serde(default)]
    pub video_count: u64,
    /// Total size on disk.
    #[serde(default)]
    pub size_bytes: u64,
    /// Labels used for search.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a dataset create or update call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDraft {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels used for search.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where the raw clips live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl DatasetDraft {
    /// Draft with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Checks the draft before it is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::invalid("name", "must not be empty"));
        }
        Ok(())
    }
}

/// Listing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetQuery {
    /// 1-based page.
    pub page: Option<u32>,
    /// Items per page.
    pub page_size: Option<u32>,
    /// Free-text search.
    pub search: Option<String>,
    /// Status filter.
    pub status: Option<DatasetStatus>,
}

impl DatasetQuery {
    /// Query pairs in wire form.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("pageSize".to_string(), size.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search".to_string(), search.to_string()));
        }
        if let Some(status) = self.status {
            // serde_json renders unit variants as quoted strings
            let value = serde_json::to_value(status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string));
            if let Some(value) = value {
                pairs.push(("status".to_string(), value));
            }
        }
        pairs
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total items across pages.
    #[serde(default)]
    pub total: u64,
    /// 1-based page number.
    #[serde(default = "first_page")]
    pub page: u32,
    /// Items per page.
    #[serde(default)]
    pub page_size: u32,
}

const fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    /// Whether more pages follow this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        let seen = u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
            + self.items.len() as u64;
        seen < self.total
    }
}

/// Filters applied by a curation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationFilters {
    /// Drop clips shorter than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration_secs: Option<f64>,
    /// Drop clips longer than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<f64>,
    /// Minimum aesthetic score in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f64>,
    /// Remove near-duplicate clips.
    #[serde(default)]
    pub deduplicate: bool,
    /// Run the safety classifier over the clips.
    #[serde(default)]
    pub safety_filter: bool,
}

impl Default for CurationFilters {
    fn default() -> Self {
        Self {
            min_duration_secs: None,
            max_duration_secs: None,
            min_quality: None,
            deduplicate: true,
            safety_filter: true,
        }
    }
}

impl CurationFilters {
    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns an error for negative durations, an inverted range, or a
    /// quality outside [0, 1].
    pub fn validate(&self) -> DomainResult<()> {
        if self.min_duration_secs.is_some_and(|d| d < 0.0) {
            return Err(DomainError::invalid("minDurationSecs", "must not be negative"));
        }
        if let (Some(min), Some(max)) = (self.min_duration_secs, self.max_duration_secs)
            && min > max
        {
            return Err(DomainError::invalid(
                "maxDurationSecs",
                "must not be below minDurationSecs",
            ));
        }
        if self.min_quality.is_some_and(|q| !(0.0..=1.0).contains(&q)) {
            return Err(DomainError::invalid("minQuality", "must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Handle for a submitted curation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationJob {
    /// Job id.
    pub job_id: String,
    /// Dataset being curated.
    pub dataset_id: String,
    /// Server-reported state.
    #[serde(default)]
    pub status: String,
}
