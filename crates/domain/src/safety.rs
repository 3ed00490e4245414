//! Content-safety guardrails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Per-category block thresholds. A score at or above the threshold is blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyThresholds {
    /// Violent content.
    pub violence: f64,
    /// Sexual content.
    pub nsfw: f64,
    /// Hateful content.
    pub hate: f64,
    /// Recognizable real people.
    pub face_likeness: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            violence: 0.5,
            nsfw: 0.3,
            hate: 0.3,
            face_likeness: 0.7,
        }
    }
}

impl SafetyThresholds {
    fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("violence", self.violence),
            ("nsfw", self.nsfw),
            ("hate", self.hate),
            ("faceLikeness", self.face_likeness),
        ]
    }
}

/// Guardrail configuration for prompts and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    /// Master switch.
    pub enabled: bool,
    /// Screen prompts before generation.
    #[serde(default)]
    pub prompt_filter: bool,
    /// Screen generated video.
    #[serde(default)]
    pub output_filter: bool,
    /// Blur faces in generated video.
    #[serde(default)]
    pub face_blur: bool,
    /// Block thresholds.
    #[serde(default)]
    pub thresholds: SafetyThresholds,
    /// Terms rejected in prompts.
    #[serde(default)]
    pub blocked_terms: Vec<String>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt_filter: true,
            output_filter: true,
            face_blur: false,
            thresholds: SafetyThresholds::default(),
            blocked_terms: Vec::new(),
        }
    }
}

impl GuardrailConfig {
    /// Checks that every threshold lies in [0, 1].
    ///
    /// # Errors
    ///
    /// Returns the first threshold out of range.
    pub fn validate(&self) -> DomainResult<()> {
        for (name, value) in self.thresholds.entries() {
            if !(0.0..=1.0).contains(&value) {
                return Err(DomainError::invalid(
                    "thresholds",
                    format!("{name} must be within [0, 1], got {value}"),
                ));
            }
        }
        Ok(())
    }
}

/// Severity of a safety event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth a look.
    Medium,
    /// Needs action.
    High,
    /// Content was blocked.
    Critical,
}

/// A guardrail decision logged by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyEvent {
    /// Event id.
    pub id: String,
    /// Category that fired.
    pub category: String,
    /// Severity.
    pub severity: Severity,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
    /// Related generation request, if any.
    #[serde(default)]
    pub request_id: Option<String>,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}
