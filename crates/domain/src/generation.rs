//! Video generation requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Longest clip the platform renders.
pub const MAX_FRAMES: u32 = 240;

/// Output resolutions the platform renders.
pub const SUPPORTED_RESOLUTIONS: [(u32, u32); 4] = [(640, 360), (1024, 576), (1280, 720), (1920, 1080)];

/// Lifecycle of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Waiting for a worker.
    #[default]
    Pending,
    /// Rendering.
    Processing,
    /// Video available.
    Completed,
    /// Rendering failed.
    Failed,
    /// Stopped by a user.
    Cancelled,
    /// Rejected by the guardrails.
    Blocked,
}

impl GenerationStatus {
    /// Returns true once the request can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Pixels across.
    pub width: u32,
    /// Pixels down.
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Body of a generation submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Text prompt.
    pub prompt: String,
    /// Model to render with.
    pub model_id: String,
    /// Clip length.
    pub num_frames: u32,
    /// Output frame size.
    #[serde(default)]
    pub resolution: Resolution,
    /// Seed for reproducible output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Things to steer away from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl GenerationRequest {
    /// Checks the request before submission.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> DomainResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(DomainError::invalid("prompt", "must not be empty"));
        }
        if self.model_id.trim().is_empty() {
            return Err(DomainError::invalid("modelId", "must not be empty"));
        }
        if self.num_frames == 0 || self.num_frames > MAX_FRAMES {
            return Err(DomainError::invalid(
                "numFrames",
                format!("must be within 1..={MAX_FRAMES}"),
            ));
        }
        let size = (self.resolution.width, self.resolution.height);
        if !SUPPORTED_RESOLUTIONS.contains(&size) {
            return Err(DomainError::invalid(
                "resolution",
                format!("{}x{} is not supported", size.0, size.1),
            ));
        }
        Ok(())
    }
}

/// Server view of a submitted generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    /// Request id.
    pub id: String,
    /// Current state.
    pub status: GenerationStatus,
    /// Completion in [0, 100].
    #[serde(default)]
    pub progress: f64,
    /// Where the finished video can be fetched.
    #[serde(default)]
    pub output_url: Option<String>,
    /// Failure or block reason.
    #[serde(default)]
    pub error: Option<String>,
    /// Submission time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
