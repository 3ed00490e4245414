//! Training job configuration and progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Lifecycle of a training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    /// Waiting for resources.
    #[default]
    Queued,
    /// Running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped by a user.
    Cancelled,
}

impl TrainingStatus {
    /// Returns true once the job can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Hyperparameters and inputs of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    /// Base model to fine-tune.
    pub model_id: String,
    /// Dataset to train on.
    pub dataset_id: String,
    /// Passes over the dataset.
    pub epochs: u32,
    /// Optimizer step size.
    pub learning_rate: f64,
    /// Samples per step.
    pub batch_size: u32,
    /// Use LoRA adapters instead of full fine-tuning.
    #[serde(default)]
    pub use_lora: bool,
}

impl TrainingConfig {
    /// Checks the configuration before submission.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> DomainResult<()> {
        if self.model_id.trim().is_empty() {
            return Err(DomainError::invalid("modelId", "must not be empty"));
        }
        if self.dataset_id.trim().is_empty() {
            return Err(DomainError::invalid("datasetId", "must not be empty"));
        }
        if self.epochs == 0 {
            return Err(DomainError::invalid("epochs", "must be greater than 0"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(DomainError::invalid("learningRate", "must be within (0, 1]"));
        }
        if self.batch_size == 0 {
            return Err(DomainError::invalid("batchSize", "must be greater than 0"));
        }
        Ok(())
    }
}

/// A training job as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    /// Job id.
    pub id: String,
    /// Current state.
    pub status: TrainingStatus,
    /// Completion in [0, 100].
    #[serde(default)]
    pub progress: f64,
    /// Epoch currently running.
    #[serde(default)]
    pub current_epoch: u32,
    /// Submitted configuration.
    #[serde(default)]
    pub config: Option<TrainingConfig>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
    /// Submission time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One metrics sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    /// Optimizer step.
    pub step: u64,
    /// Training loss.
    pub loss: f64,
    /// Validation loss, when evaluated at this step.
    #[serde(default)]
    pub val_loss: Option<f64>,
    /// Learning rate at this step.
    #[serde(default)]
    pub learning_rate: Option<f64>,
}

/// Metrics history of a job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    /// Job the samples belong to.
    #[serde(default)]
    pub job_id: String,
    /// Samples in step order.
    #[serde(default)]
    pub points: Vec<MetricPoint>,
}

impl TrainingMetrics {
    /// Most recent training loss.
    #[must_use]
    pub fn latest_loss(&self) -> Option<f64> {
        self.points.last().map(|point| point.loss)
    }
}
