//! Push-update messages and connection state.

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetStatus;
use crate::generation::GenerationStatus;
use crate::safety::Severity;
use crate::training::TrainingStatus;

/// Push connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Waiting before the next connection attempt.
    Reconnecting,
    /// Gave up after the maximum number of attempts.
    Failed,
}

/// A push update from the platform, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A dataset changed state.
    #[serde(rename_all = "camelCase")]
    DatasetUpdated {
        /// Dataset id.
        dataset_id: String,
        /// New state.
        status: DatasetStatus,
    },
    /// A training job reported progress.
    #[serde(rename_all = "camelCase")]
    TrainingProgress {
        /// Job id.
        job_id: String,
        /// Current state.
        status: TrainingStatus,
        /// Completion in [0, 100].
        progress: f64,
        /// Latest loss, when reported.
        #[serde(default)]
        loss: Option<f64>,
    },
    /// A generation request reported progress.
    #[serde(rename_all = "camelCase")]
    GenerationProgress {
        /// Request id.
        request_id: String,
        /// Current state.
        status: GenerationStatus,
        /// Completion in [0, 100].
        progress: f64,
    },
    /// A guardrail fired.
    #[serde(rename_all = "camelCase")]
    SafetyAlert {
        /// Category that fired.
        category: String,
        /// Severity.
        severity: Severity,
        /// Human-readable description.
        message: String,
    },
}

impl MonitorEvent {
    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns the serde error for unknown types or malformed payloads.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_training_progress() {
        let event = MonitorEvent::from_json(
            r#"{"type":"training_progress","jobId":"j1","status":"running","progress":42.5}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            MonitorEvent::TrainingProgress {
                job_id: "j1".into(),
                status: TrainingStatus::Running,
                progress: 42.5,
                loss: None,
            }
        );
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event = MonitorEvent::SafetyAlert {
            category: "violence".into(),
            severity: Severity::High,
            message: "blocked".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "safety_alert");
        assert_eq!(json["severity"], "high");
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(MonitorEvent::from_json(r#"{"type":"heartbeat"}"#).is_err());
    }
}
