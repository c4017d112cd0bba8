//! # Pipeline State Machine
//!
//! Stage and status definitions plus the canonical per-stage transition
//! table. Historical variants of the stage services disagreed on which
//! guards were enforced; the table here is the single authority:
//!
//! ```text
//! NOT_STARTED -> IN_PROGRESS -> { COMPLETED | FAILED } -> IN_PROGRESS (retry)
//! ```
//!
//! A stage that is IN_PROGRESS can never be started again; COMPLETED and
//! FAILED stages may be re-run, which re-enters IN_PROGRESS.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::queues;

/// One phase of the dataset pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Profiling,
    FeatureEngineering,
    FeatureSelection,
    ClassicalTraining,
    ReportGeneration,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Profiling,
        Stage::FeatureEngineering,
        Stage::FeatureSelection,
        Stage::ClassicalTraining,
        Stage::ReportGeneration,
    ];

    /// Durable queue the stage's job requests are published to.
    pub fn request_queue(&self) -> &'static str {
        match self {
            Stage::Profiling => queues::DATA_PROFILING_REQUEST_QUEUE,
            Stage::FeatureEngineering => queues::DATA_ENGINEERING_REQUEST_QUEUE,
            Stage::FeatureSelection => queues::DATA_SELECTION_REQUEST_QUEUE,
            Stage::ClassicalTraining => queues::CLASSICAL_TRAINING_REQUEST_QUEUE,
            Stage::ReportGeneration => queues::REPORT_GENERATION_REQUEST_QUEUE,
        }
    }

    /// Durable queue the stage's worker results arrive on.
    pub fn result_queue(&self) -> &'static str {
        match self {
            Stage::Profiling => queues::DATA_PROFILING_RESULT_QUEUE,
            Stage::FeatureEngineering => queues::DATA_ENGINEERING_RESULT_QUEUE,
            Stage::FeatureSelection => queues::DATA_SELECTION_RESULT_QUEUE,
            Stage::ClassicalTraining => queues::CLASSICAL_TRAINING_RESULT_QUEUE,
            Stage::ReportGeneration => queues::REPORT_GENERATION_RESULT_QUEUE,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Profiling => write!(f, "profiling"),
            Stage::FeatureEngineering => write!(f, "feature_engineering"),
            Stage::FeatureSelection => write!(f, "feature_selection"),
            Stage::ClassicalTraining => write!(f, "classical_training"),
            Stage::ReportGeneration => write!(f, "report_generation"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profiling" => Ok(Stage::Profiling),
            "feature_engineering" => Ok(Stage::FeatureEngineering),
            "feature_selection" => Ok(Stage::FeatureSelection),
            "classical_training" => Ok(Stage::ClassicalTraining),
            "report_generation" => Ok(Stage::ReportGeneration),
            _ => Err(format!("Invalid stage: {s}")),
        }
    }
}

/// Per-stage processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "stage_status")]
pub enum StageStatus {
    #[sqlx(rename = "NOT_STARTED")]
    NotStarted,
    #[sqlx(rename = "IN_PROGRESS")]
    InProgress,
    #[sqlx(rename = "COMPLETED")]
    Completed,
    #[sqlx(rename = "FAILED")]
    Failed,
}

impl StageStatus {
    /// Whether the stage holds a worker result, good or bad.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a job for this stage is currently in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Whether `start` may transition this status to IN_PROGRESS.
    /// Every status but IN_PROGRESS may (re-)enter the pipeline.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }

    /// Canonical transition table. Any transition not listed here is
    /// rejected by the store layer.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::Completed, Self::InProgress)
                | (Self::Failed, Self::InProgress)
        )
    }
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid stage status: {s}")),
        }
    }
}

/// Top-level dataset lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "dataset_status")]
pub enum DatasetStatus {
    #[sqlx(rename = "UPLOADED")]
    Uploaded,
    #[sqlx(rename = "PROCESSING")]
    Processing,
    #[sqlx(rename = "READY")]
    Ready,
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded => write!(f, "UPLOADED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

/// Modeling problem class, held on the owning project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "task_type")]
pub enum TaskType {
    #[sqlx(rename = "CLASSIFICATION")]
    Classification,
    #[sqlx(rename = "REGRESSION")]
    Regression,
}

impl TaskType {
    /// Wire form used in worker payloads.
    pub fn as_payload(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => write!(f, "CLASSIFICATION"),
            Self::Regression => write!(f, "REGRESSION"),
        }
    }
}

/// Training flavor selected for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "training_type")]
pub enum TrainingType {
    #[sqlx(rename = "CLASSICAL")]
    Classical,
    #[sqlx(rename = "CUSTOM")]
    Custom,
}

impl fmt::Display for TrainingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classical => write!(f, "CLASSICAL"),
            Self::Custom => write!(f, "CUSTOM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_happy_path() {
        assert!(StageStatus::NotStarted.can_transition_to(StageStatus::InProgress));
        assert!(StageStatus::InProgress.can_transition_to(StageStatus::Completed));
        assert!(StageStatus::InProgress.can_transition_to(StageStatus::Failed));
    }

    #[test]
    fn test_transition_table_retry_paths() {
        assert!(StageStatus::Failed.can_transition_to(StageStatus::InProgress));
        assert!(StageStatus::Completed.can_transition_to(StageStatus::InProgress));
    }

    #[test]
    fn test_transition_table_rejects_everything_else() {
        assert!(!StageStatus::NotStarted.can_transition_to(StageStatus::Completed));
        assert!(!StageStatus::NotStarted.can_transition_to(StageStatus::Failed));
        assert!(!StageStatus::InProgress.can_transition_to(StageStatus::InProgress));
        assert!(!StageStatus::Completed.can_transition_to(StageStatus::Failed));
        assert!(!StageStatus::Failed.can_transition_to(StageStatus::Completed));
    }

    #[test]
    fn test_only_in_progress_blocks_start() {
        assert!(StageStatus::NotStarted.can_start());
        assert!(StageStatus::Completed.can_start());
        assert!(StageStatus::Failed.can_start());
        assert!(!StageStatus::InProgress.can_start());
    }

    #[test]
    fn test_stage_queue_names_follow_convention() {
        for stage in Stage::ALL {
            assert!(stage.request_queue().ends_with("_REQUEST_QUEUE"));
            assert!(stage.result_queue().ends_with("_RESULT_QUEUE"));
        }
        assert_eq!(
            Stage::FeatureSelection.request_queue(),
            "DATA_SELECTION_REQUEST_QUEUE"
        );
    }

    #[test]
    fn test_task_type_payload_form_is_lowercase() {
        assert_eq!(TaskType::Classification.as_payload(), "classification");
        assert_eq!(TaskType::Regression.as_payload(), "regression");
    }

    #[test]
    fn test_stage_round_trips_through_display() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }
}
