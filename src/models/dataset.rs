//! # Dataset Model
//!
//! The dataset record is the primary orchestration unit: it tracks an
//! uploaded file and the status, error, metadata and output artifacts of
//! every pipeline stage run against it.
//!
//! ## Overview
//!
//! A dataset is created on upload (status UPLOADED, every stage
//! NOT_STARTED) and mutated exclusively by the stage orchestrators and
//! their result handlers. The record is the unit of mutual exclusion for
//! the pipeline: all stage transitions are single-row updates against it.
//!
//! ## Stage fields
//!
//! Each stage owns a `<stage>_status`, `<stage>_error` (empty string when
//! clear), `<stage>_started_at` watchdog timestamp, and its output columns:
//!
//! - profiling: `profiling_metadata` (worker report), `eda_key`
//! - feature engineering: `engineering_metadata` (learned parameters),
//!   `engineered_key`, `engineering_code_key`, `transformation_code_key`,
//!   `engineering_summary_key`
//! - feature selection: `selection_metadata` (logs + figure data),
//!   `selected_columns`, `selected_key`, `selection_summary_key`
//! - classical training: outputs live on [`TrainedModel`](crate::models::TrainedModel)
//! - report generation: outputs live on [`Report`](crate::models::Report)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::state_machine::{DatasetStatus, Stage, StageStatus, TrainingType};

/// A persisted dataset and its pipeline progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Dataset {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Storage key of the original uploaded file.
    pub file_key: String,
    pub format: String,
    pub size_bytes: i64,
    pub status: DatasetStatus,
    pub target_column: Option<String>,
    pub training_type: Option<TrainingType>,

    pub profiling_status: StageStatus,
    pub profiling_error: String,
    pub profiling_metadata: Option<Value>,
    pub eda_key: Option<String>,
    pub profiling_started_at: Option<DateTime<Utc>>,

    pub engineering_status: StageStatus,
    pub engineering_error: String,
    pub engineering_metadata: Option<Value>,
    pub engineered_key: Option<String>,
    pub engineering_code_key: Option<String>,
    pub transformation_code_key: Option<String>,
    pub engineering_summary_key: Option<String>,
    pub engineering_started_at: Option<DateTime<Utc>>,

    pub selection_status: StageStatus,
    pub selection_error: String,
    pub selection_metadata: Option<Value>,
    pub selected_columns: Option<Vec<String>>,
    pub selected_key: Option<String>,
    pub selection_summary_key: Option<String>,
    pub selection_started_at: Option<DateTime<Utc>>,

    pub training_status: StageStatus,
    pub training_error: String,
    pub training_started_at: Option<DateTime<Utc>>,

    pub report_status: StageStatus,
    pub report_error: String,
    pub report_started_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New dataset for creation (generated fields omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDataset {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_key: String,
    pub format: String,
    pub size_bytes: i64,
}

impl Dataset {
    /// Status of one stage.
    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Profiling => self.profiling_status,
            Stage::FeatureEngineering => self.engineering_status,
            Stage::FeatureSelection => self.selection_status,
            Stage::ClassicalTraining => self.training_status,
            Stage::ReportGeneration => self.report_status,
        }
    }

    /// Error string of one stage; empty when clear.
    pub fn stage_error(&self, stage: Stage) -> &str {
        match stage {
            Stage::Profiling => &self.profiling_error,
            Stage::FeatureEngineering => &self.engineering_error,
            Stage::FeatureSelection => &self.selection_error,
            Stage::ClassicalTraining => &self.training_error,
            Stage::ReportGeneration => &self.report_error,
        }
    }

    /// When the stage last entered IN_PROGRESS.
    pub fn stage_started_at(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Profiling => self.profiling_started_at,
            Stage::FeatureEngineering => self.engineering_started_at,
            Stage::FeatureSelection => self.selection_started_at,
            Stage::ClassicalTraining => self.training_started_at,
            Stage::ReportGeneration => self.report_started_at,
        }
    }

    /// Storage key of the artifact a stage consumes as its input.
    ///
    /// Profiling and feature engineering read the original upload; feature
    /// selection reads the engineered dataset; classical training reads the
    /// feature-selection output. Report generation consumes metadata only.
    pub fn stage_input_key(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Profiling | Stage::FeatureEngineering => Some(self.file_key.as_str()),
            Stage::FeatureSelection => self.engineered_key.as_deref(),
            Stage::ClassicalTraining => self.selected_key.as_deref(),
            Stage::ReportGeneration => None,
        }
    }

    /// Named output artifact keys a completed stage exposes for polling.
    /// Only keys that are present are returned.
    pub fn stage_output_keys(&self, stage: Stage) -> Vec<(&'static str, String)> {
        let pairs: Vec<(&'static str, Option<&String>)> = match stage {
            Stage::Profiling => vec![("eda_report", self.eda_key.as_ref())],
            Stage::FeatureEngineering => vec![
                ("engineered_dataset", self.engineered_key.as_ref()),
                ("engineering_code", self.engineering_code_key.as_ref()),
                ("transformation_code", self.transformation_code_key.as_ref()),
                ("summary_report", self.engineering_summary_key.as_ref()),
            ],
            Stage::FeatureSelection => vec![
                ("selected_dataset", self.selected_key.as_ref()),
                ("summary_report", self.selection_summary_key.as_ref()),
            ],
            // Training and report artifacts live on their own records.
            Stage::ClassicalTraining | Stage::ReportGeneration => vec![],
        };

        pairs
            .into_iter()
            .filter_map(|(name, key)| key.map(|k| (name, k.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "churn".to_string(),
            description: None,
            file_key: "p1/churn.csv".to_string(),
            format: "csv".to_string(),
            size_bytes: 1024,
            status: DatasetStatus::Uploaded,
            target_column: Some("label".to_string()),
            training_type: Some(TrainingType::Classical),
            profiling_status: StageStatus::NotStarted,
            profiling_error: String::new(),
            profiling_metadata: None,
            eda_key: None,
            profiling_started_at: None,
            engineering_status: StageStatus::NotStarted,
            engineering_error: String::new(),
            engineering_metadata: None,
            engineered_key: None,
            engineering_code_key: None,
            transformation_code_key: None,
            engineering_summary_key: None,
            engineering_started_at: None,
            selection_status: StageStatus::NotStarted,
            selection_error: String::new(),
            selection_metadata: None,
            selected_columns: None,
            selected_key: None,
            selection_summary_key: None,
            selection_started_at: None,
            training_status: StageStatus::NotStarted,
            training_error: String::new(),
            training_started_at: None,
            report_status: StageStatus::NotStarted,
            report_error: String::new(),
            report_started_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_stage_input_keys_chain_through_artifacts() {
        let mut ds = dataset();
        assert_eq!(ds.stage_input_key(Stage::Profiling), Some("p1/churn.csv"));
        assert_eq!(
            ds.stage_input_key(Stage::FeatureEngineering),
            Some("p1/churn.csv")
        );
        assert_eq!(ds.stage_input_key(Stage::FeatureSelection), None);

        ds.engineered_key = Some("p1/churn.engineered.csv".to_string());
        ds.selected_key = Some("p1/churn.selected.csv".to_string());
        assert_eq!(
            ds.stage_input_key(Stage::FeatureSelection),
            Some("p1/churn.engineered.csv")
        );
        assert_eq!(
            ds.stage_input_key(Stage::ClassicalTraining),
            Some("p1/churn.selected.csv")
        );
    }

    #[test]
    fn test_stage_output_keys_skip_missing() {
        let mut ds = dataset();
        assert!(ds.stage_output_keys(Stage::Profiling).is_empty());

        ds.eda_key = Some("eda.html".to_string());
        assert_eq!(
            ds.stage_output_keys(Stage::Profiling),
            vec![("eda_report", "eda.html".to_string())]
        );

        ds.engineered_key = Some("out.csv".to_string());
        let fe = ds.stage_output_keys(Stage::FeatureEngineering);
        assert_eq!(fe.len(), 1);
        assert_eq!(fe[0].0, "engineered_dataset");
    }
}
