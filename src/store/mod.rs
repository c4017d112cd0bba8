//! # Persisted Entity Store
//!
//! The collaborator contract the orchestrators mutate state through:
//! typed lookups, single-row stage transitions, and the composite
//! transactional operations that apply a worker result and its dependent
//! rows in one atomic unit.
//!
//! Transition enforcement: `mark_stage_started` is the only entry into
//! IN_PROGRESS and rejects any transition outside the canonical table
//! (NOT_STARTED → IN_PROGRESS → {COMPLETED | FAILED} → IN_PROGRESS on
//! retry). Completion and failure writes always apply last-write-wins:
//! duplicate delivery of a result must leave the record equal to the most
//! recently processed message, so a COMPLETED stage re-applies rather
//! than rejects.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

pub use memory::InMemoryEntityStore;
pub use pg::PgEntityStore;

use crate::error::Result;
use crate::models::{
    Dataset, NewDataset, NewProject, NewReport, NewTrainedModel, Project, Report, TrainedModel,
};
use crate::state_machine::{DatasetStatus, Stage, TrainingType};

/// Typed per-stage output fields written by `complete_stage`.
///
/// Training and report completion carry dependent rows and use their own
/// composite operations instead.
#[derive(Debug, Clone)]
pub enum StageOutputs {
    Profiling {
        metadata: Value,
        eda_key: Option<String>,
    },
    FeatureEngineering {
        metadata: Value,
        engineered_key: Option<String>,
        code_key: Option<String>,
        transformation_key: Option<String>,
        summary_key: Option<String>,
    },
    FeatureSelection {
        metadata: Value,
        selected_columns: Vec<String>,
        transformed_key: Option<String>,
        summary_key: Option<String>,
    },
}

impl StageOutputs {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Profiling { .. } => Stage::Profiling,
            Self::FeatureEngineering { .. } => Stage::FeatureEngineering,
            Self::FeatureSelection { .. } => Stage::FeatureSelection,
        }
    }
}

/// CRUD and transactional updates over the persisted pipeline entities.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // -- projects --------------------------------------------------------

    async fn create_project(&self, new: NewProject) -> Result<Project>;

    async fn project(&self, id: Uuid) -> Result<Option<Project>>;

    // -- datasets --------------------------------------------------------

    async fn create_dataset(&self, new: NewDataset) -> Result<Dataset>;

    async fn dataset(&self, id: Uuid) -> Result<Option<Dataset>>;

    async fn datasets_for_project(&self, project_id: Uuid) -> Result<Vec<Dataset>>;

    /// Set the target column and/or training type ahead of pipeline runs.
    async fn update_dataset_settings(
        &self,
        id: Uuid,
        target_column: Option<String>,
        training_type: Option<TrainingType>,
    ) -> Result<Dataset>;

    /// Delete the record (reports cascade). The caller releases the
    /// backing file first.
    async fn delete_dataset(&self, id: Uuid) -> Result<()>;

    // -- stage transitions ----------------------------------------------

    /// Flip a stage to IN_PROGRESS: clears the stage error, stamps the
    /// started-at timestamp and writes `top_level` — one atomic update,
    /// performed only after the broker acknowledged the publish. Rejects
    /// transitions outside the canonical table.
    async fn mark_stage_started(
        &self,
        id: Uuid,
        stage: Stage,
        top_level: DatasetStatus,
    ) -> Result<()>;

    /// Apply a worker result: stage COMPLETED, error cleared, outputs
    /// written — one atomic update, last-write-wins under redelivery.
    async fn complete_stage(&self, id: Uuid, outputs: StageOutputs) -> Result<()>;

    /// Record a stage failure with its error message.
    async fn mark_stage_failed(&self, id: Uuid, stage: Stage, error: &str) -> Result<()>;

    // -- composite result transactions ----------------------------------

    /// Training COMPLETED + model row (with metric rows) in one
    /// transaction. The model upserts on `(project_id, model_key)` so a
    /// redelivered result replaces instead of duplicating.
    async fn complete_training(&self, id: Uuid, model: NewTrainedModel) -> Result<TrainedModel>;

    /// Report COMPLETED + report row in one transaction; one report per
    /// dataset, redelivery replaces.
    async fn complete_report(&self, id: Uuid, report: NewReport) -> Result<Report>;

    // -- models and reports ---------------------------------------------

    async fn models_for_project(&self, project_id: Uuid) -> Result<Vec<TrainedModel>>;

    async fn report_for_dataset(&self, dataset_id: Uuid) -> Result<Option<Report>>;

    // -- watchdog --------------------------------------------------------

    /// Datasets whose `stage` has been IN_PROGRESS since before `cutoff`.
    async fn stale_in_progress(&self, stage: Stage, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}
