//! # In-Memory Entity Store
//!
//! Mutex-guarded implementation backing tests and local development. A
//! single lock gives every operation the same atomicity the Postgres
//! implementation gets from row updates and transactions. Failure
//! injection covers the domain-processing error path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::{EntityStore, StageOutputs};
use crate::error::{PipelineError, Result};
use crate::models::{
    Dataset, NewDataset, NewProject, NewReport, NewTrainedModel, Project, Report, TrainedModel,
};
use crate::state_machine::{DatasetStatus, Stage, StageStatus, TrainingType};

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    datasets: HashMap<Uuid, Dataset>,
    models: Vec<TrainedModel>,
    reports: HashMap<Uuid, Report>,
}

#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<Tables>,
    fail_result_writes: AtomicBool,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent result-applying write fail, exercising the
    /// domain-processing error path. Failure marking stays functional so
    /// the FAILED fallback write can be observed.
    pub fn fail_result_writes(&self, fail: bool) {
        self.fail_result_writes.store(fail, Ordering::SeqCst);
    }

    pub fn model_count(&self) -> usize {
        self.tables.lock().models.len()
    }

    pub fn report_count(&self) -> usize {
        self.tables.lock().reports.len()
    }

    fn check_result_write(&self) -> Result<()> {
        if self.fail_result_writes.load(Ordering::SeqCst) {
            return Err(PipelineError::storage("injected store failure"));
        }
        Ok(())
    }

    fn with_dataset<T>(&self, id: Uuid, f: impl FnOnce(&mut Dataset) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.lock();
        let dataset = tables
            .datasets
            .get_mut(&id)
            .ok_or_else(|| PipelineError::dataset_not_found(id))?;
        let out = f(dataset)?;
        dataset.updated_at = Utc::now();
        Ok(out)
    }
}

fn set_stage_started(dataset: &mut Dataset, stage: Stage, top_level: DatasetStatus) -> Result<()> {
    let current = dataset.stage_status(stage);
    if !current.can_transition_to(StageStatus::InProgress) {
        return Err(PipelineError::validation(format!(
            "{stage} cannot move from {current} to IN_PROGRESS"
        )));
    }

    let now = Some(Utc::now());
    dataset.status = top_level;
    match stage {
        Stage::Profiling => {
            dataset.profiling_status = StageStatus::InProgress;
            dataset.profiling_error.clear();
            dataset.profiling_started_at = now;
        }
        Stage::FeatureEngineering => {
            dataset.engineering_status = StageStatus::InProgress;
            dataset.engineering_error.clear();
            dataset.engineering_started_at = now;
        }
        Stage::FeatureSelection => {
            dataset.selection_status = StageStatus::InProgress;
            dataset.selection_error.clear();
            dataset.selection_started_at = now;
        }
        Stage::ClassicalTraining => {
            dataset.training_status = StageStatus::InProgress;
            dataset.training_error.clear();
            dataset.training_started_at = now;
        }
        Stage::ReportGeneration => {
            dataset.report_status = StageStatus::InProgress;
            dataset.report_error.clear();
            dataset.report_started_at = now;
        }
    }
    Ok(())
}

fn set_stage_failed(dataset: &mut Dataset, stage: Stage, error: &str) {
    match stage {
        Stage::Profiling => {
            dataset.profiling_status = StageStatus::Failed;
            dataset.profiling_error = error.to_string();
        }
        Stage::FeatureEngineering => {
            dataset.engineering_status = StageStatus::Failed;
            dataset.engineering_error = error.to_string();
        }
        Stage::FeatureSelection => {
            dataset.selection_status = StageStatus::Failed;
            dataset.selection_error = error.to_string();
        }
        Stage::ClassicalTraining => {
            dataset.training_status = StageStatus::Failed;
            dataset.training_error = error.to_string();
        }
        Stage::ReportGeneration => {
            dataset.report_status = StageStatus::Failed;
            dataset.report_error = error.to_string();
        }
    }
}

fn apply_outputs(dataset: &mut Dataset, outputs: StageOutputs) {
    match outputs {
        StageOutputs::Profiling { metadata, eda_key } => {
            dataset.profiling_status = StageStatus::Completed;
            dataset.profiling_error.clear();
            dataset.profiling_metadata = Some(metadata);
            dataset.eda_key = eda_key;
        }
        StageOutputs::FeatureEngineering {
            metadata,
            engineered_key,
            code_key,
            transformation_key,
            summary_key,
        } => {
            dataset.engineering_status = StageStatus::Completed;
            dataset.engineering_error.clear();
            dataset.engineering_metadata = Some(metadata);
            dataset.engineered_key = engineered_key;
            dataset.engineering_code_key = code_key;
            dataset.transformation_code_key = transformation_key;
            dataset.engineering_summary_key = summary_key;
        }
        StageOutputs::FeatureSelection {
            metadata,
            selected_columns,
            transformed_key,
            summary_key,
        } => {
            dataset.selection_status = StageStatus::Completed;
            dataset.selection_error.clear();
            dataset.selection_metadata = Some(metadata);
            dataset.selected_columns = Some(selected_columns);
            dataset.selected_key = transformed_key;
            dataset.selection_summary_key = summary_key;
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            task_type: new.task_type,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .projects
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.tables.lock().projects.get(&id).cloned())
    }

    async fn create_dataset(&self, new: NewDataset) -> Result<Dataset> {
        let now = Utc::now();
        let dataset = Dataset {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            name: new.name,
            description: new.description,
            file_key: new.file_key,
            format: new.format,
            size_bytes: new.size_bytes,
            status: DatasetStatus::Uploaded,
            target_column: None,
            training_type: None,
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
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .datasets
            .insert(dataset.id, dataset.clone());
        Ok(dataset)
    }

    async fn dataset(&self, id: Uuid) -> Result<Option<Dataset>> {
        Ok(self.tables.lock().datasets.get(&id).cloned())
    }

    async fn datasets_for_project(&self, project_id: Uuid) -> Result<Vec<Dataset>> {
        let mut datasets: Vec<Dataset> = self
            .tables
            .lock()
            .datasets
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        datasets.sort_by_key(|d| d.created_at);
        Ok(datasets)
    }

    async fn update_dataset_settings(
        &self,
        id: Uuid,
        target_column: Option<String>,
        training_type: Option<TrainingType>,
    ) -> Result<Dataset> {
        self.with_dataset(id, |dataset| {
            if let Some(column) = target_column {
                dataset.target_column = Some(column);
            }
            if let Some(kind) = training_type {
                dataset.training_type = Some(kind);
            }
            Ok(dataset.clone())
        })
    }

    async fn delete_dataset(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock();
        tables
            .datasets
            .remove(&id)
            .ok_or_else(|| PipelineError::dataset_not_found(id))?;
        tables.reports.retain(|_, r| r.dataset_id != id);
        Ok(())
    }

    async fn mark_stage_started(
        &self,
        id: Uuid,
        stage: Stage,
        top_level: DatasetStatus,
    ) -> Result<()> {
        self.with_dataset(id, |dataset| set_stage_started(dataset, stage, top_level))
    }

    async fn complete_stage(&self, id: Uuid, outputs: StageOutputs) -> Result<()> {
        self.check_result_write()?;
        self.with_dataset(id, |dataset| {
            apply_outputs(dataset, outputs);
            Ok(())
        })
    }

    async fn mark_stage_failed(&self, id: Uuid, stage: Stage, error: &str) -> Result<()> {
        self.with_dataset(id, |dataset| {
            set_stage_failed(dataset, stage, error);
            Ok(())
        })
    }

    async fn complete_training(&self, id: Uuid, model: NewTrainedModel) -> Result<TrainedModel> {
        self.check_result_write()?;

        let mut tables = self.tables.lock();
        let dataset = tables
            .datasets
            .get_mut(&id)
            .ok_or_else(|| PipelineError::dataset_not_found(id))?;
        dataset.training_status = StageStatus::Completed;
        dataset.training_error.clear();
        dataset.updated_at = Utc::now();

        // Upsert on (project_id, model_key): redelivery replaces.
        let existing = tables
            .models
            .iter_mut()
            .find(|m| m.project_id == model.project_id && m.model_key == model.model_key);

        let stored = match existing {
            Some(row) => {
                row.name = model.name;
                row.description = model.description;
                row.training_type = model.training_type;
                row.performance = model.performance;
                row.hyperparameters = model.hyperparameters;
                row.training_metadata = model.training_metadata;
                row.clone()
            }
            None => {
                let row = TrainedModel {
                    id: Uuid::new_v4(),
                    project_id: model.project_id,
                    name: model.name,
                    description: model.description,
                    training_type: model.training_type,
                    model_key: model.model_key,
                    performance: model.performance,
                    hyperparameters: model.hyperparameters,
                    training_metadata: model.training_metadata,
                    created_at: Utc::now(),
                };
                tables.models.push(row.clone());
                row
            }
        };
        Ok(stored)
    }

    async fn complete_report(&self, id: Uuid, report: NewReport) -> Result<Report> {
        self.check_result_write()?;

        let mut tables = self.tables.lock();
        let dataset = tables
            .datasets
            .get_mut(&id)
            .ok_or_else(|| PipelineError::dataset_not_found(id))?;
        dataset.report_status = StageStatus::Completed;
        dataset.report_error.clear();
        dataset.updated_at = Utc::now();

        // One report per dataset: redelivery replaces.
        let row = Report {
            id: tables
                .reports
                .get(&report.dataset_id)
                .map_or_else(Uuid::new_v4, |existing| existing.id),
            dataset_id: report.dataset_id,
            html_key: report.html_key,
            pdf_key: report.pdf_key,
            created_at: Utc::now(),
        };
        tables.reports.insert(report.dataset_id, row.clone());
        Ok(row)
    }

    async fn models_for_project(&self, project_id: Uuid) -> Result<Vec<TrainedModel>> {
        let mut models: Vec<TrainedModel> = self
            .tables
            .lock()
            .models
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        models.sort_by_key(|m| m.created_at);
        Ok(models)
    }

    async fn report_for_dataset(&self, dataset_id: Uuid) -> Result<Option<Report>> {
        Ok(self.tables.lock().reports.get(&dataset_id).cloned())
    }

    async fn stale_in_progress(&self, stage: Stage, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .datasets
            .values()
            .filter(|d| {
                d.stage_status(stage).is_active()
                    && d.stage_started_at(stage).is_some_and(|at| at < cutoff)
            })
            .map(|d| d.id)
            .collect())
    }
}
