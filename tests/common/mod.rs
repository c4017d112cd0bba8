//! Shared fixtures for the pipeline integration tests: an in-memory
//! harness wiring the store, gateway and storage doubles, seed builders
//! for projects/datasets, and worker result payload builders.

#![allow(dead_code)] // Not every test file uses every fixture.

use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use mlforge_core::messaging::InMemoryGateway;
use mlforge_core::models::{Dataset, NewDataset, NewProject, Project};
use mlforge_core::orchestration::{
    ClassicalTrainingOrchestrator, FeatureEngineeringOrchestrator, FeatureSelectionOrchestrator,
    ProfilingOrchestrator, ReportGenerationOrchestrator, StageDeps,
};
use mlforge_core::state_machine::{DatasetStatus, Stage, TaskType, TrainingType};
use mlforge_core::storage::InMemoryStorage;
use mlforge_core::store::{EntityStore, InMemoryEntityStore, StageOutputs};

pub struct Harness {
    pub store: Arc<InMemoryEntityStore>,
    pub gateway: Arc<InMemoryGateway>,
    pub storage: Arc<InMemoryStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryEntityStore::new()),
            gateway: Arc::new(InMemoryGateway::new()),
            storage: Arc::new(InMemoryStorage::new()),
        }
    }

    pub fn deps(&self) -> StageDeps {
        StageDeps::new(
            self.store.clone(),
            self.gateway.clone(),
            self.storage.clone(),
        )
    }

    pub fn profiling(&self) -> ProfilingOrchestrator {
        ProfilingOrchestrator::new(self.deps())
    }

    pub fn feature_engineering(&self) -> FeatureEngineeringOrchestrator {
        FeatureEngineeringOrchestrator::new(self.deps())
    }

    pub fn feature_selection(&self) -> FeatureSelectionOrchestrator {
        FeatureSelectionOrchestrator::new(self.deps())
    }

    pub fn classical_training(&self) -> ClassicalTrainingOrchestrator {
        ClassicalTrainingOrchestrator::new(self.deps())
    }

    pub fn report_generation(&self) -> ReportGenerationOrchestrator {
        ReportGenerationOrchestrator::new(self.deps())
    }

    pub async fn seed_project(&self, task_type: TaskType) -> Project {
        self.store
            .create_project(NewProject {
                name: "churn-analysis".to_string(),
                description: None,
                task_type,
            })
            .await
            .expect("seed project")
    }

    /// A freshly uploaded classification dataset with target column and
    /// classical training configured.
    pub async fn seed_dataset(&self) -> Dataset {
        let project = self.seed_project(TaskType::Classification).await;
        self.seed_dataset_in(&project).await
    }

    pub async fn seed_dataset_in(&self, project: &Project) -> Dataset {
        let dataset = self
            .store
            .create_dataset(NewDataset {
                project_id: project.id,
                name: "churn".to_string(),
                description: None,
                file_key: format!("{}/churn.csv", project.id),
                format: "csv".to_string(),
                size_bytes: 2048,
            })
            .await
            .expect("seed dataset");
        self.store
            .update_dataset_settings(
                dataset.id,
                Some("label".to_string()),
                Some(TrainingType::Classical),
            )
            .await
            .expect("configure dataset")
    }

    pub async fn dataset(&self, id: Uuid) -> Dataset {
        self.store
            .dataset(id)
            .await
            .expect("load dataset")
            .expect("dataset exists")
    }

    /// Drive a dataset through completed profiling without the worker.
    pub async fn complete_profiling(&self, id: Uuid) {
        self.store
            .mark_stage_started(id, Stage::Profiling, DatasetStatus::Processing)
            .await
            .expect("start profiling");
        self.store
            .complete_stage(
                id,
                StageOutputs::Profiling {
                    metadata: json!({"rows": 100, "columns": 8}),
                    eda_key: Some("eda.html".to_string()),
                },
            )
            .await
            .expect("complete profiling");
    }

    pub async fn complete_engineering(&self, id: Uuid) {
        self.store
            .mark_stage_started(id, Stage::FeatureEngineering, DatasetStatus::Processing)
            .await
            .expect("start engineering");
        self.store
            .complete_stage(
                id,
                StageOutputs::FeatureEngineering {
                    metadata: json!({"scalers": {"age": "standard"}}),
                    engineered_key: Some("churn.engineered.csv".to_string()),
                    code_key: Some("fe_code.py".to_string()),
                    transformation_key: Some("ft_code.py".to_string()),
                    summary_key: Some("fe_summary.html".to_string()),
                },
            )
            .await
            .expect("complete engineering");
    }

    pub async fn complete_selection(&self, id: Uuid) {
        self.store
            .mark_stage_started(id, Stage::FeatureSelection, DatasetStatus::Processing)
            .await
            .expect("start selection");
        self.store
            .complete_stage(
                id,
                StageOutputs::FeatureSelection {
                    metadata: json!({"logs": [], "figure_data": {}}),
                    selected_columns: vec!["age".to_string(), "plan".to_string()],
                    transformed_key: Some("churn.selected.csv".to_string()),
                    summary_key: Some("fs_summary.html".to_string()),
                },
            )
            .await
            .expect("complete selection");
    }

    /// Everything upstream of classical training completed.
    pub async fn complete_preprocessing(&self, id: Uuid) {
        self.complete_profiling(id).await;
        self.complete_engineering(id).await;
        self.complete_selection(id).await;
    }
}

// -- worker result payload builders ------------------------------------

pub fn profiling_result(dataset_id: Uuid, eda_key: &str) -> Value {
    json!({
        "dataset_id": dataset_id.to_string(),
        "eda_object_name": eda_key,
        "summary": {"rows": 100},
    })
}

pub fn engineering_result(dataset_id: Uuid) -> Value {
    json!({
        "dataset_id": dataset_id.to_string(),
        "data_key": "churn.engineered.csv",
        "feature_engineering_code_key": "fe_code.py",
        "feature_transformation_code_key": "ft_code.py",
        "summary_key": "fe_summary.html",
        "learned_parameters": {"imputer": "median"},
    })
}

pub fn selection_result(dataset_id: Uuid) -> Value {
    json!({
        "dataset_id": dataset_id.to_string(),
        "selected_features": ["age", "plan"],
        "logs": ["dropped 3 collinear columns"],
        "figure_data": {"importance": [0.7, 0.3]},
        "transformed_data": "churn.selected.csv",
        "summary": "fs_summary.html",
    })
}

pub fn training_result(dataset_id: Uuid) -> Value {
    json!({
        "dataset_id": dataset_id.to_string(),
        "best_model_info": {
            "model_name": "xgboost",
            "model_uuid": "model-123.pkl",
            "test_set_performance": {"accuracy": "0.95"},
            "best_hyperparameters": {"max_depth": 6},
        },
        "all_models_performance": [{"model": "xgboost", "accuracy": "0.95"}],
    })
}

pub fn report_result(dataset_id: Uuid) -> Value {
    json!({
        "dataset_id": dataset_id.to_string(),
        "error": "",
        "html_key": "report.html",
        "pdf_key": "report.pdf",
    })
}
