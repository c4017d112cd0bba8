//! # Classical Training Stage
//!
//! Final modeling stage for classically trained projects. Requires the
//! whole preprocessing chain to have completed, ships the
//! feature-selected dataset to the training worker, and turns the
//! winning-model envelope of the result into a Model row — created in
//! the same transaction as the status flip, upserting on the artifact
//! key so redelivered results never duplicate.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::stage::{
    ensure_stage_can_start, fail_stage_and_raise, load_dataset, load_project, poll_dataset_stage,
    publish_request, require_input_key, require_target_column, require_upstream_completed,
    StageDeps, StageOrchestrator, StagePoll, StartAck,
};
use crate::error::{PipelineError, Result};
use crate::messaging::codec;
use crate::messaging::payloads::{
    metric_value_string, require_dataset_id, ClassicalTrainingRequest, ClassicalTrainingResult,
};
use crate::models::trained_model::{MetricEntry, NewTrainedModel};
use crate::state_machine::{DatasetStatus, Stage, TrainingType};

pub struct ClassicalTrainingOrchestrator {
    deps: StageDeps,
}

impl ClassicalTrainingOrchestrator {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StageOrchestrator for ClassicalTrainingOrchestrator {
    fn stage(&self) -> Stage {
        Stage::ClassicalTraining
    }

    async fn start(&self, dataset_id: Uuid) -> Result<StartAck> {
        let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;
        let project = load_project(self.deps.store.as_ref(), &dataset).await?;

        if dataset.training_type != Some(TrainingType::Classical) {
            return Err(PipelineError::validation(format!(
                "dataset {dataset_id} must have training type CLASSICAL to start classical training"
            )));
        }
        require_upstream_completed(&dataset, Stage::Profiling, Stage::ClassicalTraining)?;
        require_upstream_completed(&dataset, Stage::FeatureEngineering, Stage::ClassicalTraining)?;
        require_upstream_completed(&dataset, Stage::FeatureSelection, Stage::ClassicalTraining)?;
        let target_column = require_target_column(&dataset)?;
        let dataset_key = require_input_key(&dataset, Stage::ClassicalTraining)?;
        ensure_stage_can_start(&dataset, Stage::ClassicalTraining)?;

        let payload = ClassicalTrainingRequest {
            dataset_id,
            dataset_key,
            task_type: project.task_type.as_payload().to_string(),
            target_column,
        };
        publish_request(
            self.deps.gateway.as_ref(),
            Stage::ClassicalTraining,
            &payload,
        )
        .await?;

        self.deps
            .store
            .mark_stage_started(dataset_id, Stage::ClassicalTraining, DatasetStatus::Ready)
            .await?;

        Ok(StartAck::new(Stage::ClassicalTraining, dataset_id))
    }

    async fn handle_result(&self, raw: Value) -> Result<()> {
        let decoded = codec::decode(raw);
        let dataset_id = require_dataset_id(&decoded)?;

        // Keep the raw envelope for the metadata blob before shaping it.
        let raw_best_model = decoded.get("best_model_info").cloned().unwrap_or(Value::Null);
        let raw_all_models = decoded
            .get("all_models_performance")
            .cloned()
            .unwrap_or(Value::Null);

        let report: ClassicalTrainingResult = serde_json::from_value(decoded)
            .map_err(|e| PipelineError::malformed_result(e.to_string()))?;

        let model = match self.build_model(dataset_id, &report, raw_best_model, raw_all_models).await
        {
            Ok(model) => model,
            Err(err) => {
                return Err(fail_stage_and_raise(
                    self.deps.store.as_ref(),
                    Stage::ClassicalTraining,
                    dataset_id,
                    err,
                )
                .await)
            }
        };

        match self.deps.store.complete_training(dataset_id, model).await {
            Ok(stored) => {
                info!(
                    dataset_id = %dataset_id,
                    model = %stored.name,
                    "classical training result applied"
                );
                Ok(())
            }
            Err(err) => Err(fail_stage_and_raise(
                self.deps.store.as_ref(),
                Stage::ClassicalTraining,
                dataset_id,
                err,
            )
            .await),
        }
    }

    async fn poll(&self, dataset_id: Uuid) -> Result<StagePoll> {
        let mut poll = poll_dataset_stage(
            self.deps.store.as_ref(),
            self.deps.storage.as_ref(),
            dataset_id,
            Stage::ClassicalTraining,
        )
        .await?;

        // Training artifacts live on the project's model rows.
        if poll.status == crate::state_machine::StageStatus::Completed {
            let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;
            let models = self
                .deps
                .store
                .models_for_project(dataset.project_id)
                .await?;
            for model in models {
                let url = self
                    .deps
                    .storage
                    .resolve_key_to_url(&model.model_key)
                    .await?;
                poll.artifacts.insert(format!("model:{}", model.name), url);
            }
        }

        Ok(poll)
    }
}

impl ClassicalTrainingOrchestrator {
    /// Shape the worker's winning-model envelope into a model row.
    async fn build_model(
        &self,
        dataset_id: Uuid,
        report: &ClassicalTrainingResult,
        raw_best_model: Value,
        raw_all_models: Value,
    ) -> Result<NewTrainedModel> {
        let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;
        let project = load_project(self.deps.store.as_ref(), &dataset).await?;

        let info = &report.best_model_info;
        Ok(NewTrainedModel {
            project_id: project.id,
            name: info.model_name.clone(),
            description: Some(format!(
                "Classical model generated named: {} for a {}",
                info.model_name, project.task_type
            )),
            training_type: TrainingType::Classical,
            model_key: info.model_uuid.clone(),
            performance: metric_entries(&info.test_set_performance),
            hyperparameters: metric_entries(&info.best_hyperparameters),
            training_metadata: Some(json!({
                "best_model_info": raw_best_model,
                "all_models_performance": raw_all_models,
            })),
        })
    }
}

fn metric_entries(map: &serde_json::Map<String, Value>) -> Vec<MetricEntry> {
    map.iter()
        .map(|(metric, value)| MetricEntry::new(metric.clone(), metric_value_string(value)))
        .collect()
}
