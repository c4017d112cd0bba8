//! # Feature Engineering Stage
//!
//! Consumes the uploaded dataset plus the profiling report and records
//! the engineered dataset, the generated engineering/transformation code
//! artifacts, the summary report and the learned parameters.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::stage::{
    ensure_stage_can_start, fail_stage_and_raise, load_dataset, load_project, poll_dataset_stage,
    publish_request, require_target_column, require_upstream_completed, StageDeps,
    StageOrchestrator, StagePoll, StartAck,
};
use crate::error::{PipelineError, Result};
use crate::messaging::codec;
use crate::messaging::payloads::{
    require_dataset_id, FeatureEngineeringRequest, FeatureEngineeringResult,
};
use crate::state_machine::{DatasetStatus, Stage};
use crate::store::StageOutputs;

pub struct FeatureEngineeringOrchestrator {
    deps: StageDeps,
}

impl FeatureEngineeringOrchestrator {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StageOrchestrator for FeatureEngineeringOrchestrator {
    fn stage(&self) -> Stage {
        Stage::FeatureEngineering
    }

    async fn start(&self, dataset_id: Uuid) -> Result<StartAck> {
        let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;
        let project = load_project(self.deps.store.as_ref(), &dataset).await?;

        require_upstream_completed(&dataset, Stage::Profiling, Stage::FeatureEngineering)?;
        let target_column = require_target_column(&dataset)?;
        ensure_stage_can_start(&dataset, Stage::FeatureEngineering)?;

        let payload = FeatureEngineeringRequest {
            dataset_id,
            dataset_key: dataset.file_key.clone(),
            task_type: project.task_type.as_payload().to_string(),
            target_column,
            json_str: dataset.profiling_metadata.clone().unwrap_or(Value::Null),
        };
        publish_request(
            self.deps.gateway.as_ref(),
            Stage::FeatureEngineering,
            &payload,
        )
        .await?;

        self.deps
            .store
            .mark_stage_started(
                dataset_id,
                Stage::FeatureEngineering,
                DatasetStatus::Processing,
            )
            .await?;

        Ok(StartAck::new(Stage::FeatureEngineering, dataset_id))
    }

    async fn handle_result(&self, raw: Value) -> Result<()> {
        let decoded = codec::decode(raw);
        let dataset_id = require_dataset_id(&decoded)?;

        let report: FeatureEngineeringResult = serde_json::from_value(decoded)
            .map_err(|e| PipelineError::malformed_result(e.to_string()))?;

        let outputs = StageOutputs::FeatureEngineering {
            metadata: report.learned_parameters,
            engineered_key: report.data_key,
            code_key: report.feature_engineering_code_key,
            transformation_key: report.feature_transformation_code_key,
            summary_key: report.summary_key,
        };

        match self.deps.store.complete_stage(dataset_id, outputs).await {
            Ok(()) => {
                info!(dataset_id = %dataset_id, "feature engineering result applied");
                Ok(())
            }
            Err(err) => Err(fail_stage_and_raise(
                self.deps.store.as_ref(),
                Stage::FeatureEngineering,
                dataset_id,
                err,
            )
            .await),
        }
    }

    async fn poll(&self, dataset_id: Uuid) -> Result<StagePoll> {
        poll_dataset_stage(
            self.deps.store.as_ref(),
            self.deps.storage.as_ref(),
            dataset_id,
            Stage::FeatureEngineering,
        )
        .await
    }
}
