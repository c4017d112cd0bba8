//! # Feature Selection Stage
//!
//! Consumes the engineered dataset and records the selected column list,
//! the transformed dataset, the summary report and the worker's
//! selection context (logs and figure data).

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
    require_dataset_id, FeatureSelectionRequest, FeatureSelectionResult,
};
use crate::state_machine::{DatasetStatus, Stage};
use crate::store::StageOutputs;

pub struct FeatureSelectionOrchestrator {
    deps: StageDeps,
}

impl FeatureSelectionOrchestrator {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StageOrchestrator for FeatureSelectionOrchestrator {
    fn stage(&self) -> Stage {
        Stage::FeatureSelection
    }

    async fn start(&self, dataset_id: Uuid) -> Result<StartAck> {
        let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;
        let project = load_project(self.deps.store.as_ref(), &dataset).await?;

        require_upstream_completed(&dataset, Stage::FeatureEngineering, Stage::FeatureSelection)?;
        let target_column = require_target_column(&dataset)?;
        let dataset_key = require_input_key(&dataset, Stage::FeatureSelection)?;
        ensure_stage_can_start(&dataset, Stage::FeatureSelection)?;

        let payload = FeatureSelectionRequest {
            dataset_id,
            dataset_key,
            task_type: project.task_type.as_payload().to_string(),
            target_column,
        };
        publish_request(
            self.deps.gateway.as_ref(),
            Stage::FeatureSelection,
            &payload,
        )
        .await?;

        self.deps
            .store
            .mark_stage_started(
                dataset_id,
                Stage::FeatureSelection,
                DatasetStatus::Processing,
            )
            .await?;

        Ok(StartAck::new(Stage::FeatureSelection, dataset_id))
    }

    async fn handle_result(&self, raw: Value) -> Result<()> {
        let decoded = codec::decode(raw);
        let dataset_id = require_dataset_id(&decoded)?;

        let report: FeatureSelectionResult = serde_json::from_value(decoded)
            .map_err(|e| PipelineError::malformed_result(e.to_string()))?;

        let outputs = StageOutputs::FeatureSelection {
            metadata: selection_context(&report),
            selected_columns: report.selected_features,
            transformed_key: report.transformed_data,
            summary_key: report.summary,
        };

        match self.deps.store.complete_stage(dataset_id, outputs).await {
            Ok(()) => {
                info!(dataset_id = %dataset_id, "feature selection result applied");
                Ok(())
            }
            Err(err) => Err(fail_stage_and_raise(
                self.deps.store.as_ref(),
                Stage::FeatureSelection,
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
            Stage::FeatureSelection,
        )
        .await
    }
}

/// Selection metadata keeps the worker's logs and figure data together.
fn selection_context(report: &FeatureSelectionResult) -> Value {
    json!({
        "logs": report.logs,
        "figure_data": report.figure_data,
    })
}
