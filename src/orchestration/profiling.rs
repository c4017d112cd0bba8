//! # Profiling Stage
//!
//! First pipeline stage: ships the uploaded dataset to the profiling
//! worker and records the EDA report it produces. The whole worker
//! report is kept as profiling metadata; downstream feature engineering
//! forwards it to its own worker.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::stage::{
    ensure_stage_can_start, fail_stage_and_raise, load_dataset, load_project, poll_dataset_stage,
    publish_request, require_target_column, StageDeps, StageOrchestrator, StagePoll, StartAck,
};
use crate::error::Result;
use crate::messaging::codec;
use crate::messaging::payloads::{require_dataset_id, ProfilingRequest, ProfilingResult};
use crate::state_machine::{DatasetStatus, Stage};
use crate::store::StageOutputs;

/// Fallback artifact name when a worker report omits the EDA key.
const MISSING_EDA_KEY: &str = "N/A";

pub struct ProfilingOrchestrator {
    deps: StageDeps,
}

impl ProfilingOrchestrator {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StageOrchestrator for ProfilingOrchestrator {
    fn stage(&self) -> Stage {
        Stage::Profiling
    }

    async fn start(&self, dataset_id: Uuid) -> Result<StartAck> {
        let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;
        let project = load_project(self.deps.store.as_ref(), &dataset).await?;

        let target_column = require_target_column(&dataset)?;
        ensure_stage_can_start(&dataset, Stage::Profiling)?;

        let payload = ProfilingRequest {
            dataset_id,
            dataset_key: dataset.file_key.clone(),
            task_type: project.task_type.as_payload().to_string(),
            target_column,
        };
        publish_request(self.deps.gateway.as_ref(), Stage::Profiling, &payload).await?;

        self.deps
            .store
            .mark_stage_started(dataset_id, Stage::Profiling, DatasetStatus::Processing)
            .await?;

        Ok(StartAck::new(Stage::Profiling, dataset_id))
    }

    async fn handle_result(&self, raw: Value) -> Result<()> {
        let decoded = codec::decode(raw);
        let dataset_id = require_dataset_id(&decoded)?;

        let report: ProfilingResult = serde_json::from_value(decoded.clone())
            .map_err(|e| crate::error::PipelineError::malformed_result(e.to_string()))?;
        let eda_key = report
            .eda_object_name
            .unwrap_or_else(|| MISSING_EDA_KEY.to_string());

        let outputs = StageOutputs::Profiling {
            metadata: decoded,
            eda_key: Some(eda_key),
        };

        match self.deps.store.complete_stage(dataset_id, outputs).await {
            Ok(()) => {
                info!(dataset_id = %dataset_id, "profiling result applied");
                Ok(())
            }
            Err(err) => Err(fail_stage_and_raise(
                self.deps.store.as_ref(),
                Stage::Profiling,
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
            Stage::Profiling,
        )
        .await
    }
}
