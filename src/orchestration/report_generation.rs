//! # Report Generation Stage
//!
//! Ships the accumulated stage metadata and model training context to
//! the report worker. The worker reports failures in-band: a non-empty
//! `error` string marks the stage FAILED instead of creating a report
//! row. Successful results create (or replace) the dataset's report in
//! the same transaction as the status flip.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::stage::{
    ensure_stage_can_start, fail_stage_and_raise, load_dataset, poll_dataset_stage,
    publish_request, StageDeps, StageOrchestrator, StagePoll, StartAck,
};
use crate::error::{PipelineError, Result};
use crate::messaging::codec;
use crate::messaging::payloads::{
    require_dataset_id, ModelTrainingContext, ReportGenerationRequest, ReportGenerationResult,
};
use crate::models::NewReport;
use crate::state_machine::{DatasetStatus, Stage, StageStatus};

pub struct ReportGenerationOrchestrator {
    deps: StageDeps,
}

impl ReportGenerationOrchestrator {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StageOrchestrator for ReportGenerationOrchestrator {
    fn stage(&self) -> Stage {
        Stage::ReportGeneration
    }

    async fn start(&self, dataset_id: Uuid) -> Result<StartAck> {
        let dataset = load_dataset(self.deps.store.as_ref(), dataset_id).await?;

        let models = self
            .deps
            .store
            .models_for_project(dataset.project_id)
            .await?;
        if models.is_empty() {
            return Err(PipelineError::validation(format!(
                "dataset {dataset_id} has no trained models to generate a report from"
            )));
        }
        ensure_stage_can_start(&dataset, Stage::ReportGeneration)?;

        let empty = || Value::String(String::new());
        let payload = ReportGenerationRequest {
            dataset_id,
            profiling_context: dataset.profiling_metadata.clone().unwrap_or_else(empty),
            feature_engineering_context: dataset.engineering_metadata.clone().unwrap_or_else(empty),
            feature_selection_context: dataset.selection_metadata.clone().unwrap_or_else(empty),
            model_training_context: ModelTrainingContext {
                models: models
                    .iter()
                    .map(|m| m.training_metadata.clone().unwrap_or(Value::Null))
                    .collect(),
            },
        };
        publish_request(
            self.deps.gateway.as_ref(),
            Stage::ReportGeneration,
            &payload,
        )
        .await?;

        self.deps
            .store
            .mark_stage_started(dataset_id, Stage::ReportGeneration, DatasetStatus::Ready)
            .await?;

        Ok(StartAck::new(Stage::ReportGeneration, dataset_id))
    }

    async fn handle_result(&self, raw: Value) -> Result<()> {
        let decoded = codec::decode(raw);
        let dataset_id = require_dataset_id(&decoded)?;

        let report: ReportGenerationResult = serde_json::from_value(decoded)
            .map_err(|e| PipelineError::malformed_result(e.to_string()))?;

        // Worker-reported failure: mark FAILED, create nothing. This is a
        // valid outcome, not an error of ours.
        if !report.error.trim().is_empty() {
            return match self
                .deps
                .store
                .mark_stage_failed(dataset_id, Stage::ReportGeneration, report.error.trim())
                .await
            {
                Ok(()) => {
                    info!(dataset_id = %dataset_id, "report generation failed by worker");
                    Ok(())
                }
                Err(err) => Err(PipelineError::domain_processing(
                    Stage::ReportGeneration,
                    err.to_string(),
                )),
            };
        }

        let new_report = NewReport {
            dataset_id,
            html_key: report.html_key.unwrap_or_default(),
            pdf_key: report.pdf_key.unwrap_or_default(),
        };

        match self.deps.store.complete_report(dataset_id, new_report).await {
            Ok(_) => {
                info!(dataset_id = %dataset_id, "report generation result applied");
                Ok(())
            }
            Err(err) => Err(fail_stage_and_raise(
                self.deps.store.as_ref(),
                Stage::ReportGeneration,
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
            Stage::ReportGeneration,
        )
        .await?;

        // Report artifacts live on the report row.
        if poll.status == StageStatus::Completed {
            if let Some(report) = self.deps.store.report_for_dataset(dataset_id).await? {
                if !report.html_key.is_empty() {
                    let url = self
                        .deps
                        .storage
                        .resolve_key_to_url(&report.html_key)
                        .await?;
                    poll.artifacts.insert("report_html".to_string(), url);
                }
                if !report.pdf_key.is_empty() {
                    let url = self.deps.storage.resolve_key_to_url(&report.pdf_key).await?;
                    poll.artifacts.insert("report_pdf".to_string(), url);
                }
            }
        }

        Ok(poll)
    }
}
