//! # Stage Orchestrator Contract
//!
//! The shared contract every stage instance implements, plus the helpers
//! the five orchestrators delegate to: dataset/project loading, the
//! canonical start guard, acknowledged publishing, the FAILED-then-raise
//! result error path, and artifact URL resolution for polling.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::messaging::{codec, QueueGateway};
use crate::models::{Dataset, Project};
use crate::state_machine::{Stage, StageStatus};
use crate::storage::ObjectStorage;
use crate::store::EntityStore;

/// Synchronous acknowledgement returned by `start`. The job itself
/// completes asynchronously; callers observe it through `poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartAck {
    pub dataset_id: Uuid,
    pub stage: Stage,
    pub message: String,
}

impl StartAck {
    pub fn new(stage: Stage, dataset_id: Uuid) -> Self {
        Self {
            dataset_id,
            stage,
            message: format!("{stage} started for dataset {dataset_id}"),
        }
    }
}

/// Read-only stage progress. Artifact URLs are present only when the
/// stage is COMPLETED and its output keys exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePoll {
    pub stage: Stage,
    pub status: StageStatus,
    pub error: String,
    pub artifacts: BTreeMap<String, String>,
}

/// One pipeline stage: publish jobs, apply results, report progress.
#[async_trait]
pub trait StageOrchestrator: Send + Sync {
    fn stage(&self) -> Stage;

    /// Validate preconditions, publish the job request, and flip the
    /// stage to IN_PROGRESS. Never waits for the worker.
    async fn start(&self, dataset_id: Uuid) -> Result<StartAck>;

    /// Apply one decoded-or-raw worker result to the persisted record.
    async fn handle_result(&self, raw: Value) -> Result<()>;

    /// Read-only progress, resolving artifact URLs for completed work.
    async fn poll(&self, dataset_id: Uuid) -> Result<StagePoll>;
}

pub(crate) async fn load_dataset(store: &dyn EntityStore, id: Uuid) -> Result<Dataset> {
    store
        .dataset(id)
        .await?
        .ok_or_else(|| PipelineError::dataset_not_found(id))
}

pub(crate) async fn load_project(store: &dyn EntityStore, dataset: &Dataset) -> Result<Project> {
    store
        .project(dataset.project_id)
        .await?
        .ok_or_else(|| PipelineError::not_found("Project", dataset.project_id))
}

/// Canonical start guard: a stage that is IN_PROGRESS can never be
/// started again; anything else may (re-)enter the pipeline.
pub(crate) fn ensure_stage_can_start(dataset: &Dataset, stage: Stage) -> Result<()> {
    let status = dataset.stage_status(stage);
    if !status.can_start() {
        return Err(PipelineError::validation(format!(
            "{stage} is already in progress for dataset {}",
            dataset.id
        )));
    }
    Ok(())
}

/// The target column must be configured before any worker payload can be
/// built around it.
pub(crate) fn require_target_column(dataset: &Dataset) -> Result<String> {
    dataset.target_column.clone().ok_or_else(|| {
        PipelineError::validation(format!(
            "dataset {} has no target column configured",
            dataset.id
        ))
    })
}

/// An upstream stage the current one consumes must have completed.
pub(crate) fn require_upstream_completed(
    dataset: &Dataset,
    upstream: Stage,
    downstream: Stage,
) -> Result<()> {
    if dataset.stage_status(upstream) != StageStatus::Completed {
        return Err(PipelineError::validation(format!(
            "dataset {} must complete {upstream} before {downstream} can start",
            dataset.id
        )));
    }
    Ok(())
}

/// Storage key of the artifact the stage consumes; missing means the
/// upstream stage never recorded its output.
pub(crate) fn require_input_key(dataset: &Dataset, stage: Stage) -> Result<String> {
    dataset
        .stage_input_key(stage)
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::validation(format!(
                "dataset {} has no input artifact for {stage}",
                dataset.id
            ))
        })
}

/// Encode and publish a request, awaiting broker acknowledgement.
pub(crate) async fn publish_request<T: Serialize>(
    gateway: &dyn QueueGateway,
    stage: Stage,
    payload: &T,
) -> Result<()> {
    let value = codec::encode(payload)?;
    let msg_id = gateway.publish(stage.request_queue(), &value).await?;
    info!(stage = %stage, queue = stage.request_queue(), msg_id = msg_id, "job request published");
    Ok(())
}

/// Result-application error path: record the failure on the stage, then
/// re-raise as a domain-processing error for the binding layer to log
/// and retry. A failing failure-write is logged and swallowed; the
/// re-raised error already carries the story.
pub(crate) async fn fail_stage_and_raise(
    store: &dyn EntityStore,
    stage: Stage,
    dataset_id: Uuid,
    err: PipelineError,
) -> PipelineError {
    let message = err.to_string();
    if let Err(mark_err) = store.mark_stage_failed(dataset_id, stage, &message).await {
        debug!(
            stage = %stage,
            dataset_id = %dataset_id,
            error = %mark_err,
            "could not record stage failure"
        );
    }
    PipelineError::domain_processing(stage, message)
}

/// Shared poll for stages whose artifacts live on the dataset record.
pub(crate) async fn poll_dataset_stage(
    store: &dyn EntityStore,
    storage: &dyn ObjectStorage,
    dataset_id: Uuid,
    stage: Stage,
) -> Result<StagePoll> {
    let dataset = load_dataset(store, dataset_id).await?;
    let status = dataset.stage_status(stage);

    let mut artifacts = BTreeMap::new();
    if status == StageStatus::Completed {
        for (name, key) in dataset.stage_output_keys(stage) {
            let url = storage.resolve_key_to_url(&key).await?;
            artifacts.insert(name.to_string(), url);
        }
    }

    Ok(StagePoll {
        stage,
        status,
        error: dataset.stage_error(stage).to_string(),
        artifacts,
    })
}

/// Dependency bundle shared by the five orchestrators.
#[derive(Clone)]
pub struct StageDeps {
    pub store: Arc<dyn EntityStore>,
    pub gateway: Arc<dyn QueueGateway>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl StageDeps {
    pub fn new(
        store: Arc<dyn EntityStore>,
        gateway: Arc<dyn QueueGateway>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            store,
            gateway,
            storage,
        }
    }
}
