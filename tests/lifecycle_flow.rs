//! Assembly-level tests: bootstrap wiring, consumer delivery through the
//! gateway, dead-letter routing for transient failures, and shutdown.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use mlforge_core::constants::queues::dead_letter_queue;
use mlforge_core::orchestration::{
    PipelineCore, PipelineCoreConfig, StageOrchestrator, WatchdogConfig,
};
use mlforge_core::services::DatasetUpload;
use mlforge_core::state_machine::{Stage, StageStatus, TaskType, TrainingType};

fn assembly_config() -> PipelineCoreConfig {
    PipelineCoreConfig {
        watchdog: WatchdogConfig {
            enabled: false,
            ..WatchdogConfig::default()
        },
    }
}

async fn bootstrap(harness: &Harness) -> PipelineCore {
    PipelineCore::bootstrap_with(
        harness.store.clone(),
        harness.gateway.clone(),
        harness.storage.clone(),
        assembly_config(),
    )
    .await
    .expect("bootstrap")
}

#[tokio::test]
async fn test_full_pipeline_through_bound_consumers() {
    let harness = Harness::new();
    let core = bootstrap(&harness).await;

    // Upload through the dataset service, then configure for training.
    let project = harness.seed_project(TaskType::Classification).await;
    let dataset = core
        .datasets()
        .create(DatasetUpload {
            project_id: project.id,
            name: "churn".to_string(),
            description: None,
            format: "csv".to_string(),
            file_name: "churn.csv".to_string(),
            bytes: b"age,plan,label\n34,pro,1".to_vec(),
        })
        .await
        .unwrap();
    core.datasets()
        .configure(
            dataset.id,
            Some("label".to_string()),
            Some(TrainingType::Classical),
        )
        .await
        .unwrap();

    // Profiling: start, then the worker result arrives on the result queue.
    core.orchestrator(Stage::Profiling)
        .start(dataset.id)
        .await
        .unwrap();
    harness
        .gateway
        .deliver(
            Stage::Profiling.result_queue(),
            profiling_result(dataset.id, "eda.html"),
        )
        .await
        .unwrap();

    core.orchestrator(Stage::FeatureEngineering)
        .start(dataset.id)
        .await
        .unwrap();
    harness
        .gateway
        .deliver(
            Stage::FeatureEngineering.result_queue(),
            engineering_result(dataset.id),
        )
        .await
        .unwrap();

    core.orchestrator(Stage::FeatureSelection)
        .start(dataset.id)
        .await
        .unwrap();
    harness
        .gateway
        .deliver(
            Stage::FeatureSelection.result_queue(),
            selection_result(dataset.id),
        )
        .await
        .unwrap();

    core.orchestrator(Stage::ClassicalTraining)
        .start(dataset.id)
        .await
        .unwrap();
    harness
        .gateway
        .deliver(
            Stage::ClassicalTraining.result_queue(),
            training_result(dataset.id),
        )
        .await
        .unwrap();

    core.orchestrator(Stage::ReportGeneration)
        .start(dataset.id)
        .await
        .unwrap();
    harness
        .gateway
        .deliver(
            Stage::ReportGeneration.result_queue(),
            report_result(dataset.id),
        )
        .await
        .unwrap();

    // Every stage settled COMPLETED; the report is pollable.
    let stored = harness.dataset(dataset.id).await;
    for stage in Stage::ALL {
        assert_eq!(stored.stage_status(stage), StageStatus::Completed, "{stage}");
        assert_eq!(stored.stage_error(stage), "", "{stage}");
    }
    let poll = core
        .orchestrator(Stage::ReportGeneration)
        .poll(dataset.id)
        .await
        .unwrap();
    assert_eq!(
        poll.artifacts.get("report_html").map(String::as_str),
        Some("memory://report.html")
    );

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_result_is_dropped_not_dead_lettered() {
    let harness = Harness::new();
    let core = bootstrap(&harness).await;

    harness
        .gateway
        .deliver_with_redelivery(
            Stage::Profiling.result_queue(),
            json!({"eda_object_name": "eda.html"}),
        )
        .await;

    let dlq = dead_letter_queue(Stage::Profiling.result_queue());
    assert!(harness.gateway.published(&dlq).is_empty());

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_transient_failure_routes_to_dead_letter_queue() {
    let harness = Harness::new();
    let core = bootstrap(&harness).await;
    let dataset = harness.seed_dataset().await;
    harness.profiling().start(dataset.id).await.unwrap();

    // Store outage across every redelivery attempt.
    harness.store.fail_result_writes(true);
    let payload = profiling_result(dataset.id, "eda.html");
    harness
        .gateway
        .deliver_with_redelivery(Stage::Profiling.result_queue(), payload.clone())
        .await;

    let dlq = dead_letter_queue(Stage::Profiling.result_queue());
    assert_eq!(harness.gateway.published(&dlq), vec![payload]);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watchdog_fails_stuck_stage_in_assembly() {
    let harness = Harness::new();
    let core = PipelineCore::bootstrap_with(
        harness.store.clone(),
        harness.gateway.clone(),
        harness.storage.clone(),
        PipelineCoreConfig {
            watchdog: WatchdogConfig {
                enabled: true,
                sweep_interval_seconds: 1,
                // Negative deadline: IN_PROGRESS is overdue immediately.
                stage_deadline_seconds: -1,
            },
        },
    )
    .await
    .unwrap();

    let dataset = harness.seed_dataset().await;
    harness.profiling().start(dataset.id).await.unwrap();

    // The first sweep may have raced the start; the next one, after the
    // one-second interval, must catch the stuck stage.
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    let stored = harness.dataset(dataset.id).await;
    assert_eq!(stored.profiling_status, StageStatus::Failed);
    assert_eq!(stored.profiling_error, "timed out");

    // A timed-out stage is retryable.
    harness.profiling().start(dataset.id).await.unwrap();

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_unbinds_consumers() {
    let harness = Harness::new();
    let core = bootstrap(&harness).await;
    core.shutdown().await.unwrap();

    let err = harness
        .gateway
        .deliver(Stage::Profiling.result_queue(), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        mlforge_core::error::PipelineError::Configuration { .. }
    ));
}
