//! # Stuck-Stage Watchdog
//!
//! A published request cannot be withdrawn and no worker heartbeat
//! exists, so a stage whose worker died would stay IN_PROGRESS forever.
//! The watchdog sweeps every stage periodically and fails any dataset
//! whose stage entered IN_PROGRESS before the configured deadline.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::state_machine::Stage;
use crate::store::EntityStore;

/// Error recorded on stages the watchdog fails.
pub const TIMED_OUT_ERROR: &str = "timed out";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WatchdogConfig {
    pub enabled: bool,
    /// Seconds between sweeps.
    pub sweep_interval_seconds: u64,
    /// Seconds a stage may stay IN_PROGRESS before it is failed.
    pub stage_deadline_seconds: i64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: 60,
            stage_deadline_seconds: 3600,
        }
    }
}

pub struct StageWatchdog {
    store: Arc<dyn EntityStore>,
    config: WatchdogConfig,
}

impl StageWatchdog {
    pub fn new(store: Arc<dyn EntityStore>, config: WatchdogConfig) -> Self {
        Self { store, config }
    }

    /// Run sweeps until shutdown is signalled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval = self.config.sweep_interval_seconds,
            deadline = self.config.stage_deadline_seconds,
            "stage watchdog running"
        );
        let interval = Duration::from_secs(self.config.sweep_interval_seconds);

        loop {
            if *shutdown_rx.borrow() {
                debug!("stage watchdog stopping");
                return;
            }

            if let Err(e) = self.sweep_once().await {
                warn!(error = %e, "watchdog sweep failed");
            }

            tokio::select! {
                _ = sleep(interval) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    /// One reconciliation pass over every stage. Returns how many stages
    /// were failed.
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.stage_deadline_seconds);
        let mut failed = 0;

        for stage in Stage::ALL {
            for dataset_id in self.store.stale_in_progress(stage, cutoff).await? {
                warn!(
                    stage = %stage,
                    dataset_id = %dataset_id,
                    deadline_seconds = self.config.stage_deadline_seconds,
                    "failing stage stuck past deadline"
                );
                self.store
                    .mark_stage_failed(dataset_id, stage, TIMED_OUT_ERROR)
                    .await?;
                failed += 1;
            }
        }

        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDataset, NewProject};
    use crate::state_machine::{DatasetStatus, StageStatus, TaskType};
    use crate::store::{EntityStore, InMemoryEntityStore};

    #[tokio::test]
    async fn test_sweep_fails_overdue_stage() {
        let store = Arc::new(InMemoryEntityStore::new());
        let project = store
            .create_project(NewProject {
                name: "p".to_string(),
                description: None,
                task_type: TaskType::Regression,
            })
            .await
            .unwrap();
        let dataset = store
            .create_dataset(NewDataset {
                project_id: project.id,
                name: "d".to_string(),
                description: None,
                file_key: "d.csv".to_string(),
                format: "csv".to_string(),
                size_bytes: 1,
            })
            .await
            .unwrap();
        store
            .mark_stage_started(dataset.id, Stage::Profiling, DatasetStatus::Processing)
            .await
            .unwrap();

        // Negative deadline: anything IN_PROGRESS is already overdue.
        let watchdog = StageWatchdog::new(
            store.clone(),
            WatchdogConfig {
                enabled: true,
                sweep_interval_seconds: 1,
                stage_deadline_seconds: -1,
            },
        );
        let failed = watchdog.sweep_once().await.unwrap();
        assert_eq!(failed, 1);

        let stored = store.dataset(dataset.id).await.unwrap().unwrap();
        assert_eq!(stored.profiling_status, StageStatus::Failed);
        assert_eq!(stored.profiling_error, TIMED_OUT_ERROR);
    }

    #[tokio::test]
    async fn test_sweep_ignores_fresh_stages() {
        let store = Arc::new(InMemoryEntityStore::new());
        let project = store
            .create_project(NewProject {
                name: "p".to_string(),
                description: None,
                task_type: TaskType::Regression,
            })
            .await
            .unwrap();
        let dataset = store
            .create_dataset(NewDataset {
                project_id: project.id,
                name: "d".to_string(),
                description: None,
                file_key: "d.csv".to_string(),
                format: "csv".to_string(),
                size_bytes: 1,
            })
            .await
            .unwrap();
        store
            .mark_stage_started(dataset.id, Stage::Profiling, DatasetStatus::Processing)
            .await
            .unwrap();

        let watchdog = StageWatchdog::new(store.clone(), WatchdogConfig::default());
        assert_eq!(watchdog.sweep_once().await.unwrap(), 0);

        let stored = store.dataset(dataset.id).await.unwrap().unwrap();
        assert_eq!(stored.profiling_status, StageStatus::InProgress);
    }
}
