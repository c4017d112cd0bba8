//! # Pipeline Bootstrap
//!
//! One explicitly owned assembly of the orchestration core: connection
//! pool, migrations, queue gateway, the five orchestrators, their bound
//! result consumers, and the stuck-stage watchdog — with a cooperative
//! shutdown that stops consumer tasks and the watchdog before releasing
//! the broker connection.
//!
//! The object storage collaborator is injected: concrete adapters live
//! outside this crate.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::classical_training::ClassicalTrainingOrchestrator;
use super::consumer::StageResultConsumer;
use super::feature_engineering::FeatureEngineeringOrchestrator;
use super::feature_selection::FeatureSelectionOrchestrator;
use super::profiling::ProfilingOrchestrator;
use super::report_generation::ReportGenerationOrchestrator;
use super::stage::{StageDeps, StageOrchestrator};
use super::watchdog::{StageWatchdog, WatchdogConfig};
use crate::config::CoreConfig;
use crate::error::{PipelineError, Result};
use crate::messaging::{PgmqGateway, QueueGateway};
use crate::services::DatasetService;
use crate::state_machine::Stage;
use crate::storage::ObjectStorage;
use crate::store::{EntityStore, PgEntityStore};

/// Wiring inputs for [`PipelineCore::bootstrap_with`].
#[derive(Clone)]
pub struct PipelineCoreConfig {
    pub watchdog: WatchdogConfig,
}

impl Default for PipelineCoreConfig {
    fn default() -> Self {
        Self {
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// The assembled orchestration core.
pub struct PipelineCore {
    orchestrators: HashMap<Stage, Arc<dyn StageOrchestrator>>,
    datasets: DatasetService,
    gateway: Arc<dyn QueueGateway>,
    shutdown_tx: watch::Sender<bool>,
    watchdog_handle: Option<JoinHandle<()>>,
}

impl PipelineCore {
    /// Full production bootstrap: connect the store, run migrations,
    /// connect the gateway, bind every consumer, start the watchdog.
    pub async fn bootstrap(
        config: &CoreConfig,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self> {
        info!("bootstrapping pipeline core");

        let store = PgEntityStore::connect(&config.database.url, config.database.pool).await?;
        store.migrate().await?;
        let store: Arc<dyn EntityStore> = Arc::new(store);

        let gateway =
            PgmqGateway::connect(&config.database.url, config.broker.clone()).await?;
        let gateway: Arc<dyn QueueGateway> = Arc::new(gateway);

        Self::bootstrap_with(
            store,
            gateway,
            storage,
            PipelineCoreConfig {
                watchdog: config.watchdog.clone(),
            },
        )
        .await
    }

    /// Assemble on injected collaborators. Tests and local development
    /// pass the in-memory store/gateway/storage here.
    pub async fn bootstrap_with(
        store: Arc<dyn EntityStore>,
        gateway: Arc<dyn QueueGateway>,
        storage: Arc<dyn ObjectStorage>,
        config: PipelineCoreConfig,
    ) -> Result<Self> {
        let deps = StageDeps::new(store.clone(), gateway.clone(), storage.clone());

        let mut orchestrators: HashMap<Stage, Arc<dyn StageOrchestrator>> = HashMap::new();
        orchestrators.insert(
            Stage::Profiling,
            Arc::new(ProfilingOrchestrator::new(deps.clone())),
        );
        orchestrators.insert(
            Stage::FeatureEngineering,
            Arc::new(FeatureEngineeringOrchestrator::new(deps.clone())),
        );
        orchestrators.insert(
            Stage::FeatureSelection,
            Arc::new(FeatureSelectionOrchestrator::new(deps.clone())),
        );
        orchestrators.insert(
            Stage::ClassicalTraining,
            Arc::new(ClassicalTrainingOrchestrator::new(deps.clone())),
        );
        orchestrators.insert(
            Stage::ReportGeneration,
            Arc::new(ReportGenerationOrchestrator::new(deps.clone())),
        );

        // One result consumer per stage, bound at process start.
        for stage in Stage::ALL {
            let orchestrator = orchestrators
                .get(&stage)
                .cloned()
                .ok_or_else(|| PipelineError::configuration(format!("missing {stage}")))?;
            StageResultConsumer::new(orchestrator)
                .bind(gateway.as_ref())
                .await?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watchdog_handle = if config.watchdog.enabled {
            let watchdog = StageWatchdog::new(store.clone(), config.watchdog.clone());
            Some(tokio::spawn(watchdog.run(shutdown_rx)))
        } else {
            None
        };

        info!("pipeline core ready");
        Ok(Self {
            orchestrators,
            datasets: DatasetService::new(store, storage),
            gateway,
            shutdown_tx,
            watchdog_handle,
        })
    }

    /// The orchestrator for one stage.
    pub fn orchestrator(&self, stage: Stage) -> Arc<dyn StageOrchestrator> {
        // Every stage is inserted at bootstrap; the map is total.
        self.orchestrators[&stage].clone()
    }

    /// Dataset lifecycle operations (upload, configure, remove).
    pub fn datasets(&self) -> &DatasetService {
        &self.datasets
    }

    /// Stop the watchdog and every consumer task, then release the
    /// broker connection.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down pipeline core");
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.watchdog_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "watchdog task ended abnormally");
            }
        }

        self.gateway.shutdown().await?;
        info!("pipeline core stopped");
        Ok(())
    }
}
