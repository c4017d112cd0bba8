//! Local development runner: bootstraps the pipeline core against the
//! configured database/broker, binds every stage consumer, and runs
//! until interrupted. Object storage adapters are deployment-specific,
//! so this runner wires the in-memory backend; a production embedding
//! injects its own.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use mlforge_core::config::ConfigManager;
use mlforge_core::logging;
use mlforge_core::orchestration::PipelineCore;
use mlforge_core::storage::InMemoryStorage;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_structured_logging();

    let manager = ConfigManager::load()?;
    info!(environment = manager.environment(), "starting pipeline core");

    let storage = Arc::new(InMemoryStorage::new());
    let core = PipelineCore::bootstrap(manager.config(), storage).await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    core.shutdown().await?;
    Ok(())
}
