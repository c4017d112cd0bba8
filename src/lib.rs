#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, JSONB in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MLForge Core
//!
//! Asynchronous multi-stage pipeline orchestration for uploaded datasets:
//! profiling, feature engineering, feature selection, classical training
//! and report generation, each executed by an external worker reached
//! through durable message queues.
//!
//! ## Architecture
//!
//! Five stage orchestrators share one contract — `start`, `handle_result`,
//! `poll` — over three collaborator seams: the persisted entity store, the
//! queue gateway, and the object storage resolver. `start` enforces the
//! cross-stage precondition table, publishes a job request, and flips the
//! stage to IN_PROGRESS only after the broker acknowledged the publish.
//! Worker results arrive on per-stage result queues with at-least-once
//! delivery; result application is atomic and last-write-wins, so
//! redelivery converges instead of duplicating.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - stage orchestrators, result consumers, watchdog,
//!   bootstrap lifecycle
//! - [`messaging`] - queue gateway (pgmq and in-memory), payload codec,
//!   typed worker payloads
//! - [`store`] - persisted entity store (Postgres and in-memory)
//! - [`models`] - dataset, project, trained model and report records
//! - [`state_machine`] - stage/status enums and the canonical transition
//!   table
//! - [`storage`] - object storage collaborator interface
//! - [`services`] - dataset upload/remove lifecycle
//! - [`config`] / [`logging`] / [`error`] - ambient concerns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mlforge_core::config::ConfigManager;
//! use mlforge_core::orchestration::{PipelineCore, StageOrchestrator};
//! use mlforge_core::state_machine::Stage;
//! use mlforge_core::storage::InMemoryStorage;
//!
//! # async fn example(dataset_id: uuid::Uuid) -> Result<(), Box<dyn std::error::Error>> {
//! mlforge_core::logging::init_structured_logging();
//! let config = ConfigManager::load()?;
//!
//! let storage = Arc::new(InMemoryStorage::new());
//! let core = PipelineCore::bootstrap(config.config(), storage).await?;
//!
//! core.orchestrator(Stage::Profiling).start(dataset_id).await?;
//! let progress = core.orchestrator(Stage::Profiling).poll(dataset_id).await?;
//! println!("profiling: {}", progress.status);
//!
//! core.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod services;
pub mod state_machine;
pub mod storage;
pub mod store;

pub use config::{ConfigManager, CoreConfig};
pub use error::{PipelineError, Result};
pub use orchestration::{PipelineCore, StageOrchestrator, StagePoll, StartAck};
pub use state_machine::{DatasetStatus, Stage, StageStatus, TaskType, TrainingType};
