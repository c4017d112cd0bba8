//! # Stage Orchestration
//!
//! The five stage orchestrators and their shared contract, the result
//! consumers that feed them, the stuck-stage watchdog, and the bootstrap
//! wiring that owns the whole assembly's lifecycle.

pub mod bootstrap;
pub mod classical_training;
pub mod consumer;
pub mod feature_engineering;
pub mod feature_selection;
pub mod profiling;
pub mod report_generation;
pub mod stage;
pub mod watchdog;

pub use bootstrap::{PipelineCore, PipelineCoreConfig};
pub use classical_training::ClassicalTrainingOrchestrator;
pub use consumer::StageResultConsumer;
pub use feature_engineering::FeatureEngineeringOrchestrator;
pub use feature_selection::FeatureSelectionOrchestrator;
pub use profiling::ProfilingOrchestrator;
pub use report_generation::ReportGenerationOrchestrator;
pub use stage::{StageDeps, StageOrchestrator, StagePoll, StartAck};
pub use watchdog::{StageWatchdog, WatchdogConfig};
