//! # Data Layer
//!
//! Persisted entity records for the pipeline: datasets and their per-stage
//! progress, owning projects, trained models, and generated reports.

pub mod dataset;
pub mod project;
pub mod report;
pub mod trained_model;

pub use dataset::{Dataset, NewDataset};
pub use project::{NewProject, Project};
pub use report::{NewReport, Report};
pub use trained_model::{MetricEntry, NewTrainedModel, TrainedModel};
