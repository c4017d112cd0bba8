//! # Services
//!
//! Dataset lifecycle operations surrounding the pipeline itself.

pub mod dataset_service;

pub use dataset_service::{DatasetService, DatasetUpload};
