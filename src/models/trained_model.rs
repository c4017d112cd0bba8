//! # Trained Model
//!
//! Produced only by the Classical Training stage, owned by the project.
//! Holds the winning worker artifact reference plus two ordered metric
//! collections (test-set performance, best hyperparameters) and the raw
//! training metadata blob the worker reported.
//!
//! Models are keyed by `(project_id, model_key)`: redelivering the same
//! training result replaces the row instead of duplicating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state_machine::TrainingType;

/// One metric name/value pair. Values are carried as strings exactly as
/// the worker reported them (numbers are stringified, not reparsed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub metric: String,
    pub value: String,
}

impl MetricEntry {
    pub fn new(metric: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value: value.into(),
        }
    }
}

/// A persisted trained model with its metric rows attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub training_type: TrainingType,
    /// Storage key of the winning worker artifact.
    pub model_key: String,
    pub performance: Vec<MetricEntry>,
    pub hyperparameters: Vec<MetricEntry>,
    pub training_metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// New model for creation inside the training-completion transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrainedModel {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub training_type: TrainingType,
    pub model_key: String,
    pub performance: Vec<MetricEntry>,
    pub hyperparameters: Vec<MetricEntry>,
    pub training_metadata: Option<Value>,
}
