//! # Worker Payloads
//!
//! Typed request and result payloads exchanged with the stage workers,
//! serialized in the snake_case wire form the workers expect.
//!
//! Result payloads are deliberately lenient: every field except the
//! dataset id (and the training result's `best_model_info` envelope)
//! defaults when absent, mirroring how workers omit fields they did not
//! produce. The dataset id is the one non-negotiable key; a result
//! without it can never be applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Extract the mandatory dataset id from a decoded result payload.
///
/// Absence, or an id that is not a UUID, is a permanent malformed-result
/// error: there is no record the message could be applied to.
pub fn require_dataset_id(payload: &Value) -> Result<Uuid> {
    let raw = payload
        .get("dataset_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::malformed_result("missing dataset_id"))?;

    raw.parse::<Uuid>()
        .map_err(|_| PipelineError::malformed_result(format!("invalid dataset_id: {raw}")))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Common request shape: dataset id, current-stage input artifact key,
/// lower-cased task type and target column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingRequest {
    pub dataset_id: Uuid,
    pub dataset_key: String,
    pub task_type: String,
    pub target_column: String,
}

/// Feature engineering additionally forwards the profiling report so the
/// worker can reuse the column statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEngineeringRequest {
    pub dataset_id: Uuid,
    pub dataset_key: String,
    pub task_type: String,
    pub target_column: String,
    pub json_str: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelectionRequest {
    pub dataset_id: Uuid,
    pub dataset_key: String,
    pub task_type: String,
    pub target_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassicalTrainingRequest {
    pub dataset_id: Uuid,
    pub dataset_key: String,
    pub task_type: String,
    pub target_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainingContext {
    pub models: Vec<Value>,
}

/// Report generation carries the accumulated stage metadata instead of a
/// dataset artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGenerationRequest {
    pub dataset_id: Uuid,
    pub profiling_context: Value,
    pub feature_engineering_context: Value,
    pub feature_selection_context: Value,
    pub model_training_context: ModelTrainingContext,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProfilingResult {
    pub dataset_id: String,
    #[serde(default)]
    pub eda_object_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureEngineeringResult {
    pub dataset_id: String,
    /// Engineered dataset key.
    #[serde(default)]
    pub data_key: Option<String>,
    #[serde(default)]
    pub feature_engineering_code_key: Option<String>,
    #[serde(default)]
    pub feature_transformation_code_key: Option<String>,
    /// Summary HTML report key.
    #[serde(default)]
    pub summary_key: Option<String>,
    #[serde(default)]
    pub learned_parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSelectionResult {
    pub dataset_id: String,
    #[serde(default)]
    pub selected_features: Vec<String>,
    #[serde(default)]
    pub logs: Value,
    #[serde(default)]
    pub figure_data: Value,
    /// Transformed dataset key.
    #[serde(default)]
    pub transformed_data: Option<String>,
    /// Summary HTML report key.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Winning-model envelope inside a training result. Not defaulted: a
/// training result without it cannot produce a model row and is malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct BestModelInfo {
    pub model_name: String,
    pub model_uuid: String,
    #[serde(default)]
    pub test_set_performance: serde_json::Map<String, Value>,
    #[serde(default)]
    pub best_hyperparameters: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassicalTrainingResult {
    pub dataset_id: String,
    pub best_model_info: BestModelInfo,
    #[serde(default)]
    pub all_models_performance: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportGenerationResult {
    pub dataset_id: String,
    /// Non-empty when the worker failed; the stage is then marked FAILED
    /// instead of creating a report row.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub html_key: Option<String>,
    #[serde(default)]
    pub pdf_key: Option<String>,
}

/// Stringify a metric value the way the worker meant it: strings pass
/// through, everything else keeps its JSON rendering.
pub fn metric_value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_dataset_id_accepts_uuid() {
        let id = Uuid::new_v4();
        let payload = json!({ "dataset_id": id.to_string() });
        assert_eq!(require_dataset_id(&payload).unwrap(), id);
    }

    #[test]
    fn test_require_dataset_id_rejects_missing_and_empty() {
        for payload in [json!({}), json!({"dataset_id": ""}), json!("plain string")] {
            let err = require_dataset_id(&payload).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedResult { .. }));
        }
    }

    #[test]
    fn test_require_dataset_id_rejects_non_uuid() {
        let err = require_dataset_id(&json!({"dataset_id": "d1"})).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResult { .. }));
    }

    #[test]
    fn test_selection_result_defaults_absent_fields() {
        let parsed: FeatureSelectionResult =
            serde_json::from_value(json!({"dataset_id": "abc"})).unwrap();
        assert!(parsed.selected_features.is_empty());
        assert!(parsed.transformed_data.is_none());
        assert_eq!(parsed.logs, Value::Null);
    }

    #[test]
    fn test_training_result_requires_best_model_info() {
        let err = serde_json::from_value::<ClassicalTrainingResult>(json!({
            "dataset_id": "abc"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn test_metric_value_string_keeps_worker_rendering() {
        assert_eq!(metric_value_string(&json!("0.95")), "0.95");
        assert_eq!(metric_value_string(&json!(0.95)), "0.95");
        assert_eq!(metric_value_string(&json!({"nested": 1})), r#"{"nested":1}"#);
    }

    #[test]
    fn test_request_serializes_snake_case() {
        let request = ProfilingRequest {
            dataset_id: Uuid::nil(),
            dataset_key: "k".to_string(),
            task_type: "classification".to_string(),
            target_column: "label".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("dataset_key").is_some());
        assert!(value.get("target_column").is_some());
    }
}
