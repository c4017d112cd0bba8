//! # Pipeline Error Types
//!
//! Structured error handling for the orchestration core using thiserror.
//! The taxonomy separates synchronous caller-visible failures (validation,
//! not-found, broker publish) from asynchronous result-handling failures
//! (malformed payloads, persistence errors applied during result processing).

use thiserror::Error;
use uuid::Uuid;

use crate::messaging::errors::MessagingError;
use crate::state_machine::Stage;

/// Error taxonomy for stage orchestration.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage precondition was unmet; the dataset record was not changed.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The requested entity does not exist.
    #[error("{entity} with ID {id} not found")]
    NotFound { entity: String, id: String },

    /// Publishing a job request failed; the state transition was suppressed.
    /// Safe to retry.
    #[error("Transient broker error: {message}")]
    TransientBroker { message: String },

    /// A worker result could not be tied to a dataset; dropped permanently
    /// without mutating any record.
    #[error("Malformed result payload: {message}")]
    MalformedResult { message: String },

    /// The persisted store failed while applying a result; the stage has been
    /// marked FAILED where possible and the error is re-raised for logging.
    #[error("{stage} result processing failed: {message}")]
    DomainProcessing { stage: Stage, message: String },

    /// Object storage collaborator failure.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Persisted store failure outside result handling (lookups, admin
    /// operations). Result-handling paths wrap this into DomainProcessing.
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: Uuid) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn dataset_not_found(id: Uuid) -> Self {
        Self::not_found("Dataset", id)
    }

    pub fn transient_broker(message: impl Into<String>) -> Self {
        Self::TransientBroker {
            message: message.into(),
        }
    }

    pub fn malformed_result(message: impl Into<String>) -> Self {
        Self::MalformedResult {
            message: message.into(),
        }
    }

    pub fn domain_processing(stage: Stage, message: impl Into<String>) -> Self {
        Self::DomainProcessing {
            stage,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the binding layer should leave the message for redelivery
    /// instead of acknowledging it.
    pub fn is_retryable_delivery(&self) -> bool {
        matches!(self, Self::DomainProcessing { .. })
    }
}

/// Broker publish failures surface to `start` callers as transient errors.
impl From<MessagingError> for PipelineError {
    fn from(err: MessagingError) -> Self {
        PipelineError::transient_broker(err.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_map_to_variants() {
        assert!(matches!(
            PipelineError::validation("bad"),
            PipelineError::Validation { .. }
        ));
        assert!(matches!(
            PipelineError::dataset_not_found(Uuid::new_v4()),
            PipelineError::NotFound { .. }
        ));
        assert!(matches!(
            PipelineError::malformed_result("no id"),
            PipelineError::MalformedResult { .. }
        ));
    }

    #[test]
    fn test_messaging_error_is_transient_broker() {
        let err: PipelineError =
            MessagingError::queue_operation("q", "send", "broken pipe").into();
        assert!(matches!(err, PipelineError::TransientBroker { .. }));
    }

    #[test]
    fn test_only_domain_processing_is_redelivered() {
        assert!(
            PipelineError::domain_processing(Stage::Profiling, "store down")
                .is_retryable_delivery()
        );
        assert!(!PipelineError::malformed_result("no id").is_retryable_delivery());
        assert!(!PipelineError::validation("nope").is_retryable_delivery());
    }

    #[test]
    fn test_display_includes_context() {
        let err = PipelineError::domain_processing(Stage::FeatureSelection, "update failed");
        let rendered = format!("{err}");
        assert!(rendered.contains("feature_selection"));
        assert!(rendered.contains("update failed"));
    }
}
