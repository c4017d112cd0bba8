//! # System Constants
//!
//! Queue naming conventions and storage bucket names shared across the
//! orchestration core. One durable request/result queue pair exists per
//! pipeline stage; result queues additionally own a dead-letter companion
//! for results that exhausted their redelivery budget.

/// Queue names, one request/result pair per worker domain.
pub mod queues {
    pub const DATA_PROFILING_REQUEST_QUEUE: &str = "DATA_PROFILING_REQUEST_QUEUE";
    pub const DATA_PROFILING_RESULT_QUEUE: &str = "DATA_PROFILING_RESULT_QUEUE";

    pub const DATA_ENGINEERING_REQUEST_QUEUE: &str = "DATA_ENGINEERING_REQUEST_QUEUE";
    pub const DATA_ENGINEERING_RESULT_QUEUE: &str = "DATA_ENGINEERING_RESULT_QUEUE";

    pub const DATA_SELECTION_REQUEST_QUEUE: &str = "DATA_SELECTION_REQUEST_QUEUE";
    pub const DATA_SELECTION_RESULT_QUEUE: &str = "DATA_SELECTION_RESULT_QUEUE";

    pub const CLASSICAL_TRAINING_REQUEST_QUEUE: &str = "CLASSICAL_TRAINING_REQUEST_QUEUE";
    pub const CLASSICAL_TRAINING_RESULT_QUEUE: &str = "CLASSICAL_TRAINING_RESULT_QUEUE";

    pub const REPORT_GENERATION_REQUEST_QUEUE: &str = "REPORT_GENERATION_REQUEST_QUEUE";
    pub const REPORT_GENERATION_RESULT_QUEUE: &str = "REPORT_GENERATION_RESULT_QUEUE";

    /// Suffix appended to a result queue name to form its dead-letter queue.
    pub const DEAD_LETTER_SUFFIX: &str = "_DLQ";

    /// Dead-letter queue name for a result queue.
    pub fn dead_letter_queue(result_queue: &str) -> String {
        format!("{result_queue}{DEAD_LETTER_SUFFIX}")
    }
}

/// Object storage bucket names.
pub mod buckets {
    /// Bucket holding uploaded datasets and every stage artifact derived
    /// from them (EDA reports, engineered datasets, generated code, models).
    pub const DATASETS: &str = "datasets";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_queue_name() {
        assert_eq!(
            queues::dead_letter_queue(queues::DATA_PROFILING_RESULT_QUEUE),
            "DATA_PROFILING_RESULT_QUEUE_DLQ"
        );
    }
}
