//! # Report Model
//!
//! Produced only by the Report Generation stage; one report per dataset.
//! Redelivery of the same result replaces the row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub html_key: String,
    pub pdf_key: String,
    pub created_at: DateTime<Utc>,
}

/// New report for creation inside the report-completion transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub dataset_id: Uuid,
    pub html_key: String,
    pub pdf_key: String,
}
