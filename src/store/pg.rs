//! # Postgres Entity Store
//!
//! sqlx-backed implementation of [`EntityStore`]. Stage transitions are
//! single-row updates; training and report completion run in
//! transactions so the status flip and its dependent rows land together.
//! Stage-specific columns are addressed through a static column map,
//! never through caller input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{EntityStore, StageOutputs};
use crate::error::{PipelineError, Result};
use crate::models::trained_model::MetricEntry;
use crate::models::{
    Dataset, NewDataset, NewProject, NewReport, NewTrainedModel, Project, Report, TrainedModel,
};
use crate::state_machine::{DatasetStatus, Stage, TrainingType};

/// Per-stage column names. Static: SQL built from these never embeds
/// caller-controlled strings.
struct StageColumns {
    status: &'static str,
    error: &'static str,
    started_at: &'static str,
}

fn stage_columns(stage: Stage) -> StageColumns {
    match stage {
        Stage::Profiling => StageColumns {
            status: "profiling_status",
            error: "profiling_error",
            started_at: "profiling_started_at",
        },
        Stage::FeatureEngineering => StageColumns {
            status: "engineering_status",
            error: "engineering_error",
            started_at: "engineering_started_at",
        },
        Stage::FeatureSelection => StageColumns {
            status: "selection_status",
            error: "selection_error",
            started_at: "selection_started_at",
        },
        Stage::ClassicalTraining => StageColumns {
            status: "training_status",
            error: "training_error",
            started_at: "training_started_at",
        },
        Stage::ReportGeneration => StageColumns {
            status: "report_status",
            error: "report_error",
            started_at: "report_started_at",
        },
    }
}

#[derive(Debug, FromRow)]
struct ModelRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    description: Option<String>,
    training_type: TrainingType,
    model_key: String,
    training_metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MetricRow {
    metric_name: String,
    metric_value: String,
}

pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a dedicated pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| PipelineError::database(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn metric_entries(
        &self,
        table: &'static str,
        model_id: Uuid,
    ) -> Result<Vec<MetricEntry>> {
        let sql =
            format!("SELECT metric_name, metric_value FROM {table} WHERE model_id = $1 ORDER BY position");
        let rows: Vec<MetricRow> = sqlx::query_as(&sql).bind(model_id).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| MetricEntry::new(r.metric_name, r.metric_value))
            .collect())
    }

    async fn assemble_model(&self, row: ModelRow) -> Result<TrainedModel> {
        let performance = self.metric_entries("model_performances", row.id).await?;
        let hyperparameters = self.metric_entries("model_hyperparameters", row.id).await?;
        Ok(TrainedModel {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            training_type: row.training_type,
            model_key: row.model_key,
            performance,
            hyperparameters,
            training_metadata: row.training_metadata,
            created_at: row.created_at,
        })
    }
}

/// Replace a model's metric rows inside the completion transaction.
async fn replace_metric_rows(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    model_id: Uuid,
    entries: &[MetricEntry],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {table} WHERE model_id = $1"))
        .bind(model_id)
        .execute(&mut **tx)
        .await?;

    let insert =
        format!("INSERT INTO {table} (model_id, position, metric_name, metric_value) VALUES ($1, $2, $3, $4)");
    for (position, entry) in entries.iter().enumerate() {
        sqlx::query(&insert)
            .bind(model_id)
            .bind(position as i32)
            .bind(&entry.metric)
            .bind(&entry.value)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r"INSERT INTO projects (name, description, task_type)
              VALUES ($1, $2, $3)
              RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.task_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    async fn create_dataset(&self, new: NewDataset) -> Result<Dataset> {
        let dataset = sqlx::query_as::<_, Dataset>(
            r"INSERT INTO datasets (project_id, name, description, file_key, format, size_bytes)
              VALUES ($1, $2, $3, $4, $5, $6)
              RETURNING *",
        )
        .bind(new.project_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.file_key)
        .bind(&new.format)
        .bind(new.size_bytes)
        .fetch_one(&self.pool)
        .await?;
        Ok(dataset)
    }

    async fn dataset(&self, id: Uuid) -> Result<Option<Dataset>> {
        let dataset = sqlx::query_as::<_, Dataset>("SELECT * FROM datasets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dataset)
    }

    async fn datasets_for_project(&self, project_id: Uuid) -> Result<Vec<Dataset>> {
        let datasets = sqlx::query_as::<_, Dataset>(
            "SELECT * FROM datasets WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(datasets)
    }

    async fn update_dataset_settings(
        &self,
        id: Uuid,
        target_column: Option<String>,
        training_type: Option<TrainingType>,
    ) -> Result<Dataset> {
        let dataset = sqlx::query_as::<_, Dataset>(
            r"UPDATE datasets
              SET target_column = COALESCE($2, target_column),
                  training_type = COALESCE($3, training_type),
                  updated_at = now()
              WHERE id = $1
              RETURNING *",
        )
        .bind(id)
        .bind(target_column)
        .bind(training_type)
        .fetch_optional(&self.pool)
        .await?;

        dataset.ok_or_else(|| PipelineError::dataset_not_found(id))
    }

    async fn delete_dataset(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM datasets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::dataset_not_found(id));
        }
        Ok(())
    }

    async fn mark_stage_started(
        &self,
        id: Uuid,
        stage: Stage,
        top_level: DatasetStatus,
    ) -> Result<()> {
        let cols = stage_columns(stage);
        // The canonical table admits IN_PROGRESS from every status except
        // IN_PROGRESS itself, so the guard is a single predicate.
        let sql = format!(
            r"UPDATE datasets
              SET {status} = 'IN_PROGRESS',
                  {error} = '',
                  {started_at} = now(),
                  status = $2,
                  updated_at = now()
              WHERE id = $1 AND {status} <> 'IN_PROGRESS'",
            status = cols.status,
            error = cols.error,
            started_at = cols.started_at,
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(top_level)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.dataset(id).await? {
                Some(_) => Err(PipelineError::validation(format!(
                    "{stage} is already IN_PROGRESS for dataset {id}"
                ))),
                None => Err(PipelineError::dataset_not_found(id)),
            };
        }
        Ok(())
    }

    async fn complete_stage(&self, id: Uuid, outputs: StageOutputs) -> Result<()> {
        let result = match outputs {
            StageOutputs::Profiling { metadata, eda_key } => {
                sqlx::query(
                    r"UPDATE datasets
                      SET profiling_status = 'COMPLETED',
                          profiling_error = '',
                          profiling_metadata = $2,
                          eda_key = $3,
                          updated_at = now()
                      WHERE id = $1",
                )
                .bind(id)
                .bind(metadata)
                .bind(eda_key)
                .execute(&self.pool)
                .await?
            }
            StageOutputs::FeatureEngineering {
                metadata,
                engineered_key,
                code_key,
                transformation_key,
                summary_key,
            } => {
                sqlx::query(
                    r"UPDATE datasets
                      SET engineering_status = 'COMPLETED',
                          engineering_error = '',
                          engineering_metadata = $2,
                          engineered_key = $3,
                          engineering_code_key = $4,
                          transformation_code_key = $5,
                          engineering_summary_key = $6,
                          updated_at = now()
                      WHERE id = $1",
                )
                .bind(id)
                .bind(metadata)
                .bind(engineered_key)
                .bind(code_key)
                .bind(transformation_key)
                .bind(summary_key)
                .execute(&self.pool)
                .await?
            }
            StageOutputs::FeatureSelection {
                metadata,
                selected_columns,
                transformed_key,
                summary_key,
            } => {
                sqlx::query(
                    r"UPDATE datasets
                      SET selection_status = 'COMPLETED',
                          selection_error = '',
                          selection_metadata = $2,
                          selected_columns = $3,
                          selected_key = $4,
                          selection_summary_key = $5,
                          updated_at = now()
                      WHERE id = $1",
                )
                .bind(id)
                .bind(metadata)
                .bind(selected_columns)
                .bind(transformed_key)
                .bind(summary_key)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(PipelineError::dataset_not_found(id));
        }
        Ok(())
    }

    async fn mark_stage_failed(&self, id: Uuid, stage: Stage, error: &str) -> Result<()> {
        let cols = stage_columns(stage);
        let sql = format!(
            r"UPDATE datasets
              SET {status} = 'FAILED', {error_col} = $2, updated_at = now()
              WHERE id = $1",
            status = cols.status,
            error_col = cols.error,
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::dataset_not_found(id));
        }
        Ok(())
    }

    async fn complete_training(&self, id: Uuid, model: NewTrainedModel) -> Result<TrainedModel> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"UPDATE datasets
              SET training_status = 'COMPLETED', training_error = '', updated_at = now()
              WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(PipelineError::dataset_not_found(id));
        }

        let row = sqlx::query(
            r"INSERT INTO trained_models
                  (project_id, name, description, training_type, model_key, training_metadata)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (project_id, model_key) DO UPDATE
                  SET name = EXCLUDED.name,
                      description = EXCLUDED.description,
                      training_type = EXCLUDED.training_type,
                      training_metadata = EXCLUDED.training_metadata
              RETURNING id, created_at",
        )
        .bind(model.project_id)
        .bind(&model.name)
        .bind(&model.description)
        .bind(model.training_type)
        .bind(&model.model_key)
        .bind(&model.training_metadata)
        .fetch_one(&mut *tx)
        .await?;
        let model_id: Uuid = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        replace_metric_rows(&mut tx, "model_performances", model_id, &model.performance).await?;
        replace_metric_rows(
            &mut tx,
            "model_hyperparameters",
            model_id,
            &model.hyperparameters,
        )
        .await?;

        tx.commit().await?;

        Ok(TrainedModel {
            id: model_id,
            project_id: model.project_id,
            name: model.name,
            description: model.description,
            training_type: model.training_type,
            model_key: model.model_key,
            performance: model.performance,
            hyperparameters: model.hyperparameters,
            training_metadata: model.training_metadata,
            created_at,
        })
    }

    async fn complete_report(&self, id: Uuid, report: NewReport) -> Result<Report> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"UPDATE datasets
              SET report_status = 'COMPLETED', report_error = '', updated_at = now()
              WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(PipelineError::dataset_not_found(id));
        }

        let stored = sqlx::query_as::<_, Report>(
            r"INSERT INTO reports (dataset_id, html_key, pdf_key)
              VALUES ($1, $2, $3)
              ON CONFLICT (dataset_id) DO UPDATE
                  SET html_key = EXCLUDED.html_key, pdf_key = EXCLUDED.pdf_key
              RETURNING *",
        )
        .bind(report.dataset_id)
        .bind(&report.html_key)
        .bind(&report.pdf_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn models_for_project(&self, project_id: Uuid) -> Result<Vec<TrainedModel>> {
        let rows: Vec<ModelRow> = sqlx::query_as(
            "SELECT * FROM trained_models WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut models = Vec::with_capacity(rows.len());
        for row in rows {
            models.push(self.assemble_model(row).await?);
        }
        Ok(models)
    }

    async fn report_for_dataset(&self, dataset_id: Uuid) -> Result<Option<Report>> {
        let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE dataset_id = $1")
            .bind(dataset_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(report)
    }

    async fn stale_in_progress(&self, stage: Stage, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let cols = stage_columns(stage);
        let sql = format!(
            "SELECT id FROM datasets WHERE {status} = 'IN_PROGRESS' AND {started_at} < $1",
            status = cols.status,
            started_at = cols.started_at,
        );

        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(PipelineError::from))
            .collect()
    }
}
