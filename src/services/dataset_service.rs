//! # Dataset Service
//!
//! Create-on-upload, lookup, per-dataset pipeline settings, and the
//! explicit remove operation that releases the backing file through the
//! storage collaborator before deleting the record.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::constants::buckets;
use crate::error::Result;
use crate::models::{Dataset, NewDataset};
use crate::state_machine::TrainingType;
use crate::storage::ObjectStorage;
use crate::store::EntityStore;

/// An uploaded file and its dataset metadata.
#[derive(Debug, Clone)]
pub struct DatasetUpload {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub format: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct DatasetService {
    store: Arc<dyn EntityStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl DatasetService {
    pub fn new(store: Arc<dyn EntityStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }

    /// Store the file, then create the dataset record: status UPLOADED,
    /// every stage NOT_STARTED.
    pub async fn create(&self, upload: DatasetUpload) -> Result<Dataset> {
        let file_key = format!(
            "{}/{}-{}",
            upload.project_id,
            Uuid::new_v4(),
            upload.file_name
        );
        let size_bytes = upload.bytes.len() as i64;

        self.storage
            .upload_file(buckets::DATASETS, &file_key, upload.bytes)
            .await?;

        let dataset = self
            .store
            .create_dataset(NewDataset {
                project_id: upload.project_id,
                name: upload.name,
                description: upload.description,
                file_key,
                format: upload.format,
                size_bytes,
            })
            .await?;

        info!(dataset_id = %dataset.id, project_id = %dataset.project_id, "dataset created");
        Ok(dataset)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Dataset>> {
        self.store.dataset(id).await
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Dataset>> {
        self.store.datasets_for_project(project_id).await
    }

    /// Configure the target column and/or training type ahead of a
    /// pipeline run.
    pub async fn configure(
        &self,
        id: Uuid,
        target_column: Option<String>,
        training_type: Option<TrainingType>,
    ) -> Result<Dataset> {
        self.store
            .update_dataset_settings(id, target_column, training_type)
            .await
    }

    /// Release the backing file, then delete the record.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let dataset = self
            .store
            .dataset(id)
            .await?
            .ok_or_else(|| crate::error::PipelineError::dataset_not_found(id))?;

        self.storage
            .delete_object(buckets::DATASETS, &dataset.file_key)
            .await?;
        self.store.delete_dataset(id).await?;

        info!(dataset_id = %id, "dataset removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProject;
    use crate::state_machine::{DatasetStatus, StageStatus, TaskType};
    use crate::storage::InMemoryStorage;
    use crate::store::InMemoryEntityStore;

    fn service() -> (Arc<InMemoryEntityStore>, Arc<InMemoryStorage>, DatasetService) {
        let store = Arc::new(InMemoryEntityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let service = DatasetService::new(store.clone(), storage.clone());
        (store, storage, service)
    }

    #[tokio::test]
    async fn test_create_uploads_then_records() {
        let (store, storage, service) = service();
        let project = store
            .create_project(NewProject {
                name: "p".to_string(),
                description: None,
                task_type: TaskType::Classification,
            })
            .await
            .unwrap();

        let dataset = service
            .create(DatasetUpload {
                project_id: project.id,
                name: "churn".to_string(),
                description: None,
                format: "csv".to_string(),
                file_name: "churn.csv".to_string(),
                bytes: b"a,b\n1,2".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(dataset.status, DatasetStatus::Uploaded);
        assert_eq!(dataset.profiling_status, StageStatus::NotStarted);
        assert_eq!(dataset.size_bytes, 7);
        assert!(storage.contains("datasets", &dataset.file_key));
    }

    #[tokio::test]
    async fn test_remove_releases_backing_file() {
        let (store, storage, service) = service();
        let project = store
            .create_project(NewProject {
                name: "p".to_string(),
                description: None,
                task_type: TaskType::Classification,
            })
            .await
            .unwrap();
        let dataset = service
            .create(DatasetUpload {
                project_id: project.id,
                name: "churn".to_string(),
                description: None,
                format: "csv".to_string(),
                file_name: "churn.csv".to_string(),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap();

        service.remove(dataset.id).await.unwrap();
        assert!(!storage.contains("datasets", &dataset.file_key));
        assert!(store.dataset(dataset.id).await.unwrap().is_none());
    }
}
