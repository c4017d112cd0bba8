//! In-memory object storage for tests and local development.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::ObjectStorage;
use crate::error::{PipelineError, Result};

#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_resolves: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_path(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }

    /// Make every subsequent URL resolution fail.
    pub fn fail_resolves(&self, fail: bool) {
        self.fail_resolves.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .contains_key(&Self::object_path(bucket, key))
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload_file(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects
            .lock()
            .insert(Self::object_path(bucket, key), bytes);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects.lock().remove(&Self::object_path(bucket, key));
        Ok(())
    }

    async fn resolve_key_to_url(&self, key: &str) -> Result<String> {
        if self.fail_resolves.load(Ordering::SeqCst) {
            return Err(PipelineError::storage("injected resolve failure"));
        }
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_delete_round_trip() {
        let storage = InMemoryStorage::new();
        storage
            .upload_file("datasets", "p1/a.csv", b"a,b\n1,2".to_vec())
            .await
            .unwrap();
        assert!(storage.contains("datasets", "p1/a.csv"));

        storage.delete_object("datasets", "p1/a.csv").await.unwrap();
        assert!(!storage.contains("datasets", "p1/a.csv"));

        // deleting again is a no-op
        storage.delete_object("datasets", "p1/a.csv").await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_produces_url() {
        let storage = InMemoryStorage::new();
        let url = storage.resolve_key_to_url("eda.html").await.unwrap();
        assert_eq!(url, "memory://eda.html");
    }
}
