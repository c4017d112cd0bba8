//! # Object Storage Collaborator
//!
//! Interface to the object store holding uploaded datasets and stage
//! artifacts. Concrete adapters (S3, SeaweedFS, ...) live outside this
//! crate; the orchestration core only uploads on dataset creation,
//! deletes on dataset removal, and resolves artifact keys to URLs during
//! `poll` — never during result handling.

pub mod memory;

use async_trait::async_trait;

pub use memory::InMemoryStorage;

use crate::error::Result;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store raw bytes under `key` in `bucket`.
    async fn upload_file(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Remove the object; removing a missing object is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Resolve an artifact key to a client-fetchable URL.
    async fn resolve_key_to_url(&self, key: &str) -> Result<String>;
}
