//! Object store backed by a local directory
//!
//! Selected with a `file://` endpoint. Keys map onto paths inside a
//! sandboxed directory and file modification times stand in for the
//! object store's last-modified metadata.

use super::{ObjectStorage, StoredObject};
use crate::errors::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use sandboxed_file_store::SandboxedStore;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    store: SandboxedStore,
}

impl FilesystemObjectStore {
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = SandboxedStore::builder()
            .base_directory(root)
            .build()
            .await?;
        Ok(Self { store })
    }
}

#[async_trait]
impl ObjectStorage for FilesystemObjectStore {
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        match self.store.read_with_modified(key).await? {
            Some(file) => Ok(StoredObject {
                content: Bytes::from(file.contents),
                last_modified: file.modified,
            }),
            None => Err(StorageError::NotFound {
                path: key.to_string(),
            }),
        }
    }

    async fn head_last_modified(&self, key: &str) -> StorageResult<Option<SystemTime>> {
        Ok(self.store.modified(key).await?)
    }

    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()> {
        self.store.write(key, content.to_vec()).await?;
        Ok(())
    }
}
