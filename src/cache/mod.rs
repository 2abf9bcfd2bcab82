//! Two-tier artifact cache
//!
//! The local tier is a directory on this host; the remote tier is the object
//! store below a configurable prefix. Both mirror the logical key space
//! (`<template>/<source path>`) and presence of a file or object is the only
//! existence signal. Nothing is ever evicted.

use crate::errors::{StorageError, StorageResult};
use crate::storage::{ObjectStorage, object_key};
use bytes::Bytes;
use sandboxed_file_store::SandboxedStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

pub mod populator;
pub mod resolver;
pub mod single_flight;

pub use populator::{CachePopulator, PopulationReport, WriteOutcome};
pub use resolver::CacheResolver;
pub use single_flight::SingleFlight;

/// Identity of a cached artifact: template identifier followed by the
/// request path, e.g. `custom-w100/photos/cat.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(template: &str, path: &str) -> Self {
        if path.starts_with('/') {
            Self(format!("{template}{path}"))
        } else {
            Self(format!("{template}/{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    Local,
    Remote,
    Produced,
}

impl ArtifactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Produced => "produced",
        }
    }
}

/// Artifact bytes and their modification time
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub content: Bytes,
    pub last_modified: SystemTime,
    pub source: ArtifactSource,
}

/// Local filesystem tier
#[derive(Debug, Clone)]
pub struct LocalTier {
    store: SandboxedStore,
}

impl LocalTier {
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = SandboxedStore::builder()
            .base_directory(root)
            .build()
            .await?;
        Ok(Self { store })
    }

    pub fn root(&self) -> &std::path::Path {
        self.store.base_directory()
    }

    pub async fn read(&self, key: &CacheKey) -> StorageResult<Option<CachedArtifact>> {
        Ok(self
            .store
            .read_with_modified(key.as_str())
            .await?
            .map(|file| CachedArtifact {
                content: Bytes::from(file.contents),
                last_modified: file.modified,
                source: ArtifactSource::Local,
            }))
    }

    /// First writer wins; returns `false` when the file already existed
    pub async fn write(&self, key: &CacheKey, content: &Bytes) -> StorageResult<bool> {
        Ok(self
            .store
            .write_if_absent(key.as_str(), content.to_vec())
            .await?)
    }
}

/// Object store tier below a prefix
#[derive(Clone)]
pub struct RemoteTier {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl RemoteTier {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn object_key(&self, key: &CacheKey) -> String {
        object_key(&self.prefix, key.as_str())
    }

    pub async fn fetch(&self, key: &CacheKey) -> StorageResult<Option<CachedArtifact>> {
        match self.storage.get_object(&self.object_key(key)).await {
            Ok(object) => Ok(Some(CachedArtifact {
                content: object.content,
                last_modified: object.last_modified,
                source: ArtifactSource::Remote,
            })),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn store_if_newer(
        &self,
        key: &CacheKey,
        threshold: SystemTime,
        content: Bytes,
    ) -> StorageResult<bool> {
        self.storage
            .upload_if_newer(&self.object_key(key), threshold, content)
            .await
    }
}

impl fmt::Debug for RemoteTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTier")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
