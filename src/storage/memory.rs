//! In-process object store that records every call.
//!
//! Used by tests to assert which storage operations a request triggered.

use super::{ObjectStorage, StoredObject};
use crate::errors::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    gets: AtomicUsize,
    heads: AtomicUsize,
    puts: AtomicUsize,
    fail_heads: AtomicBool,
}

/// Snapshot of call counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub gets: usize,
    pub heads: usize,
    pub puts: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.gets + self.heads + self.puts
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without counting a call
    pub fn insert(&self, key: &str, content: impl Into<Bytes>, last_modified: SystemTime) {
        self.objects().insert(
            key.to_string(),
            StoredObject {
                content: content.into(),
                last_modified,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            gets: self.gets.load(Ordering::SeqCst),
            heads: self.heads.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
        }
    }

    /// Make existence checks fail with a transport error
    pub fn fail_heads(&self, fail: bool) {
        self.fail_heads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStore {
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.object(key).ok_or_else(|| StorageError::NotFound {
            path: key.to_string(),
        })
    }

    async fn head_last_modified(&self, key: &str) -> StorageResult<Option<SystemTime>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.fail_heads.load(Ordering::SeqCst) {
            return Err(StorageError::transport(key, "connection reset"));
        }
        Ok(self.objects().get(key).map(|o| o.last_modified))
    }

    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.insert(key, content, SystemTime::now());
        Ok(())
    }
}
