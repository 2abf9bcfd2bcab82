//! Object storage capability
//!
//! Originals and the remote cache tier both live in an object store. The
//! pipeline only depends on [`ObjectStorage`]; backends implement three
//! primitive calls and inherit the composite operations (download with
//! modification time, upload-if-newer, unconditional upload).

use crate::config::StorageConfig;
use crate::errors::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempPath;
use tracing::{debug, info};

pub mod filesystem;
pub mod memory;
pub mod s3;

pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Object bytes with the store's modification time
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content: Bytes,
    pub last_modified: SystemTime,
}

/// An object materialised on local disk.
///
/// When no destination was requested the file is a temporary that is
/// removed when this value is dropped.
#[derive(Debug)]
pub struct DownloadedObject {
    path: PathBuf,
    pub last_modified: SystemTime,
    temp: Option<TempPath>,
}

impl DownloadedObject {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch an object; a missing object is [`StorageError::NotFound`]
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject>;

    /// Modification time of an object, `None` when it does not exist
    async fn head_last_modified(&self, key: &str) -> StorageResult<Option<SystemTime>>;

    /// Store an object, replacing any previous version
    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()>;

    /// Download an object to `destination`, or to a temporary file carrying
    /// the key's extension when no destination is given. An existing
    /// destination file is left untouched.
    async fn download_with_mod_time(
        &self,
        key: &str,
        destination: Option<&Path>,
    ) -> StorageResult<DownloadedObject> {
        let object = self.get_object(key).await?;

        match destination {
            Some(path) => {
                if !tokio::fs::try_exists(path).await? {
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(path, &object.content).await?;
                }
                Ok(DownloadedObject {
                    path: path.to_path_buf(),
                    last_modified: object.last_modified,
                    temp: None,
                })
            }
            None => {
                let extension = Path::new(key)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_default();
                let temp = write_temp_file(object.content, extension).await?;
                Ok(DownloadedObject {
                    path: temp.to_path_buf(),
                    last_modified: object.last_modified,
                    temp: Some(temp),
                })
            }
        }
    }

    /// Upload unless the existing object was modified after `threshold`.
    ///
    /// Returns whether a write happened. A failed existence check does not
    /// prevent the upload.
    async fn upload_if_newer(
        &self,
        key: &str,
        threshold: SystemTime,
        content: Bytes,
    ) -> StorageResult<bool> {
        match self.head_last_modified(key).await {
            Ok(Some(modified)) if modified > threshold => return Ok(false),
            Ok(_) => {}
            Err(e) => debug!("Existence check for {} failed, uploading: {}", key, e),
        }

        self.put_object(key, content).await?;
        Ok(true)
    }

    async fn upload(&self, key: &str, content: Bytes) -> StorageResult<()> {
        self.put_object(key, content).await
    }
}

/// Open the backend selected by `config.endpoint`
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    match config.filesystem_root() {
        Some(root) => {
            info!("Using filesystem object store at {}", root.display());
            Ok(Arc::new(FilesystemObjectStore::open(root).await?))
        }
        None => {
            info!(
                "Using S3 object store {} (bucket {}, region {})",
                config.endpoint_url().unwrap_or("default endpoint"),
                config.bucket,
                config.region
            );
            Ok(Arc::new(S3ObjectStore::new(config).await))
        }
    }
}

/// Object key for a logical path below a prefix.
///
/// Leading slashes are dropped so keys never start with `/`; a non-empty
/// prefix is joined with exactly one separator.
pub fn object_key(prefix: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    let prefix = prefix.trim_start_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}

async fn write_temp_file(content: Bytes, suffix: String) -> StorageResult<TempPath> {
    tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
        let mut file = tempfile::Builder::new()
            .prefix("_resize_")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&content)?;
        file.flush()?;
        Ok(file.into_temp_path())
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    .map_err(StorageError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("", "/custom-w100/a.jpg"), "custom-w100/a.jpg");
        assert_eq!(object_key("resized", "custom-w100/a.jpg"), "resized/custom-w100/a.jpg");
        assert_eq!(object_key("resized/", "/custom-w100/a.jpg"), "resized/custom-w100/a.jpg");
        assert_eq!(object_key("/images", "/a.jpg"), "images/a.jpg");
    }

    #[tokio::test]
    async fn test_upload_if_newer_writes_once_within_window() {
        let store = MemoryObjectStore::new();
        let threshold = SystemTime::now() - Duration::from_secs(7200);

        let first = store
            .upload_if_newer("custom-w100/a.jpg", threshold, Bytes::from_static(b"one"))
            .await
            .unwrap();
        let second = store
            .upload_if_newer("custom-w100/a.jpg", threshold, Bytes::from_static(b"two"))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(store.calls().puts, 1);
    }

    #[tokio::test]
    async fn test_upload_if_newer_replaces_stale_object() {
        let store = MemoryObjectStore::new();
        store.insert(
            "a.jpg",
            Bytes::from_static(b"old"),
            SystemTime::now() - Duration::from_secs(3 * 3600),
        );

        let threshold = SystemTime::now() - Duration::from_secs(7200);
        assert!(
            store
                .upload_if_newer("a.jpg", threshold, Bytes::from_static(b"new"))
                .await
                .unwrap()
        );
        assert_eq!(
            store.object("a.jpg").unwrap().content,
            Bytes::from_static(b"new")
        );
    }

    #[tokio::test]
    async fn test_upload_if_newer_uploads_when_head_fails() {
        let store = MemoryObjectStore::new();
        store.fail_heads(true);
        assert!(
            store
                .upload_if_newer("a.jpg", SystemTime::now(), Bytes::from_static(b"x"))
                .await
                .unwrap()
        );
        assert_eq!(store.calls().puts, 1);
    }

    #[tokio::test]
    async fn test_download_to_temp_file_is_removed_on_drop() {
        let store = MemoryObjectStore::new();
        store.insert("photos/cat.png", Bytes::from_static(b"png"), SystemTime::now());

        let downloaded = store.download_with_mod_time("photos/cat.png", None).await.unwrap();
        let path = downloaded.path().to_path_buf();
        assert!(downloaded.is_temporary());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png");

        drop(downloaded);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_download_to_destination_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested/cat.png");
        let store = MemoryObjectStore::new();
        store.insert("cat.png", Bytes::from_static(b"remote"), SystemTime::now());

        let downloaded = store
            .download_with_mod_time("cat.png", Some(&destination))
            .await
            .unwrap();
        assert!(!downloaded.is_temporary());
        assert_eq!(std::fs::read(&destination).unwrap(), b"remote");

        std::fs::write(&destination, b"local").unwrap();
        store.download_with_mod_time("cat.png", Some(&destination)).await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_download_missing_object_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.download_with_mod_time("missing.jpg", None).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upload_is_unconditional() {
        let store = MemoryObjectStore::new();
        store.upload("a.jpg", Bytes::from_static(b"1")).await.unwrap();
        store.upload("a.jpg", Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(store.calls(), memory::CallCounts { gets: 0, heads: 0, puts: 2 });
    }
}
