//! Core sandboxed file store implementation.

use crate::{
    error::{Result, SandboxedFileError},
    security::{normalize_relative, set_secure_permissions, validate_path_within_sandbox},
};

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tokio::fs;

/// A file read back from the store together with its modification time.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub modified: SystemTime,
}

/// Sandboxed file store rooted at a base directory.
///
/// Cloning is cheap; all clones operate on the same directory.
#[derive(Clone, Debug)]
pub struct SandboxedStore {
    base_dir: PathBuf,
}

impl SandboxedStore {
    /// Create a new builder for configuring the store.
    #[must_use]
    pub fn builder() -> SandboxedStoreBuilder {
        SandboxedStoreBuilder::new()
    }

    /// Canonical base directory of the sandbox.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    /// Get the full filesystem path for a file within the sandbox.
    ///
    /// # Errors
    /// Returns an error if the relative path is empty, absolute, contains
    /// `..` or resolves (through a symlink) outside of the sandbox.
    fn full_path<P: AsRef<str>>(&self, path: P) -> Result<PathBuf> {
        let relative = normalize_relative(path.as_ref())?;
        let full_path = self.base_dir.join(relative);
        validate_path_within_sandbox(&full_path, &self.base_dir)?;

        tracing::trace!(
            "Path validated: '{}' -> '{}'",
            path.as_ref(),
            full_path.display()
        );

        Ok(full_path)
    }

    /// Modification time of a stored file, or `None` when it does not exist.
    ///
    /// # Errors
    /// Returns an error if the path fails validation or the metadata cannot be read.
    pub async fn modified<P: AsRef<str>>(&self, path: P) -> Result<Option<SystemTime>> {
        let file_path = self.full_path(path)?;
        match fs::metadata(&file_path).await {
            Ok(metadata) => Ok(Some(metadata.modified()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a file and its modification time. Returns `None` when the file
    /// does not exist.
    ///
    /// # Errors
    /// Returns an error if the path fails validation or the file cannot be read.
    pub async fn read_with_modified<P: AsRef<str>>(&self, path: P) -> Result<Option<StoredFile>> {
        let file_path = self.full_path(path)?;

        let metadata = match fs::metadata(&file_path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let contents = match fs::read(&file_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredFile {
            path: file_path,
            contents,
            modified: metadata.modified()?,
        }))
    }

    /// Sandboxed version of `std::fs::write`. The file is written to a
    /// temporary sibling and renamed into place, so readers never observe
    /// a partially written file.
    ///
    /// # Errors
    /// Returns an error if the path fails validation or the write fails.
    pub async fn write<P: AsRef<str>, C: Into<Vec<u8>>>(&self, path: P, contents: C) -> Result<()> {
        let file_path = self.full_path(path)?;
        let contents = contents.into();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let temp = write_temp_sibling(&file_path, &contents)?;
            temp.persist(&file_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await?
    }

    /// Writes a file only when nothing exists at the path yet.
    ///
    /// Returns `true` when this call created the file and `false` when
    /// another writer got there first; an existing file is never replaced.
    ///
    /// # Errors
    /// Returns an error if the path fails validation or the write fails.
    pub async fn write_if_absent<P: AsRef<str>, C: Into<Vec<u8>>>(
        &self,
        path: P,
        contents: C,
    ) -> Result<bool> {
        let file_path = self.full_path(path)?;
        if fs::try_exists(&file_path).await? {
            return Ok(false);
        }

        let contents = contents.into();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let temp = write_temp_sibling(&file_path, &contents)?;
            match temp.persist_noclobber(&file_path) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error.into()),
            }
        })
        .await?
    }
}

/// Writes `contents` to a named temp file next to `target`, creating parent
/// directories as needed.
fn write_temp_sibling(target: &Path, contents: &[u8]) -> Result<tempfile::NamedTempFile> {
    let parent = target
        .parent()
        .ok_or_else(|| SandboxedFileError::invalid_path(target, "Path has no parent directory"))?;

    std::fs::create_dir_all(parent).map_err(|e| SandboxedFileError::DirectoryCreation {
        path: parent.to_path_buf(),
        source: e,
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(".sfs-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Builder for configuring a `SandboxedStore`.
pub struct SandboxedStoreBuilder {
    base_directory: Option<PathBuf>,
    secure_permissions: bool,
}

impl SandboxedStoreBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
            secure_permissions: false,
        }
    }

    /// Set the base directory for file storage.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Restrict the base directory to the owning user (Unix `0700`).
    #[must_use]
    pub fn secure_permissions(mut self, enabled: bool) -> Self {
        self.secure_permissions = enabled;
        self
    }

    /// Build the `SandboxedStore`, creating the base directory if needed.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Base directory is not set
    /// - Base directory cannot be created, resolved or secured
    pub async fn build(self) -> Result<SandboxedStore> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| SandboxedFileError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| SandboxedFileError::DirectoryCreation {
                path: base_dir.clone(),
                source: e,
            })?;

        if self.secure_permissions {
            set_secure_permissions(&base_dir).await?;
        }

        let base_dir = base_dir.canonicalize().map_err(|e| {
            SandboxedFileError::invalid_path(
                &base_dir,
                format!("Failed to canonicalize base directory: {e}"),
            )
        })?;

        tracing::debug!("SandboxedStore initialized - base_dir: {:?}", base_dir);

        Ok(SandboxedStore { base_dir })
    }
}
