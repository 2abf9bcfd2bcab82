//! Security utilities for path validation and sandboxing.

use crate::error::{Result, SandboxedFileError};
use std::path::{Component, Path, PathBuf};

/// Sets secure permissions on a directory (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| SandboxedFileError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(SandboxedFileError::invalid_path(
                path,
                "Directory does not exist",
            ));
        }
    }

    Ok(())
}

/// Lexically normalizes a sandbox-relative path.
///
/// Leading slashes are stripped so request-style paths (`/a/b.png`) can be
/// used directly. `.` segments are dropped; `..`, drive prefixes and null
/// bytes are rejected outright rather than resolved.
pub fn normalize_relative(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(SandboxedFileError::invalid_path(
            path,
            "Path contains null bytes",
        ));
    }

    let trimmed = path.trim_start_matches('/');
    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(SandboxedFileError::invalid_path(
                    path,
                    "Parent directory references are not allowed",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxedFileError::invalid_path(
                    path,
                    "Absolute paths not allowed - use relative paths within sandbox",
                ));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SandboxedFileError::invalid_path(
            path,
            "Filepath cannot be empty",
        ));
    }

    Ok(normalized)
}

/// Validates that an existing path resolves inside the sandbox.
/// Symlinks pointing outside of the base directory are rejected.
pub fn validate_path_within_sandbox(resolved_path: &Path, canonical_base: &Path) -> Result<()> {
    if !resolved_path.exists() {
        return Ok(());
    }

    let canonical_path = resolved_path.canonicalize().map_err(|e| {
        SandboxedFileError::invalid_path(resolved_path, format!("Failed to resolve path: {e}"))
    })?;

    if !canonical_path.starts_with(canonical_base) {
        return Err(SandboxedFileError::invalid_path(
            resolved_path,
            format!(
                "Path escapes sandbox: resolves to '{}' (outside '{}')",
                canonical_path.display(),
                canonical_base.display()
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        assert_eq!(
            normalize_relative("custom-w100/photo.jpg").unwrap(),
            PathBuf::from("custom-w100/photo.jpg")
        );
        assert_eq!(
            normalize_relative("/original/./a/b.png").unwrap(),
            PathBuf::from("original/a/b.png")
        );

        assert!(normalize_relative("custom/../../etc/passwd").is_err());
        assert!(normalize_relative("file\0.txt").is_err());
        assert!(normalize_relative("").is_err());
        assert!(normalize_relative("///").is_err());
    }

    #[tokio::test]
    async fn test_validate_path_within_sandbox() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();

        let inside = base.join("test.txt");
        std::fs::write(&inside, "test content").unwrap();
        assert!(validate_path_within_sandbox(&inside, &base).is_ok());

        // Missing paths are not an escape
        assert!(validate_path_within_sandbox(&base.join("missing.txt"), &base).is_ok());

        let outside_temp = tempfile::tempdir().unwrap();
        let outside_file = outside_temp.path().join("outside.txt");
        std::fs::write(&outside_file, "outside content").unwrap();
        assert!(validate_path_within_sandbox(&outside_file, &base).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escaping_sandbox_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();
        let outside_temp = tempfile::tempdir().unwrap();
        let target = outside_temp.path().join("secret.txt");
        std::fs::write(&target, "secret").unwrap();

        let link = base.join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(validate_path_within_sandbox(&link, &base).is_err());
    }
}
