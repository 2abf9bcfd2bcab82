//! # Sandboxed File Store
//!
//! A small, sandboxed local file store used as the fast cache tier of the
//! image resizer and as the backing of its filesystem object store.
//!
//! All operations take paths relative to a base directory. Paths are
//! normalized lexically (leading slashes stripped, `.` removed) and anything
//! that could escape the sandbox is rejected: `..` segments, absolute paths,
//! null bytes, and symlinks resolving outside the base directory.
//!
//! ## Features
//!
//! - **Atomic writes**: content is written to a temporary sibling and renamed into place
//! - **First-writer-wins**: [`SandboxedStore::write_if_absent`] never replaces an existing file
//! - **Modification times**: reads return the file's mtime alongside its bytes
//! - **Content type detection**: extension table with magic number fallback (via `infer`)
//!
//! ## Basic Usage
//!
//! ```rust
//! use sandboxed_file_store::SandboxedStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SandboxedStore::builder()
//!     .base_directory("/var/cache/image-resizer")
//!     .build()
//!     .await?;
//!
//! // Only the first writer creates the file
//! let created = store.write_if_absent("custom-w200/photo.jpg", vec![0u8; 16]).await?;
//!
//! if let Some(file) = store.read_with_modified("custom-w200/photo.jpg").await? {
//!     println!("{} bytes, modified {:?}", file.contents.len(), file.modified);
//! }
//! # let _ = created;
//! # Ok(())
//! # }
//! ```
//!
//! **Blocked operations:**
//! ```rust,ignore
//! // store.write("../../../etc/passwd", "evil").await?;   // Escapes sandbox
//! // store.write("file\0.txt", "evil").await?;            // Null bytes
//! ```

pub mod error;
pub mod file_types;
pub mod security;
pub mod store;

pub use error::{Result, SandboxedFileError};
pub use file_types::{DetectionMethod, FileTypeInfo, detect_content_type};
pub use store::{SandboxedStore, SandboxedStoreBuilder, StoredFile};
