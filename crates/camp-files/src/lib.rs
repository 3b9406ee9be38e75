//! Patient upload storage.
//!
//! Uploaded images and documents (mammography films, referral letters, lab reports) are kept
//! apart from the structured clinical records:
//!
//! - Binary files are not tracked in Git
//! - Binary files are immutable once added (new content creates a new file)
//! - Records reference files by SHA-256 hash, so references are explicit and auditable
//! - A record directory stays valid even when its binary files are absent
//!
//! ## Layout
//!
//! ```text
//! clinical/<s1>/<s2>/<patient_id>/
//! ├── .gitignore          # ignores files/
//! ├── diagnoses/ ...
//! └── files/
//!     ├── sha256/ab/cd/abcd…     # content
//!     └── metadata/abcd….yaml    # FileMetadata
//! ```

mod constants;
mod files;

pub use constants::{FILES_FOLDER_NAME, METADATA_FOLDER_NAME};
pub use files::{FileMetadata, FilesService};
pub use camp_uuid::{Sha256Hash, ShardableUuid};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Repository directory does not exist
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// Path or filename validation failed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Uploads must carry at least one byte
    #[error("File is empty")]
    EmptyFile,

    /// File already exists in content-addressed storage (immutability violation)
    #[error("File with hash {0} already exists in storage")]
    FileAlreadyExists(String),

    /// No file stored under this hash
    #[error("File not found for hash: {0}")]
    NotFound(String),

    /// Metadata sidecar could not be (de)serialised
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_yaml::Error),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
