//! Repository-scoped file storage service implementation
//!
//! [`FilesService`] manages binary uploads for a single repository (one patient's clinical
//! directory). Content is addressed by SHA-256:
//!
//! - **Deduplication**: identical content maps to one path
//! - **Integrity**: content can be verified against its hash
//! - **Immutability**: a stored hash is never overwritten
//! - **Deterministic paths**: same content always produces the same path
//!
//! Repository existence is validated at construction time and every operation stays inside
//! the repository's `files/` folder.

use crate::constants::SHA256_FOLDER_NAME;
use crate::{FilesError, FILES_FOLDER_NAME, METADATA_FOLDER_NAME};
use camp_types::NonEmptyText;
use camp_uuid::{Sha256Hash, ShardableUuid};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata for a stored file
///
/// Serialised to YAML next to the content so that listing does not require re-hashing.
/// It carries no patient identifiers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Hashing algorithm used (always "sha256")
    pub hash_algorithm: NonEmptyText,

    /// Hexadecimal digest of the file content
    pub hash: Sha256Hash,

    /// Path relative to repository root where the file is stored
    pub relative_path: NonEmptyText,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// Best-effort detection from magic bytes; not authoritative.
    pub media_type: Option<NonEmptyText>,

    /// Original filename supplied by the uploader, reduced to its final path component
    pub original_filename: NonEmptyText,

    /// Display name of the staff member who uploaded the file
    pub uploaded_by: NonEmptyText,

    /// UTC timestamp when the file was stored
    pub stored_at: DateTime<Utc>,
}

/// Service for managing files within one repository
#[derive(Debug)]
pub struct FilesService {
    repository_root: PathBuf,
}

impl FilesService {
    /// Creates a new `FilesService` for a specific repository
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The root directory does not exist or is not a directory
    /// - The repository directory does not exist or is not a directory
    /// - Path canonicalisation fails
    pub fn new(root_directory: &Path, repository_id: &ShardableUuid) -> Result<Self, FilesError> {
        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        let repository_root = repository_id.sharded_dir(&root_directory);
        if !repository_root.is_dir() {
            return Err(FilesError::RepositoryNotFound(format!(
                "Repository directory does not exist: {}",
                repository_root.display()
            )));
        }

        Ok(Self { repository_root })
    }

    /// Adds uploaded bytes to the repository's content-addressed storage.
    ///
    /// Writes the content to `files/sha256/<h1>/<h2>/<hash>` and its metadata to
    /// `files/metadata/<hash>.yaml`. If the metadata write fails the content file is removed
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `bytes` is empty
    /// - the filename has no usable final component
    /// - content with the same hash is already stored (immutability)
    /// - directory creation or file writes fail (I/O)
    pub fn add(
        &self,
        original_filename: &str,
        bytes: &[u8],
        uploaded_by: &NonEmptyText,
    ) -> Result<FileMetadata, FilesError> {
        if bytes.is_empty() {
            return Err(FilesError::EmptyFile);
        }

        let original_filename = sanitise_filename(original_filename)?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hash_array: [u8; 32] = hasher.finalize().into();
        let hash = Sha256Hash::from_bytes(&hash_array);

        let storage_path = self.compute_storage_path(&hash);
        if storage_path.exists() {
            return Err(FilesError::FileAlreadyExists(hash.to_string()));
        }

        if let Some(parent) = storage_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&storage_path, bytes)?;

        let media_type = infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        let metadata = FileMetadata {
            hash_algorithm: non_empty("sha256")?,
            relative_path: non_empty(self.compute_relative_path(&hash))?,
            hash,
            size_bytes: bytes.len() as u64,
            media_type,
            original_filename,
            uploaded_by: uploaded_by.clone(),
            stored_at: Utc::now(),
        };

        if let Err(e) = self.write_metadata(&metadata) {
            let _ = fs::remove_file(&storage_path);
            return Err(e);
        }

        tracing::debug!(hash = %metadata.hash, size = metadata.size_bytes, "stored upload");
        Ok(metadata)
    }

    /// Reads stored content by hash.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if nothing is stored under `hash`, or an I/O error.
    pub fn read(&self, hash: &Sha256Hash) -> Result<Vec<u8>, FilesError> {
        let storage_path = self.compute_storage_path(hash);
        if !storage_path.is_file() {
            return Err(FilesError::NotFound(hash.to_string()));
        }
        Ok(fs::read(&storage_path)?)
    }

    /// Returns the metadata sidecar for a stored file.
    pub fn metadata(&self, hash: &Sha256Hash) -> Result<FileMetadata, FilesError> {
        let path = self.metadata_path(hash);
        if !path.is_file() {
            return Err(FilesError::NotFound(hash.to_string()));
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// True when content with this hash is stored in this repository.
    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.compute_storage_path(hash).is_file()
    }

    /// Lists metadata for every stored file, oldest first.
    ///
    /// Unreadable sidecars are logged and skipped.
    pub fn list(&self) -> Result<Vec<FileMetadata>, FilesError> {
        let dir = self.files_directory().join(METADATA_FOLDER_NAME);
        let entries = match fs::read_dir(&dir) {
            Ok(it) => it,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(FilesError::from)
                .and_then(|raw| serde_yaml::from_str::<FileMetadata>(&raw).map_err(FilesError::from))
            {
                Ok(meta) => files.push(meta),
                Err(e) => tracing::warn!("failed to read file metadata {}: {}", path.display(), e),
            }
        }

        files.sort_by(|a, b| a.stored_at.cmp(&b.stored_at));
        Ok(files)
    }

    fn write_metadata(&self, metadata: &FileMetadata) -> Result<(), FilesError> {
        let path = self.metadata_path(&metadata.hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_yaml::to_string(metadata)?)?;
        Ok(())
    }

    fn metadata_path(&self, hash: &Sha256Hash) -> PathBuf {
        self.files_directory()
            .join(METADATA_FOLDER_NAME)
            .join(format!("{}.yaml", hash.as_str()))
    }

    /// Absolute storage path: `<repository_root>/files/sha256/<shard1>/<shard2>/<hash>`
    fn compute_storage_path(&self, hash: &Sha256Hash) -> PathBuf {
        self.repository_root.join(self.compute_relative_path(hash))
    }

    /// Relative path in the format `files/sha256/<shard1>/<shard2>/<hash>`
    fn compute_relative_path(&self, hash: &Sha256Hash) -> String {
        let hex = hash.as_str();
        format!(
            "{}/{}/{}/{}/{}",
            FILES_FOLDER_NAME,
            SHA256_FOLDER_NAME,
            &hex[0..2],
            &hex[2..4],
            hex
        )
    }

    fn files_directory(&self) -> PathBuf {
        self.repository_root.join(FILES_FOLDER_NAME)
    }
}

fn non_empty(value: impl AsRef<str>) -> Result<NonEmptyText, FilesError> {
    NonEmptyText::new(value.as_ref()).map_err(|e| FilesError::InvalidPath(e.to_string()))
}

/// Keeps only the final path component of an uploaded filename, with control characters removed.
///
/// The stored name is echoed back in `Content-Disposition`, which cannot carry control bytes.
fn sanitise_filename(raw: &str) -> Result<NonEmptyText, FilesError> {
    let printable: String = raw.chars().filter(|c| !c.is_control()).collect();
    let last = printable
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();

    if last.is_empty() || last == "." || last == ".." {
        return Err(FilesError::InvalidPath(format!(
            "unusable upload filename: {:?}",
            raw
        )));
    }

    non_empty(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // PNG signature followed by a little padding; enough for media type sniffing.
    const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
    ];

    fn uploader() -> NonEmptyText {
        NonEmptyText::new("Dr Rao").unwrap()
    }

    fn service_with_repo(root: &Path) -> FilesService {
        let id = ShardableUuid::new();
        fs::create_dir_all(id.sharded_dir(root)).expect("create repository dir");
        FilesService::new(root, &id).expect("service should construct")
    }

    #[test]
    fn new_rejects_missing_repository() {
        let temp = TempDir::new().unwrap();
        let err = FilesService::new(temp.path(), &ShardableUuid::new()).unwrap_err();
        assert!(matches!(err, FilesError::RepositoryNotFound(_)));
    }

    #[test]
    fn add_stores_content_and_metadata() {
        let temp = TempDir::new().unwrap();
        let service = service_with_repo(temp.path());

        let meta = service
            .add("C:\\scans\\left-cc.png", PNG_BYTES, &uploader())
            .expect("add should succeed");

        assert_eq!(meta.original_filename.as_str(), "left-cc.png");
        assert_eq!(meta.size_bytes, PNG_BYTES.len() as u64);
        assert_eq!(meta.media_type.as_ref().map(|m| m.as_str()), Some("image/png"));
        assert!(meta.relative_path.as_str().starts_with("files/sha256/"));
        assert!(service.contains(&meta.hash));
        assert_eq!(service.read(&meta.hash).unwrap(), PNG_BYTES);
        assert_eq!(service.metadata(&meta.hash).unwrap(), meta);
    }

    #[test]
    fn add_rejects_duplicate_content() {
        let temp = TempDir::new().unwrap();
        let service = service_with_repo(temp.path());

        service.add("a.txt", b"hello", &uploader()).unwrap();
        let err = service.add("b.txt", b"hello", &uploader()).unwrap_err();
        assert!(matches!(err, FilesError::FileAlreadyExists(_)));
    }

    #[test]
    fn add_rejects_empty_and_unnamed_uploads() {
        let temp = TempDir::new().unwrap();
        let service = service_with_repo(temp.path());

        assert!(matches!(
            service.add("a.txt", b"", &uploader()),
            Err(FilesError::EmptyFile)
        ));
        assert!(matches!(
            service.add("uploads/..", b"x", &uploader()),
            Err(FilesError::InvalidPath(_))
        ));
    }

    #[test]
    fn add_strips_control_characters_from_filenames() {
        let temp = TempDir::new().unwrap();
        let service = service_with_repo(temp.path());

        let meta = service
            .add("scan\u{1}\r\n.png", PNG_BYTES, &uploader())
            .expect("add should succeed");
        assert_eq!(meta.original_filename.as_str(), "scan.png");

        assert!(matches!(
            service.add("\u{7f}\t", b"x", &uploader()),
            Err(FilesError::InvalidPath(_))
        ));
    }

    #[test]
    fn list_returns_all_stored_files() {
        let temp = TempDir::new().unwrap();
        let service = service_with_repo(temp.path());
        assert!(service.list().unwrap().is_empty());

        service.add("one.txt", b"one", &uploader()).unwrap();
        service.add("two.txt", b"two", &uploader()).unwrap();

        let names: Vec<String> = service
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.original_filename.into_inner())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"one.txt".to_string()));
        assert!(names.contains(&"two.txt".to_string()));
    }

    #[test]
    fn read_unknown_hash_is_not_found() {
        let temp = TempDir::new().unwrap();
        let service = service_with_repo(temp.path());
        let hash = Sha256Hash::from_bytes(&[7u8; 32]);

        assert!(matches!(service.read(&hash), Err(FilesError::NotFound(_))));
        assert!(matches!(service.metadata(&hash), Err(FilesError::NotFound(_))));
    }
}
