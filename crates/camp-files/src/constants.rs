/// Folder (relative to a repository root) holding uploaded files. Must be gitignored.
pub const FILES_FOLDER_NAME: &str = "files";

/// Folder under [`FILES_FOLDER_NAME`] holding one YAML metadata sidecar per stored file.
pub const METADATA_FOLDER_NAME: &str = "metadata";

/// Folder under [`FILES_FOLDER_NAME`] holding content addressed by SHA-256.
pub(crate) const SHA256_FOLDER_NAME: &str = "sha256";
