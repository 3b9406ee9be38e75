use camp_files::FilesError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("unauthorised: {0}")]
    Unauthorised(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error(
        "commit failed and rollback also failed (path: {path}): commit={commit_error}; rollback={rollback_error}",
        path = path.display()
    )]
    RollbackFailed {
        path: std::path::PathBuf,
        #[source]
        commit_error: Box<CoreError>,
        rollback_error: std::io::Error,
    },

    #[error("failed to hash password: {0}")]
    PasswordHash(bcrypt::BcryptError),
    #[error("upload storage error: {0}")]
    Files(FilesError),
    #[error("notification transport error: {0}")]
    Notification(String),

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),
    #[error("failed to walk git history: {0}")]
    GitRevwalk(git2::Error),

    #[error("invalid Author-Name")]
    InvalidAuthorName,
    #[error("invalid Author-Role")]
    InvalidAuthorRole,
    #[error("author and clinic trailer keys are reserved")]
    ReservedTrailerKey,
}

impl CoreError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<FilesError> for CoreError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::FileAlreadyExists(hash) => {
                CoreError::Conflict(format!("file {} is already stored for this patient", hash))
            }
            FilesError::NotFound(hash) => CoreError::NotFound(format!("file {}", hash)),
            FilesError::EmptyFile => CoreError::InvalidInput("uploaded file is empty".into()),
            FilesError::InvalidPath(msg) => CoreError::InvalidInput(msg),
            other => CoreError::Files(other),
        }
    }
}

impl From<bcrypt::BcryptError> for CoreError {
    fn from(err: bcrypt::BcryptError) -> Self {
        CoreError::PasswordHash(err)
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
