use std::path::PathBuf;

use snapfs_path::CodecError;

/// Errors from repository store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The path does not resolve under the current `HEAD^{tree}`.
    #[error("no such path: {0}")]
    NoSuchPath(String),

    /// A directory operation was applied to a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file operation was applied to a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory removal was attempted while entries remain.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The target path already exists.
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// A store path failed the demangling boundary.
    #[error(transparent)]
    NotRepresentable(#[from] CodecError),

    /// The repository could neither be opened nor initialized.
    #[error("repository unavailable at {path}: {reason}")]
    RepositoryUnavailable { path: PathBuf, reason: String },

    /// The store was opened read-only and a mutation was requested.
    #[error("store is read-only")]
    ReadOnly,

    /// Catch-all for object-store library failures, preserving the
    /// underlying error code and detail.
    #[error("store operation failed (code {code}): {message}")]
    StoreOperation { code: i32, message: String },

    /// I/O error outside the object store (scratch files, metadata).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<git2::Error> for StoreError {
    fn from(err: git2::Error) -> Self {
        StoreError::StoreOperation {
            code: err.raw_code(),
            message: err.message().to_string(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
