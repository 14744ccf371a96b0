use std::sync::Arc;

use thiserror::Error;

use crate::blob::BlobHandle;

pub type Result<T> = std::result::Result<T, SnapfsError>;

#[derive(Debug, Error)]
pub enum SnapfsError {
    #[error("no such entry: '{0}'")]
    EntryNotFound(String),

    #[error("blob not found in repository: {0}")]
    BlobNotFound(BlobHandle),

    #[error("snapshot not found: '{0}'")]
    SnapshotNotFound(String),

    #[error("not a directory: '{0}'")]
    NotADirectory(String),

    #[error("not a regular file: '{0}'")]
    NotAFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository backend error: {0}")]
    Backend(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid repository format: {0}")]
    InvalidFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// An error produced by another caller's fetch and handed to everyone
    /// waiting on the same result.
    #[error("{0}")]
    Shared(Arc<SnapfsError>),

    #[error("{0}")]
    Other(String),
}

impl SnapfsError {
    /// True for every "does not exist" outcome, which a filesystem protocol
    /// reports as "no such entry" rather than an I/O failure. Raw I/O errors
    /// never count, even `NotFound`: a repository reports missing content
    /// with [`SnapfsError::BlobNotFound`].
    pub fn is_not_found(&self) -> bool {
        match self {
            SnapfsError::EntryNotFound(_)
            | SnapfsError::BlobNotFound(_)
            | SnapfsError::SnapshotNotFound(_) => true,
            SnapfsError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// The errno a filesystem protocol layer should answer with.
    pub fn errno(&self) -> i32 {
        match self {
            _ if self.is_not_found() => libc::ENOENT,
            SnapfsError::NotADirectory(_) => libc::ENOTDIR,
            SnapfsError::NotAFile(_) => libc::EISDIR,
            SnapfsError::InvalidState(_) | SnapfsError::Config(_) => libc::EINVAL,
            SnapfsError::Shared(inner) => inner.errno(),
            _ => libc::EIO,
        }
    }
}

impl From<serde_json::Error> for SnapfsError {
    fn from(value: serde_json::Error) -> Self {
        SnapfsError::InvalidFormat(value.to_string())
    }
}
