//! VFS error types.

use std::io;
use thiserror::Error;

use crate::db::IndexError;
use crate::vfs::path::PathError;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No directory, extension or leaf at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every mutating operation lands here.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Not a symbolic link.
    #[error("not a symbolic link: {0}")]
    NotASymlink(String),

    /// The index could not answer; this call fails, the session keeps serving.
    #[error("index store unavailable: {0}")]
    StoreUnavailable(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a NotASymlink error.
    pub fn not_a_symlink(path: impl Into<String>) -> Self {
        Self::NotASymlink(path.into())
    }

    /// Create a StoreUnavailable error.
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Returns true for the ordinary "no such entry" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

/// Malformed and non-UTF-8 paths simply name nothing.
impl From<PathError> for VfsError {
    fn from(e: PathError) -> Self {
        match e {
            PathError::NonUtf8(path) => VfsError::NotFound(path),
            PathError::MalformedLeaf(name) => VfsError::NotFound(name),
        }
    }
}

impl From<IndexError> for VfsError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotFound(id) => VfsError::NotFound(format!("record {id}")),
            other => VfsError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Convert VfsError to std::io::Error for transports.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::ReadOnly => {
                io::Error::new(io::ErrorKind::ReadOnlyFilesystem, "filesystem is read-only")
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::NotASymlink(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::StoreUnavailable(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
