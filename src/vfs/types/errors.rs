/*!
 * VFS Error Types
 * Structured, type-safe error handling for filesystem operations
 */

use crate::core::errors::ErrorKind;
use crate::core::serde::deserialize_nonempty_string;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// VFS operation result
///
/// # Must Use
/// VFS operations can fail and must be handled to prevent data loss
#[must_use = "VFS operations can fail and must be handled"]
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS errors with structured, type-safe error handling
///
/// All error variants include context strings that should be non-empty.
/// Serialization uses tagged enum pattern for type safety.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum VfsError {
    #[error("Not found: {0}")]
    NotFound(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Already exists: {0}")]
    AlreadyExists(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Permission denied: {0}")]
    PermissionDenied(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Not a directory: {0}")]
    NotADirectory(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Is a directory: {0}")]
    IsADirectory(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Directory not empty: {0}")]
    NotEmpty(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    /// Removal of a node its parent refuses to give up (mount points, fixed entries)
    #[error("Resource busy: {0}")]
    Busy(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Invalid path: {0}")]
    InvalidPath(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Name too long: {0}")]
    NameTooLong(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Too many levels of symbolic links: {0}")]
    SymlinkLoop(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Not executable: {0}")]
    NotExecutable(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("I/O error: {0}")]
    IoError(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Not supported: {0}")]
    NotSupported(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Out of space")]
    OutOfSpace,

    #[error("Read-only filesystem")]
    ReadOnly,

    #[error("Cross-device link")]
    CrossDevice,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Broken pipe")]
    BrokenPipe,

    #[error("Illegal seek")]
    NotSeekable,

    #[error("Inappropriate ioctl for device")]
    NotATty,
}

impl VfsError {
    /// The taxonomy kind this error reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::PermissionDenied(_) | VfsError::ReadOnly => ErrorKind::PermissionDenied,
            VfsError::NotADirectory(_) | VfsError::IsADirectory(_) | VfsError::NotEmpty(_) => {
                ErrorKind::WrongType
            }
            VfsError::Busy(_) => ErrorKind::NotPermitted,
            VfsError::InvalidPath(_) | VfsError::NameTooLong(_) | VfsError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            VfsError::SymlinkLoop(_) => ErrorKind::SymlinkLoop,
            VfsError::NotExecutable(_) => ErrorKind::NotExecutable,
            VfsError::IoError(_) => ErrorKind::Io,
            VfsError::NotSupported(_) => ErrorKind::NotSupported,
            VfsError::OutOfSpace => ErrorKind::NoSpace,
            VfsError::CrossDevice => ErrorKind::CrossDevice,
            VfsError::WouldBlock => ErrorKind::WouldBlock,
            VfsError::BrokenPipe => ErrorKind::BrokenPipe,
            VfsError::NotSeekable => ErrorKind::NotSeekable,
            VfsError::NotATty => ErrorKind::NotATty,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::NotFound => VfsError::NotFound(err.to_string()),
            Io::AlreadyExists => VfsError::AlreadyExists(err.to_string()),
            Io::PermissionDenied => VfsError::PermissionDenied(err.to_string()),
            Io::InvalidInput => VfsError::InvalidArgument(err.to_string()),
            Io::WouldBlock => VfsError::WouldBlock,
            Io::BrokenPipe => VfsError::BrokenPipe,
            _ => VfsError::IoError(err.to_string()),
        }
    }
}
