/*!
 * Descriptor Types
 * Errors and constants for the descriptor table
 */

use crate::core::errors::ErrorKind;
use crate::core::types::Fd;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptor table result
pub type FdResult<T> = Result<T, FdError>;

/// Descriptor table errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details", rename_all = "snake_case")]
pub enum FdError {
    #[error("Bad file descriptor: {0}")]
    BadDescriptor(Fd),

    #[error("Descriptor table full (capacity {capacity})")]
    Exhausted { capacity: u32 },

    #[error("Descriptor not open for reading")]
    NotReadable,

    #[error("Descriptor not open for writing")]
    NotWritable,
}

impl FdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FdError::BadDescriptor(_) | FdError::NotReadable | FdError::NotWritable => {
                ErrorKind::BadDescriptor
            }
            FdError::Exhausted { .. } => ErrorKind::ResourceExhausted,
        }
    }
}

// fcntl commands
pub const F_DUPFD: u32 = 0;
pub const F_GETFD: u32 = 1;
pub const F_SETFD: u32 = 2;
pub const F_GETFL: u32 = 3;
pub const F_SETFL: u32 = 4;
pub const F_DUPFD_CLOEXEC: u32 = 1030;

/// Descriptor flag reported by F_GETFD
pub const FD_CLOEXEC: u32 = 1;

// ioctl requests handled at the descriptor level
pub const FIONREAD: u32 = 0x541B;
pub const FIONBIO: u32 = 0x5421;
pub const FIONCLEX: u32 = 0x5450;
pub const FIOCLEX: u32 = 0x5451;

/// lseek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Whence {
    Set,
    Current,
    End,
}

impl Whence {
    pub fn from_raw(whence: u32) -> Option<Self> {
        match whence {
            0 => Some(Whence::Set),
            1 => Some(Whence::Current),
            2 => Some(Whence::End),
            _ => None,
        }
    }
}
