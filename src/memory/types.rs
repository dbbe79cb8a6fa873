/*!
 * Memory Types
 * Mapping flags, region descriptions and errors
 */

use crate::core::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryError {
    #[error("Alignment error: address 0x{address:x}, required alignment {alignment}")]
    AlignmentError { address: u64, alignment: u64 },

    #[error("Invalid mapping length: {0}")]
    InvalidLength(u64),

    #[error("Invalid mapping flags: 0x{0:x}")]
    InvalidFlags(u32),

    #[error("Out of address space: requested {requested} bytes")]
    OutOfAddressSpace { requested: u64 },

    #[error("Mapping limit reached: {limit}")]
    TooManyMappings { limit: usize },

    #[error("Out of memory: {requested} bytes requested, {available} available")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("Invalid memory address: 0x{0:x}")]
    InvalidAddress(u64),

    #[error("Memory protection violation at 0x{0:x}")]
    ProtectionViolation(u64),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::AlignmentError { .. }
            | MemoryError::InvalidLength(_)
            | MemoryError::InvalidFlags(_)
            | MemoryError::InvalidAddress(_) => ErrorKind::InvalidArgument,
            MemoryError::OutOfAddressSpace { .. }
            | MemoryError::TooManyMappings { .. }
            | MemoryError::OutOfMemory { .. } => ErrorKind::ResourceExhausted,
            MemoryError::ProtectionViolation(_) => ErrorKind::PermissionDenied,
        }
    }
}

// mmap protection bits
pub const PROT_NONE: u32 = 0;
pub const PROT_READ: u32 = 1;
pub const PROT_WRITE: u32 = 2;
pub const PROT_EXEC: u32 = 4;

// mmap flags (Linux values)
pub const MAP_SHARED: u32 = 0x01;
pub const MAP_PRIVATE: u32 = 0x02;
pub const MAP_FIXED: u32 = 0x10;
pub const MAP_ANONYMOUS: u32 = 0x20;

/// What backs a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Backing {
    Anonymous,
    /// Copy of a file range taken at map time
    File { path: String, offset: u64 },
}

/// Snapshot of one mapped region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingInfo {
    pub start: u64,
    pub len: u64,
    pub prot: u32,
    pub shared: bool,
    pub backing: Backing,
}

impl MappingInfo {
    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}
