/*!
 * VFS Metadata
 * stat-equivalent node metadata
 */

use super::file_type::FileType;
use super::permissions::Permissions;
use crate::core::serde::{is_default, is_zero_u64, system_time_micros};
use crate::core::types::NodeId;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Node metadata with optimized serialization
///
/// Timestamps are serialized as microseconds since UNIX epoch.
/// Size and permissions are skipped when they are default values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Metadata {
    /// Stable inode-equivalent identifier
    pub id: NodeId,
    pub file_type: FileType,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub size: u64,
    #[serde(skip_serializing_if = "is_default", default)]
    pub permissions: Permissions,
    #[serde(default = "one")]
    pub nlink: u64,
    #[serde(with = "system_time_micros")]
    pub modified: SystemTime,
    #[serde(with = "system_time_micros")]
    pub accessed: SystemTime,
    #[serde(with = "system_time_micros")]
    pub created: SystemTime,
}

fn one() -> u64 {
    1
}

impl Metadata {
    /// Metadata with all timestamps set to `time`
    #[must_use]
    pub fn new(id: NodeId, file_type: FileType, size: u64, permissions: Permissions, time: SystemTime) -> Self {
        Self {
            id,
            file_type,
            size,
            permissions,
            nlink: 1,
            modified: time,
            accessed: time,
            created: time,
        }
    }

    /// Check if this is a directory
    ///
    /// # Performance
    /// Hot path - very frequently called in path resolution
    #[inline(always)]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    /// Check if this is a regular file
    #[inline(always)]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    /// Check if this is a symbolic link
    #[inline(always)]
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        matches!(self.file_type, FileType::Symlink)
    }

    /// Full `st_mode` (type bits and permission bits)
    #[inline]
    #[must_use]
    pub const fn st_mode(&self) -> u32 {
        self.file_type.mode_bits() | self.permissions.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_helpers() {
        let metadata = Metadata::new(
            NodeId(7),
            FileType::File,
            100,
            Permissions::readwrite(),
            SystemTime::now(),
        );

        assert!(metadata.is_file());
        assert!(!metadata.is_dir());
        assert!(!metadata.is_symlink());
        assert_eq!(metadata.st_mode(), 0o100644);

        let dir = Metadata::new(
            NodeId(8),
            FileType::Directory,
            0,
            Permissions::executable(),
            SystemTime::now(),
        );
        assert!(dir.is_dir());
        assert_eq!(dir.st_mode(), 0o40755);
    }
}
