/*!
 * VFS Open Flags and Mode
 * Decoded open(2) flags and the creation mode
 */

use super::errors::VfsError;
use super::permissions::Permissions;
use crate::core::serde::{is_default, is_false};
use serde::{Deserialize, Serialize};

// Linux `open(2)` flag values
pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 0o1;
pub const O_RDWR: u32 = 0o2;
pub const O_ACCMODE: u32 = 0o3;
pub const O_CREAT: u32 = 0o100;
pub const O_EXCL: u32 = 0o200;
pub const O_TRUNC: u32 = 0o1000;
pub const O_APPEND: u32 = 0o2000;
pub const O_NONBLOCK: u32 = 0o4000;
pub const O_DIRECTORY: u32 = 0o200000;
pub const O_NOFOLLOW: u32 = 0o400000;
pub const O_CLOEXEC: u32 = 0o2000000;

/// Flags that live on the open file description rather than the descriptor
/// and that F_SETFL may change afterwards
pub const O_STATUS_MASK: u32 = O_APPEND | O_NONBLOCK;

/// Decoded open flags
///
/// Creation flags (`create`, `create_new`, `truncate`, `directory`,
/// `nofollow`) only matter during the open itself; `cloexec` moves to the
/// descriptor slot and the rest to the open file description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct OpenFlags {
    #[serde(skip_serializing_if = "is_false")]
    pub read: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub write: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub append: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub truncate: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub create: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub create_new: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub nonblock: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub directory: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub nofollow: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub cloexec: bool,
}

impl OpenFlags {
    #[inline]
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Write end that always appends (O_WRONLY | O_APPEND)
    #[inline]
    #[must_use]
    pub fn append_only() -> Self {
        Self {
            write: true,
            append: true,
            ..Default::default()
        }
    }

    /// Whether the handle may write; O_APPEND implies write access
    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.write || self.append
    }

    #[inline]
    #[must_use]
    pub const fn will_create(&self) -> bool {
        self.create || self.create_new
    }

    /// Decode Linux `open(2)` flags
    ///
    /// O_EXCL without O_CREAT is ignored, as on Linux. Access mode 3 has no
    /// meaning here and opens for neither reading nor writing.
    pub fn from_posix(flags: u32) -> Self {
        let access_mode = flags & O_ACCMODE;
        Self {
            read: access_mode == O_RDONLY || access_mode == O_RDWR,
            write: access_mode == O_WRONLY || access_mode == O_RDWR,
            append: flags & O_APPEND != 0,
            truncate: flags & O_TRUNC != 0,
            create: flags & O_CREAT != 0,
            create_new: flags & (O_CREAT | O_EXCL) == (O_CREAT | O_EXCL),
            nonblock: flags & O_NONBLOCK != 0,
            directory: flags & O_DIRECTORY != 0,
            nofollow: flags & O_NOFOLLOW != 0,
            cloexec: flags & O_CLOEXEC != 0,
        }
    }

    /// Encode back to `open(2)` flags (what F_GETFL reports)
    pub fn to_posix(&self) -> u32 {
        let mut flags = match (self.read, self.is_writable()) {
            (true, true) => O_RDWR,
            (false, true) => O_WRONLY,
            _ => O_RDONLY,
        };
        let bits = [
            (self.append, O_APPEND),
            (self.truncate, O_TRUNC),
            (self.create, O_CREAT),
            (self.create_new, O_CREAT | O_EXCL),
            (self.nonblock, O_NONBLOCK),
            (self.directory, O_DIRECTORY),
            (self.nofollow, O_NOFOLLOW),
            (self.cloexec, O_CLOEXEC),
        ];
        for (set, bit) in bits {
            if set {
                flags |= bit;
            }
        }
        flags
    }

    /// Reject combinations no node type can honor
    #[must_use = "validation result must be checked"]
    pub fn validate(&self) -> Result<(), VfsError> {
        if self.truncate && !self.is_writable() {
            return Err(VfsError::InvalidArgument("O_TRUNC requires write access".into()));
        }
        if self.directory && self.is_writable() {
            return Err(VfsError::IsADirectory("O_DIRECTORY with write access".into()));
        }
        if self.directory && self.will_create() {
            return Err(VfsError::InvalidArgument("O_DIRECTORY cannot create".into()));
        }
        Ok(())
    }
}

/// Permissions given to a file that open creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenMode {
    #[serde(skip_serializing_if = "is_default", default)]
    pub permissions: Permissions,
}

impl OpenMode {
    #[inline]
    #[must_use]
    pub const fn new(mode: u32) -> Self {
        Self {
            permissions: Permissions::new(mode),
        }
    }
}
