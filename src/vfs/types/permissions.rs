/*!
 * VFS Permissions
 * Mode bits of a node, without the file type
 */

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

const SETUID: u32 = 0o4000;
const SETGID: u32 = 0o2000;
const STICKY: u32 = 0o1000;

/// Permission and special bits (`0o7777`) of a node
///
/// There is a single emulated user, so only the owner triplet gates access;
/// group and other bits are stored and reported but never consulted.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(deserialize_with = "deserialize_permission_mode")]
    pub mode: u32,
}

impl Permissions {
    /// Permissions from raw mode bits; file type bits are dropped
    #[inline]
    #[must_use]
    pub const fn new(mode: u32) -> Self {
        Self {
            mode: mode & 0o7777,
        }
    }

    /// Read-only for everyone (0o444)
    #[inline]
    #[must_use]
    pub const fn readonly() -> Self {
        Self { mode: 0o444 }
    }

    /// Regular file default (0o644)
    #[inline]
    #[must_use]
    pub const fn readwrite() -> Self {
        Self { mode: 0o644 }
    }

    /// Directory and program default (0o755)
    #[inline]
    #[must_use]
    pub const fn executable() -> Self {
        Self { mode: 0o755 }
    }

    /// Symbolic links always report 0o777
    #[inline]
    #[must_use]
    pub const fn symlink() -> Self {
        Self { mode: 0o777 }
    }

    /// Owner write bit clear
    #[inline(always)]
    #[must_use]
    pub const fn is_readonly(&self) -> bool {
        self.mode & 0o200 == 0
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.mode & 0o400 != 0
    }

    /// Any execute bit set; what execve requires of a program
    #[inline(always)]
    #[must_use]
    pub const fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }

    /// Restricted-deletion bit, as on /tmp
    #[inline]
    #[must_use]
    pub const fn is_sticky(&self) -> bool {
        self.mode & STICKY != 0
    }

    /// Permissions with `bits` cleared (an octal umask)
    #[inline]
    #[must_use]
    pub const fn masked(self, bits: u32) -> Self {
        Self::new(self.mode & !bits)
    }

    /// `ls -l` rendering of the nine access bits plus special bits
    pub fn symbolic(&self) -> String {
        let mut out = String::with_capacity(9);
        for (shift, special, set_char) in [(6, SETUID, 's'), (3, SETGID, 's'), (0, STICKY, 't')] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(match (bits & 0o1 != 0, self.mode & special != 0) {
                (true, true) => set_char,
                (false, true) => set_char.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            });
        }
        out
    }
}

fn deserialize_permission_mode<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let mode = u32::deserialize(deserializer)?;
    if mode > 0o7777 {
        return Err(serde::de::Error::custom(format!(
            "invalid permission mode: 0o{:o} exceeds maximum 0o7777",
            mode
        )));
    }
    Ok(mode)
}

impl Default for Permissions {
    fn default() -> Self {
        Self::readwrite()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.mode)
    }
}
