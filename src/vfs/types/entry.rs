/*!
 * VFS Directory Entry
 * Entries yielded by directory iteration, plus name validation
 */

use super::errors::VfsError;
use super::file_type::FileType;
use crate::core::data_structures::InlineString;
use crate::core::limits::MAX_NAME_LEN;
use crate::core::serde::is_default;
use crate::core::types::NodeId;
use serde::{Deserialize, Serialize};

/// Directory entry: (id, name) plus the type reported as `d_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub id: NodeId,
    pub name: InlineString,
    #[serde(skip_serializing_if = "is_default", default)]
    pub file_type: FileType,
}

impl Entry {
    #[inline]
    pub fn new(id: NodeId, name: impl Into<InlineString>, file_type: FileType) -> Self {
        Self {
            id,
            name: name.into(),
            file_type,
        }
    }

    /// Check if this is a directory entry
    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    /// Validate a name for storage in a directory
    ///
    /// Names must be non-empty, must not be "." or "..", and cannot contain
    /// null bytes or path separators.
    #[must_use = "validation result must be checked"]
    pub fn validate_name(name: &str) -> Result<(), VfsError> {
        if name.is_empty() {
            return Err(VfsError::InvalidPath("entry name cannot be empty".into()));
        }
        if name == "." || name == ".." {
            return Err(VfsError::InvalidArgument(format!(
                "'{}' cannot name a directory entry",
                name
            )));
        }
        if name.contains('\0') {
            return Err(VfsError::InvalidPath(
                "entry name cannot contain null bytes".into(),
            ));
        }
        if name.contains('/') {
            return Err(VfsError::InvalidPath(
                "entry name cannot contain path separators".into(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_helpers() {
        let entry = Entry::new(NodeId(3), "etc", FileType::Directory);
        assert_eq!(entry.name.as_str(), "etc");
        assert!(entry.is_dir());
    }

    #[test]
    fn test_entry_validation() {
        assert!(Entry::validate_name("valid.txt").is_ok());
        assert!(Entry::validate_name("").is_err());
        assert!(Entry::validate_name("..").is_err());
        assert!(Entry::validate_name("invalid/path").is_err());
        assert!(Entry::validate_name("nul\0byte").is_err());
        assert!(matches!(
            Entry::validate_name(&"x".repeat(MAX_NAME_LEN + 1)),
            Err(VfsError::NameTooLong(_))
        ));
    }
}
