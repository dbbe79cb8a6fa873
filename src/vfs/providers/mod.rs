/*!
 * Node Providers
 * Implementations of the capability method-set, one per node kind
 */

mod device;
mod directory;
mod dynamic;
mod file;
mod host;
mod property;
mod symlink;

pub use device::{Device, DeviceKind};
pub use directory::MemDirectory;
pub use dynamic::{DynamicGroup, Generator};
pub use file::MemFile;
pub use host::{HostDirectory, HostFile};
pub use property::{Property, PropertyReader, PropertyWriter};
pub use symlink::Symlink;

use parking_lot::RwLock;
use std::time::SystemTime;

use super::types::{FileType, Metadata, Permissions};
use crate::core::types::NodeId;

/// Mutable attributes shared by the stored providers
#[derive(Debug)]
pub(crate) struct Attributes {
    inner: RwLock<AttributeState>,
}

#[derive(Debug, Clone, Copy)]
struct AttributeState {
    permissions: Permissions,
    accessed: SystemTime,
    modified: SystemTime,
    created: SystemTime,
}

impl Attributes {
    pub(crate) fn new(permissions: Permissions) -> Self {
        let now = SystemTime::now();
        Self {
            inner: RwLock::new(AttributeState {
                permissions,
                accessed: now,
                modified: now,
                created: now,
            }),
        }
    }

    #[inline]
    pub(crate) fn permissions(&self) -> Permissions {
        self.inner.read().permissions
    }

    pub(crate) fn set_permissions(&self, permissions: Permissions) {
        self.inner.write().permissions = permissions;
    }

    pub(crate) fn set_times(&self, accessed: SystemTime, modified: SystemTime) {
        let mut state = self.inner.write();
        state.accessed = accessed;
        state.modified = modified;
    }

    /// Record a content change
    pub(crate) fn touch(&self) {
        self.inner.write().modified = SystemTime::now();
    }

    pub(crate) fn metadata(&self, id: NodeId, file_type: FileType, size: u64) -> Metadata {
        let state = *self.inner.read();
        Metadata {
            id,
            file_type,
            size,
            permissions: state.permissions,
            nlink: 1,
            modified: state.modified,
            accessed: state.accessed,
            created: state.created,
        }
    }
}
