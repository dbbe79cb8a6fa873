/*!
 * VFS Traits
 * Capability method-set implemented by node providers, and the I/O channel
 * returned by `open`
 */

use std::any::Any;
use std::time::SystemTime;

use super::node::NodeRef;
use super::types::*;
use crate::core::types::NodeId;

/// Lazy sequence of directory entries over a snapshot taken at `iterate` time
///
/// Not restartable and not live: mutations after the snapshot are not observed.
pub struct DirIter {
    inner: Box<dyn Iterator<Item = Entry> + Send>,
}

impl DirIter {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Entry> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    /// Iterator over an already materialized snapshot
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self::new(entries.into_iter())
    }
}

impl Iterator for DirIter {
    type Item = Entry;

    #[inline]
    fn next(&mut self) -> Option<Entry> {
        self.inner.next()
    }
}

/// Node capability method-set
///
/// A provider implements only the subset relevant to its node kind; the
/// defaults fail with permission-denied, not-a-directory or not-supported.
/// Every method receives the node it is installed on so providers can hand out
/// children with a back-reference to it.
pub trait NodeOps: Send + Sync {
    /// Find the child called `name`
    fn lookup(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        let _ = name;
        Err(VfsError::NotADirectory(this.name().to_string()))
    }

    /// Snapshot the children
    fn iterate(&self, this: &NodeRef) -> VfsResult<DirIter> {
        Err(VfsError::NotADirectory(this.name().to_string()))
    }

    /// Open an I/O channel
    fn open(&self, this: &NodeRef, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        let _ = flags;
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    /// Symlink target text
    fn read_link(&self, this: &NodeRef) -> VfsResult<String> {
        Err(VfsError::InvalidArgument(format!(
            "{} is not a symbolic link",
            this.name()
        )))
    }

    fn create_directory(&self, this: &NodeRef, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        let _ = (name, mode);
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    fn create_file(&self, this: &NodeRef, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        let _ = (name, mode);
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    fn create_symlink(&self, this: &NodeRef, name: &str, target: &str) -> VfsResult<NodeRef> {
        let _ = (name, target);
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    /// Detach the child called `name`, returning it
    ///
    /// Directory children must be empty.
    fn remove(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        let _ = name;
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    /// Move child `old_name` to `new_parent` as `new_name`, replacing any
    /// compatible node already there
    fn rename(
        &self,
        this: &NodeRef,
        old_name: &str,
        new_parent: &NodeRef,
        new_name: &str,
    ) -> VfsResult<()> {
        let _ = (old_name, new_parent, new_name);
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    fn chmod(&self, this: &NodeRef, mode: Permissions) -> VfsResult<()> {
        let _ = mode;
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    fn set_times(&self, this: &NodeRef, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
        let _ = (accessed, modified);
        Err(VfsError::PermissionDenied(this.name().to_string()))
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata>;

    /// Teardown hook, run when the last reference to the node is released
    fn destroy(&self, id: NodeId) {
        let _ = id;
    }

    fn as_any(&self) -> &dyn Any;
}

/// Active I/O channel behind an open file handle
///
/// Positions are owned by the handle; seekable channels receive the handle's
/// position, streams ignore it.
pub trait FileChannel: Send {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> VfsResult<usize>;

    fn write(&mut self, pos: u64, data: &[u8]) -> VfsResult<usize>;

    /// Current size, used by SEEK_END and O_APPEND
    fn size(&self) -> VfsResult<u64> {
        Ok(0)
    }

    /// Whether lseek is meaningful
    fn seekable(&self) -> bool {
        true
    }

    fn truncate(&mut self, len: u64) -> VfsResult<()> {
        let _ = len;
        Err(VfsError::InvalidArgument("channel cannot be truncated".into()))
    }

    /// Device-specific request
    fn ioctl(&mut self, request: u32, arg: u64) -> VfsResult<i64> {
        let _ = (request, arg);
        Err(VfsError::NotATty)
    }

    /// Bytes a read at `pos` could return without blocking
    fn bytes_available(&self, pos: u64) -> VfsResult<usize> {
        Ok(self.size()?.saturating_sub(pos) as usize)
    }

    /// Close side effects, run once when the last descriptor is gone
    fn close(&mut self) {}
}
