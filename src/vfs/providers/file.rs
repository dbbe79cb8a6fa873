/*!
 * In-Memory File
 * Byte contents shared by every open handle of the node
 */

use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use super::Attributes;
use crate::vfs::node::NodeRef;
use crate::vfs::traits::{FileChannel, NodeOps};
use crate::vfs::types::*;

struct FileState {
    data: RwLock<Vec<u8>>,
    attrs: Attributes,
}

/// Regular file stored in memory
pub struct MemFile {
    state: Arc<FileState>,
}

impl MemFile {
    pub fn new(mode: Permissions) -> Self {
        Self::with_contents(Vec::new(), mode)
    }

    pub fn with_contents(data: impl Into<Vec<u8>>, mode: Permissions) -> Self {
        Self {
            state: Arc::new(FileState {
                data: RwLock::new(data.into()),
                attrs: Attributes::new(mode),
            }),
        }
    }

    /// Copy of the current contents
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.state.data.read().clone()
    }
}

impl NodeOps for MemFile {
    fn open(&self, this: &NodeRef, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        let permissions = self.state.attrs.permissions();
        if flags.is_writable() && permissions.is_readonly() {
            return Err(VfsError::PermissionDenied(format!(
                "file is readonly: {}",
                this.name()
            )));
        }
        if flags.read && !permissions.is_readable() {
            return Err(VfsError::PermissionDenied(format!(
                "file is not readable: {}",
                this.name()
            )));
        }
        if flags.truncate {
            self.state.data.write().clear();
            self.state.attrs.touch();
        }
        Ok(Box::new(MemFileChannel {
            state: Arc::clone(&self.state),
        }))
    }

    fn chmod(&self, _this: &NodeRef, mode: Permissions) -> VfsResult<()> {
        self.state.attrs.set_permissions(mode);
        Ok(())
    }

    fn set_times(&self, _this: &NodeRef, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
        self.state.attrs.set_times(accessed, modified);
        Ok(())
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        let size = self.state.data.read().len() as u64;
        Ok(self.state.attrs.metadata(this.id(), FileType::File, size))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemFileChannel {
    state: Arc<FileState>,
}

impl FileChannel for MemFileChannel {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let data = self.state.data.read();
        let start = (pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, pos: u64, bytes: &[u8]) -> VfsResult<usize> {
        let mut data = self.state.data.write();
        let start = pos as usize;
        let end = start
            .checked_add(bytes.len())
            .ok_or_else(|| VfsError::InvalidArgument("write past addressable range".into()))?;
        if data.len() < end {
            // Writing past the end leaves a zero-filled hole
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        drop(data);
        self.state.attrs.touch();
        Ok(bytes.len())
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.state.data.read().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> VfsResult<()> {
        self.state.data.write().resize(len as usize, 0);
        self.state.attrs.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::node::{Node, NodeKind};

    #[test]
    fn test_handles_share_contents() {
        let node = Node::new(NodeKind::Regular, "f", None, MemFile::new(Permissions::readwrite()));
        let mut writer = node.open(OpenFlags::write_only()).unwrap();
        let mut reader = node.open(OpenFlags::read_only()).unwrap();

        writer.write(0, b"hello").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(1, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ello");
        assert_eq!(node.metadata().unwrap().size, 5);
    }

    #[test]
    fn test_write_past_end_fills_hole() {
        let node = Node::new(NodeKind::Regular, "f", None, MemFile::new(Permissions::readwrite()));
        let mut channel = node.open(OpenFlags::read_write()).unwrap();
        channel.write(3, b"x").unwrap();
        assert_eq!(node.provider::<MemFile>().unwrap().contents(), vec![0, 0, 0, b'x']);
    }

    #[test]
    fn test_readonly_file_refuses_write_open() {
        let node = Node::new(NodeKind::Regular, "f", None, MemFile::new(Permissions::readonly()));
        assert!(matches!(
            node.open(OpenFlags::write_only()),
            Err(VfsError::PermissionDenied(_))
        ));
        assert!(node.open(OpenFlags::read_only()).is_ok());
    }
}
