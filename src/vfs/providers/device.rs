/*!
 * Character Devices
 * `/dev/null`, `/dev/zero` and `/dev/full`
 */

use std::any::Any;
use std::time::SystemTime;

use crate::vfs::node::NodeRef;
use crate::vfs::traits::{FileChannel, NodeOps};
use crate::vfs::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Reads end of file, writes are discarded
    Null,
    /// Reads zeros, writes are discarded
    Zero,
    /// Reads zeros, writes fail with no space
    Full,
}

impl DeviceKind {
    pub const fn name(self) -> &'static str {
        match self {
            DeviceKind::Null => "null",
            DeviceKind::Zero => "zero",
            DeviceKind::Full => "full",
        }
    }
}

pub struct Device {
    kind: DeviceKind,
    created: SystemTime,
}

impl Device {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            created: SystemTime::now(),
        }
    }
}

impl NodeOps for Device {
    fn open(&self, _this: &NodeRef, _flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        Ok(Box::new(DeviceChannel(self.kind)))
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        Ok(Metadata::new(
            this.id(),
            FileType::CharDevice,
            0,
            Permissions::new(0o666),
            self.created,
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct DeviceChannel(DeviceKind);

impl FileChannel for DeviceChannel {
    fn read(&mut self, _pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        match self.0 {
            DeviceKind::Null => Ok(0),
            DeviceKind::Zero | DeviceKind::Full => {
                buf.fill(0);
                Ok(buf.len())
            }
        }
    }

    fn write(&mut self, _pos: u64, data: &[u8]) -> VfsResult<usize> {
        match self.0 {
            DeviceKind::Full => Err(VfsError::OutOfSpace),
            _ => Ok(data.len()),
        }
    }

    fn bytes_available(&self, _pos: u64) -> VfsResult<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::node::{Node, NodeKind};

    #[test]
    fn test_device_semantics() {
        let null = Node::new(NodeKind::Device, "null", None, Device::new(DeviceKind::Null));
        let full = Node::new(NodeKind::Device, "full", None, Device::new(DeviceKind::Full));
        let mut buf = [1u8; 4];

        let mut channel = null.open(OpenFlags::read_write()).unwrap();
        assert_eq!(channel.read(0, &mut buf).unwrap(), 0);
        assert_eq!(channel.write(0, b"gone").unwrap(), 4);

        let mut channel = full.open(OpenFlags::read_write()).unwrap();
        assert_eq!(channel.read(0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0; 4]);
        assert_eq!(channel.write(0, b"x"), Err(VfsError::OutOfSpace));
    }
}
