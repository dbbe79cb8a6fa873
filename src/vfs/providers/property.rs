/*!
 * Property Node
 * Text generated from live state, snapshotted at open
 */

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use crate::vfs::node::NodeRef;
use crate::vfs::traits::{FileChannel, NodeOps};
use crate::vfs::types::*;

/// Produces the current text of a property
pub type PropertyReader = Arc<dyn Fn() -> VfsResult<String> + Send + Sync>;

/// Receives text written to a property
pub type PropertyWriter = Arc<dyn Fn(&str) -> VfsResult<()> + Send + Sync>;

/// Generated file: reads see the text as of `open`, writes go to the setter
pub struct Property {
    reader: PropertyReader,
    writer: Option<PropertyWriter>,
}

impl Property {
    pub fn read_only<F>(reader: F) -> Self
    where
        F: Fn() -> VfsResult<String> + Send + Sync + 'static,
    {
        Self {
            reader: Arc::new(reader),
            writer: None,
        }
    }

    pub fn read_write<F, G>(reader: F, writer: G) -> Self
    where
        F: Fn() -> VfsResult<String> + Send + Sync + 'static,
        G: Fn(&str) -> VfsResult<()> + Send + Sync + 'static,
    {
        Self {
            reader: Arc::new(reader),
            writer: Some(Arc::new(writer)),
        }
    }

    fn permissions(&self) -> Permissions {
        if self.writer.is_some() {
            Permissions::readwrite()
        } else {
            Permissions::readonly()
        }
    }
}

impl NodeOps for Property {
    fn open(&self, this: &NodeRef, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        let writer = if flags.is_writable() {
            Some(self.writer.clone().ok_or_else(|| {
                VfsError::PermissionDenied(format!("{} is read-only", this.name()))
            })?)
        } else {
            None
        };
        let snapshot = if flags.read {
            (self.reader)()?.into_bytes()
        } else {
            Vec::new()
        };
        Ok(Box::new(PropertyChannel { snapshot, writer }))
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        // Generated files report size 0, like procfs
        Ok(Metadata::new(
            this.id(),
            FileType::File,
            0,
            self.permissions(),
            SystemTime::now(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct PropertyChannel {
    snapshot: Vec<u8>,
    writer: Option<PropertyWriter>,
}

impl FileChannel for PropertyChannel {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let start = (pos as usize).min(self.snapshot.len());
        let n = buf.len().min(self.snapshot.len() - start);
        buf[..n].copy_from_slice(&self.snapshot[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, _pos: u64, data: &[u8]) -> VfsResult<usize> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| VfsError::PermissionDenied("property opened read-only".into()))?;
        let text = std::str::from_utf8(data)
            .map_err(|_| VfsError::InvalidArgument("property text must be UTF-8".into()))?;
        writer(text.trim_end_matches('\n'))?;
        Ok(data.len())
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.snapshot.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::node::{Node, NodeKind};
    use parking_lot::Mutex;

    #[test]
    fn test_snapshot_taken_at_open() {
        let value = Arc::new(Mutex::new(String::from("before\n")));
        let source = Arc::clone(&value);
        let node = Node::new(
            NodeKind::Property,
            "comm",
            None,
            Property::read_only(move || Ok(source.lock().clone())),
        );

        let mut channel = node.open(OpenFlags::read_only()).unwrap();
        *value.lock() = String::from("after\n");

        let mut buf = [0u8; 16];
        let n = channel.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"before\n");
    }

    #[test]
    fn test_setter_receives_trimmed_text() {
        let value = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&value);
        let node = Node::new(
            NodeKind::Property,
            "comm",
            None,
            Property::read_write(|| Ok(String::new()), move |text| {
                *sink.lock() = text.to_string();
                Ok(())
            }),
        );
        let mut channel = node.open(OpenFlags::write_only()).unwrap();
        channel.write(0, b"worker\n").unwrap();
        assert_eq!(value.lock().as_str(), "worker");
    }

    #[test]
    fn test_read_only_property_refuses_write_open() {
        let node = Node::new(NodeKind::Property, "stat", None, Property::read_only(|| Ok("x".into())));
        assert!(node.open(OpenFlags::write_only()).is_err());
    }
}
