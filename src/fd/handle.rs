/*!
 * Open File Handle
 * Shared I/O channel with position, access mode and status flags
 */

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use super::pipe::{next_stream_id, pipe, socket_pair};
use super::types::{FdError, Whence};
use crate::core::errors::KernelResult;
use crate::core::types::NodeId;
use crate::core::KernelError;
use crate::vfs::{FileChannel, FileType, Metadata, NodeRef, OpenFlags, Permissions, VfsError};

/// Reference-counted handle; the last reference runs the close side effects
pub type HandleRef = Arc<OpenFileHandle>;

/// Mutable status flags (F_GETFL / F_SETFL)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub append: bool,
    pub nonblock: bool,
}

/// Active I/O channel shared by every descriptor that aliases it
pub struct OpenFileHandle {
    node: Option<NodeRef>,
    id: NodeId,
    label: String,
    file_type: FileType,
    readable: bool,
    writable: bool,
    opened: SystemTime,
    status: Mutex<StatusFlags>,
    position: Mutex<u64>,
    channel: Mutex<Box<dyn FileChannel>>,
}

impl OpenFileHandle {
    /// Handle over a channel opened from a node
    pub fn for_node(
        node: NodeRef,
        path: impl Into<String>,
        flags: OpenFlags,
        channel: Box<dyn FileChannel>,
    ) -> HandleRef {
        node.handle_opened();
        Arc::new(Self {
            id: node.id(),
            file_type: node.file_type(),
            node: Some(node),
            label: path.into(),
            readable: flags.read,
            writable: flags.is_writable(),
            opened: SystemTime::now(),
            status: Mutex::new(StatusFlags {
                append: flags.append,
                nonblock: flags.nonblock,
            }),
            position: Mutex::new(0),
            channel: Mutex::new(channel),
        })
    }

    fn stream(
        kind: &str,
        file_type: FileType,
        stream_id: u64,
        readable: bool,
        writable: bool,
        nonblock: bool,
        channel: Box<dyn FileChannel>,
    ) -> HandleRef {
        Arc::new(Self {
            node: None,
            id: NodeId::derived(NodeId(0), stream_id),
            label: format!("{}:[{}]", kind, stream_id),
            file_type,
            readable,
            writable,
            opened: SystemTime::now(),
            status: Mutex::new(StatusFlags {
                append: false,
                nonblock,
            }),
            position: Mutex::new(0),
            channel: Mutex::new(channel),
        })
    }

    /// Read and write handles over a fresh pipe
    pub fn pipe_pair(capacity: usize, nonblock: bool) -> (HandleRef, HandleRef) {
        let id = next_stream_id();
        let (reader, writer) = pipe(capacity);
        (
            Self::stream("pipe", FileType::Fifo, id, true, false, nonblock, Box::new(reader)),
            Self::stream("pipe", FileType::Fifo, id, false, true, nonblock, Box::new(writer)),
        )
    }

    /// Handles over two connected socket endpoints
    pub fn socket_pair(capacity: usize, nonblock: bool) -> (HandleRef, HandleRef) {
        let (a, b) = socket_pair(capacity);
        (
            Self::stream("socket", FileType::Socket, next_stream_id(), true, true, nonblock, Box::new(a)),
            Self::stream("socket", FileType::Socket, next_stream_id(), true, true, nonblock, Box::new(b)),
        )
    }

    /// Node the handle was opened from, if any
    #[inline]
    pub fn node(&self) -> Option<&NodeRef> {
        self.node.as_ref()
    }

    /// Display path (`/tmp/x`, `pipe:[7]`, `socket:[8]`)
    #[inline]
    pub fn path(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    #[inline]
    pub fn position(&self) -> u64 {
        *self.position.lock()
    }

    #[inline]
    pub fn status_flags(&self) -> StatusFlags {
        *self.status.lock()
    }

    pub fn set_status_flags(&self, flags: StatusFlags) {
        *self.status.lock() = flags;
    }

    pub fn set_nonblocking(&self, nonblock: bool) {
        self.status.lock().nonblock = nonblock;
    }

    #[inline]
    pub fn is_nonblocking(&self) -> bool {
        self.status.lock().nonblock
    }

    /// Access mode and status flags in open(2) encoding
    pub fn posix_flags(&self) -> u32 {
        let status = self.status_flags();
        OpenFlags {
            read: self.readable,
            write: self.writable,
            append: status.append,
            nonblock: status.nonblock,
            ..OpenFlags::default()
        }
        .to_posix()
    }

    /// Read at the handle position, advancing it
    ///
    /// Empty streams with live writers fail WouldBlock; the caller decides
    /// whether to suspend.
    pub fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        if !self.readable {
            return Err(FdError::NotReadable.into());
        }
        let mut channel = self.channel.lock();
        let mut position = self.position.lock();
        let n = channel.read(*position, buf)?;
        if channel.seekable() {
            *position += n as u64;
        }
        Ok(n)
    }

    /// Write at the handle position (end of file under O_APPEND)
    pub fn write(&self, data: &[u8]) -> KernelResult<usize> {
        if !self.writable {
            return Err(FdError::NotWritable.into());
        }
        let append = self.status.lock().append;
        let mut channel = self.channel.lock();
        let mut position = self.position.lock();
        if append && channel.seekable() {
            *position = channel.size()?;
        }
        let n = channel.write(*position, data)?;
        if channel.seekable() {
            *position += n as u64;
        }
        Ok(n)
    }

    pub fn lseek(&self, offset: i64, whence: Whence) -> KernelResult<u64> {
        let channel = self.channel.lock();
        if !channel.seekable() {
            return Err(VfsError::NotSeekable.into());
        }
        let mut position = self.position.lock();
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => *position,
            Whence::End => channel.size()?,
        };
        let target = i128::from(base) + i128::from(offset);
        if target < 0 || target > i128::from(i64::MAX) {
            return Err(KernelError::invalid_argument("resulting offset out of range"));
        }
        *position = target as u64;
        Ok(*position)
    }

    pub fn truncate(&self, len: u64) -> KernelResult<()> {
        if !self.writable {
            return Err(FdError::NotWritable.into());
        }
        Ok(self.channel.lock().truncate(len)?)
    }

    /// Bytes a read could return right now (FIONREAD)
    pub fn bytes_available(&self) -> KernelResult<usize> {
        let channel = self.channel.lock();
        let position = *self.position.lock();
        Ok(channel.bytes_available(position)?)
    }

    /// Device-specific request forwarded to the channel
    pub fn ioctl(&self, request: u32, arg: u64) -> KernelResult<i64> {
        Ok(self.channel.lock().ioctl(request, arg)?)
    }

    pub fn stat(&self) -> KernelResult<Metadata> {
        if let Some(node) = &self.node {
            return Ok(node.metadata()?);
        }
        let size = self.channel.lock().size()?;
        Ok(Metadata::new(
            self.id,
            self.file_type,
            size,
            Permissions::new(0o600),
            self.opened,
        ))
    }
}

impl Drop for OpenFileHandle {
    fn drop(&mut self) {
        self.channel.get_mut().close();
        if let Some(node) = &self.node {
            node.handle_closed();
        }
    }
}

impl fmt::Debug for OpenFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFileHandle")
            .field("path", &self.label)
            .field("file_type", &self.file_type)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{MemFile, Node, NodeKind};

    fn file(contents: &[u8]) -> NodeRef {
        Node::new(
            NodeKind::Regular,
            "f",
            None,
            MemFile::with_contents(contents.to_vec(), Permissions::readwrite()),
        )
    }

    #[test]
    fn test_position_is_shared_and_advances() {
        let node = file(b"hello world");
        let flags = OpenFlags::read_write();
        let handle = OpenFileHandle::for_node(Arc::clone(&node), "/f", flags, node.open(flags).unwrap());
        let alias = Arc::clone(&handle);

        let mut buf = [0u8; 5];
        handle.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(alias.position(), 5);
        assert_eq!(alias.lseek(-5, Whence::End).unwrap(), 6);
        alias.read(&mut buf).unwrap();
        assert_eq!(&buf, b"world");
        assert!(handle.lseek(-1, Whence::Set).is_err());
    }

    #[test]
    fn test_append_writes_at_end() {
        let node = file(b"abc");
        let flags = OpenFlags::append_only();
        let handle = OpenFileHandle::for_node(Arc::clone(&node), "/f", flags, node.open(flags).unwrap());
        handle.write(b"def").unwrap();
        assert_eq!(handle.stat().unwrap().size, 6);
        let mut buf = [0u8; 1];
        assert_eq!(handle.read(&mut buf), Err(FdError::NotReadable.into()));
    }

    #[test]
    fn test_open_count_tracks_handles() {
        let node = file(b"");
        let flags = OpenFlags::read_only();
        let handle = OpenFileHandle::for_node(Arc::clone(&node), "/f", flags, node.open(flags).unwrap());
        assert_eq!(node.open_count(), 1);
        drop(handle);
        assert_eq!(node.open_count(), 0);
    }

    #[test]
    fn test_pipe_handles() {
        let (reader, writer) = OpenFileHandle::pipe_pair(16, false);
        assert!(reader.path().starts_with("pipe:["));
        assert_eq!(reader.path(), writer.path());
        writer.write(b"xy").unwrap();
        assert_eq!(reader.bytes_available().unwrap(), 2);
        assert_eq!(reader.lseek(0, Whence::Set), Err(VfsError::NotSeekable.into()));
        drop(writer);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
