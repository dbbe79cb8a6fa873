/*!
 * Pipes and Socket Pairs
 * Ring-buffer stream channels with reader and writer accounting
 */

use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::vfs::{FileChannel, VfsError, VfsResult};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate an identifier for `pipe:[N]` / `socket:[N]` labels
pub(crate) fn next_stream_id() -> u64 {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Shared buffer between the ends of one direction
struct PipeBuffer {
    ring: Mutex<HeapRb<u8>>,
    readers: AtomicUsize,
    writers: AtomicUsize,
}

impl PipeBuffer {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            ring: Mutex::new(HeapRb::<u8>::new(capacity)),
            readers: AtomicUsize::new(0),
            writers: AtomicUsize::new(0),
        })
    }

    fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut ring = self.ring.lock();
        if ring.is_empty() {
            if self.writers.load(Ordering::Acquire) == 0 {
                return Ok(0);
            }
            return Err(VfsError::WouldBlock);
        }
        Ok(ring.pop_slice(buf))
    }

    fn write(&self, data: &[u8]) -> VfsResult<usize> {
        if self.readers.load(Ordering::Acquire) == 0 {
            return Err(VfsError::BrokenPipe);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let mut ring = self.ring.lock();
        if ring.vacant_len() == 0 {
            return Err(VfsError::WouldBlock);
        }
        Ok(ring.push_slice(data))
    }

    fn buffered(&self) -> usize {
        self.ring.lock().occupied_len()
    }
}

impl fmt::Debug for PipeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeBuffer")
            .field("buffered", &self.buffered())
            .field("readers", &self.readers.load(Ordering::Relaxed))
            .field("writers", &self.writers.load(Ordering::Relaxed))
            .finish()
    }
}

/// Read end of a pipe
#[derive(Debug)]
pub struct PipeReader {
    buffer: Arc<PipeBuffer>,
}

impl PipeReader {
    fn attach(buffer: Arc<PipeBuffer>) -> Self {
        buffer.readers.fetch_add(1, Ordering::AcqRel);
        Self { buffer }
    }
}

/// Write end of a pipe
#[derive(Debug)]
pub struct PipeWriter {
    buffer: Arc<PipeBuffer>,
}

impl PipeWriter {
    fn attach(buffer: Arc<PipeBuffer>) -> Self {
        buffer.writers.fetch_add(1, Ordering::AcqRel);
        Self { buffer }
    }
}

/// Create a unidirectional pipe holding up to `capacity` bytes
pub fn pipe(capacity: usize) -> (PipeReader, PipeWriter) {
    let buffer = PipeBuffer::new(capacity);
    (
        PipeReader::attach(Arc::clone(&buffer)),
        PipeWriter::attach(buffer),
    )
}

impl FileChannel for PipeReader {
    fn read(&mut self, _pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.buffer.read(buf)
    }

    fn write(&mut self, _pos: u64, _data: &[u8]) -> VfsResult<usize> {
        Err(VfsError::PermissionDenied("read end of pipe".into()))
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.buffer.buffered() as u64)
    }

    fn seekable(&self) -> bool {
        false
    }

    fn bytes_available(&self, _pos: u64) -> VfsResult<usize> {
        Ok(self.buffer.buffered())
    }

    fn close(&mut self) {
        self.buffer.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FileChannel for PipeWriter {
    fn read(&mut self, _pos: u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::PermissionDenied("write end of pipe".into()))
    }

    fn write(&mut self, _pos: u64, data: &[u8]) -> VfsResult<usize> {
        self.buffer.write(data)
    }

    fn seekable(&self) -> bool {
        false
    }

    fn bytes_available(&self, _pos: u64) -> VfsResult<usize> {
        Ok(0)
    }

    fn close(&mut self) {
        self.buffer.writers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One end of a connected socket pair
///
/// Each end reads from one buffer and writes to the other.
#[derive(Debug)]
pub struct SocketEnd {
    inbound: PipeReader,
    outbound: PipeWriter,
}

/// Create two connected, bidirectional stream endpoints
pub fn socket_pair(capacity: usize) -> (SocketEnd, SocketEnd) {
    let (a_in, b_out) = pipe(capacity);
    let (b_in, a_out) = pipe(capacity);
    (
        SocketEnd {
            inbound: a_in,
            outbound: a_out,
        },
        SocketEnd {
            inbound: b_in,
            outbound: b_out,
        },
    )
}

impl FileChannel for SocketEnd {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.inbound.read(pos, buf)
    }

    fn write(&mut self, pos: u64, data: &[u8]) -> VfsResult<usize> {
        self.outbound.write(pos, data)
    }

    fn seekable(&self) -> bool {
        false
    }

    fn bytes_available(&self, pos: u64) -> VfsResult<usize> {
        self.inbound.bytes_available(pos)
    }

    fn close(&mut self) {
        self.inbound.close();
        self.outbound.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_blocks_until_writers_gone() {
        let (mut reader, mut writer) = pipe(8);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(0, &mut buf), Err(VfsError::WouldBlock));

        assert_eq!(writer.write(0, b"hi").unwrap(), 2);
        assert_eq!(reader.bytes_available(0).unwrap(), 2);
        assert_eq!(reader.read(0, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");

        writer.close();
        assert_eq!(reader.read(0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_pipe_capacity_and_broken_pipe() {
        let (mut reader, mut writer) = pipe(4);
        assert_eq!(writer.write(0, b"abcdef").unwrap(), 4);
        assert_eq!(writer.write(0, b"g"), Err(VfsError::WouldBlock));
        reader.close();
        assert_eq!(writer.write(0, b"g"), Err(VfsError::BrokenPipe));
    }

    #[test]
    fn test_socket_pair_is_cross_linked() {
        let (mut a, mut b) = socket_pair(16);
        a.write(0, b"ping").unwrap();
        b.write(0, b"pong").unwrap();
        let mut buf = [0u8; 4];
        b.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        a.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"pong");

        a.close();
        assert_eq!(b.read(0, &mut buf).unwrap(), 0);
        assert_eq!(b.write(0, b"x"), Err(VfsError::BrokenPipe));
    }
}
