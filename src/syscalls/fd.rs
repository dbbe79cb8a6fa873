/*!
 * Descriptor Syscalls
 * open, close, read, write, dup, fcntl, pipes and ioctl over the
 * per-process descriptor table
 */

use tracing::{debug, instrument, warn};

use crate::core::errors::{ErrorKind, KernelError, KernelResult};
use crate::core::types::{Fd, Pid};
use crate::fd::*;
use crate::kernel::Kernel;
use crate::signals::Signal;
use crate::vfs::types::open_flags::{O_APPEND, O_CLOEXEC, O_NONBLOCK, O_STATUS_MASK};
use crate::vfs::{Metadata, OpenFlags, OpenMode};

/// Maps "would block" to "not yet" inside a blocking loop
fn pending<T>(result: KernelResult<T>) -> KernelResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

impl Kernel {
    pub(crate) fn handle(&self, tid: Pid, fd: Fd) -> KernelResult<HandleRef> {
        let table = self.processes().fds(tid)?;
        let handle = table.lock().handle(fd)?;
        Ok(handle)
    }

    #[instrument(skip(self))]
    pub fn open(&self, tid: Pid, path: &str, flags: u32, mode: u32) -> KernelResult<Fd> {
        self.enter(tid);
        let cwd = self.processes().cwd(tid)?;
        let flags = OpenFlags::from_posix(flags);
        let opened = self.vfs().open(&cwd, path, flags, OpenMode::new(mode))?;
        let label = opened.node.path().unwrap_or_else(|_| path.to_string());
        let handle = OpenFileHandle::for_node(opened.node, label, flags, opened.channel);

        let table = self.processes().fds(tid)?;
        let fd = table.lock().allocate(handle, flags.cloexec)?;
        debug!(tid, fd, path, "Descriptor opened");
        Ok(fd)
    }

    #[instrument(skip(self))]
    pub fn close(&self, tid: Pid, fd: Fd) -> KernelResult<()> {
        let table = self.processes().fds(tid)?;
        let handle = table.lock().close(fd)?;
        // Close side effects run here, outside the table lock
        drop(handle);
        Ok(())
    }

    /// Read from `fd`, suspending while a blocking stream is empty
    #[instrument(skip(self, buf), fields(len = buf.len()))]
    pub async fn read(&self, tid: Pid, fd: Fd, buf: &mut [u8]) -> KernelResult<usize> {
        self.enter(tid);
        let handle = self.handle(tid, fd)?;
        if handle.is_nonblocking() {
            return handle.read(buf);
        }
        self.block_on(tid, "read", || pending(handle.read(buf))).await
    }

    /// Write to `fd`
    ///
    /// Stream writes complete as soon as some bytes fit, so the count may be
    /// short. Writing to a pipe without readers raises SIGPIPE on the caller.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn write(&self, tid: Pid, fd: Fd, data: &[u8]) -> KernelResult<usize> {
        self.enter(tid);
        let handle = self.handle(tid, fd)?;
        let result = if handle.is_nonblocking() {
            handle.write(data)
        } else {
            self.block_on(tid, "write", || pending(handle.write(data))).await
        };
        if let Err(e) = &result {
            if e.kind() == ErrorKind::BrokenPipe {
                warn!(tid, fd, "Write to a pipe without readers");
                self.processes().send_thread_signal(tid, Signal::SIGPIPE)?;
            }
        }
        result
    }

    #[instrument(skip(self))]
    pub fn lseek(&self, tid: Pid, fd: Fd, offset: i64, whence: u32) -> KernelResult<u64> {
        let whence = Whence::from_raw(whence)
            .ok_or_else(|| KernelError::invalid_argument(format!("whence {}", whence)))?;
        self.handle(tid, fd)?.lseek(offset, whence)
    }

    #[instrument(skip(self))]
    pub fn ftruncate(&self, tid: Pid, fd: Fd, len: u64) -> KernelResult<()> {
        self.handle(tid, fd)?.truncate(len)
    }

    #[instrument(skip(self))]
    pub fn dup(&self, tid: Pid, fd: Fd) -> KernelResult<Fd> {
        let table = self.processes().fds(tid)?;
        let new = table.lock().dup(fd)?;
        Ok(new)
    }

    /// Make `new` an alias of `old`, closing whatever `new` held
    #[instrument(skip(self))]
    pub fn dup2(&self, tid: Pid, old: Fd, new: Fd) -> KernelResult<Fd> {
        let table = self.processes().fds(tid)?;
        let displaced = table.lock().dup2(old, new)?;
        drop(displaced);
        Ok(new)
    }

    #[instrument(skip(self))]
    pub fn fcntl(&self, tid: Pid, fd: Fd, cmd: u32, arg: u64) -> KernelResult<i64> {
        let table = self.processes().fds(tid)?;
        match cmd {
            F_DUPFD | F_DUPFD_CLOEXEC => {
                let min = Fd::try_from(arg)
                    .map_err(|_| KernelError::invalid_argument(format!("F_DUPFD minimum {}", arg)))?;
                let mut table = table.lock();
                if min >= table.capacity() {
                    return Err(KernelError::invalid_argument(format!("F_DUPFD minimum {}", arg)));
                }
                let handle = table.handle(fd)?;
                let new = table.allocate_from(min, handle, cmd == F_DUPFD_CLOEXEC)?;
                Ok(i64::from(new))
            }
            F_GETFD => {
                let cloexec = table.lock().cloexec(fd)?;
                Ok(if cloexec { i64::from(FD_CLOEXEC) } else { 0 })
            }
            F_SETFD => {
                table.lock().set_cloexec(fd, arg & u64::from(FD_CLOEXEC) != 0)?;
                Ok(0)
            }
            F_GETFL => {
                let handle = table.lock().handle(fd)?;
                Ok(i64::from(handle.posix_flags()))
            }
            F_SETFL => {
                let handle = table.lock().handle(fd)?;
                // Access mode and creation flags in `arg` are ignored
                let status = arg as u32 & O_STATUS_MASK;
                handle.set_status_flags(StatusFlags {
                    append: status & O_APPEND != 0,
                    nonblock: status & O_NONBLOCK != 0,
                });
                Ok(0)
            }
            other => Err(KernelError::invalid_argument(format!("fcntl command {}", other))),
        }
    }

    /// Create a pipe; returns (read end, write end)
    #[instrument(skip(self))]
    pub fn pipe(&self, tid: Pid, flags: u32) -> KernelResult<(Fd, Fd)> {
        let (nonblock, cloexec) = stream_flags(flags)?;
        let (reader, writer) = OpenFileHandle::pipe_pair(self.config().pipe_capacity, nonblock);
        self.install_pair(tid, reader, writer, cloexec)
    }

    /// Create a connected pair of bidirectional stream endpoints
    #[instrument(skip(self))]
    pub fn socketpair(&self, tid: Pid, flags: u32) -> KernelResult<(Fd, Fd)> {
        let (nonblock, cloexec) = stream_flags(flags)?;
        let (a, b) = OpenFileHandle::socket_pair(self.config().pipe_capacity, nonblock);
        self.install_pair(tid, a, b, cloexec)
    }

    fn install_pair(&self, tid: Pid, a: HandleRef, b: HandleRef, cloexec: bool) -> KernelResult<(Fd, Fd)> {
        let table = self.processes().fds(tid)?;
        let mut table = table.lock();
        let first = table.allocate(a, cloexec)?;
        match table.allocate(b, cloexec) {
            Ok(second) => Ok((first, second)),
            Err(e) => {
                let undone = table.close(first);
                drop(table);
                drop(undone);
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub fn ioctl(&self, tid: Pid, fd: Fd, request: u32, arg: u64) -> KernelResult<i64> {
        let table = self.processes().fds(tid)?;
        match request {
            FIOCLEX | FIONCLEX => {
                table.lock().set_cloexec(fd, request == FIOCLEX)?;
                Ok(0)
            }
            FIONBIO => {
                let handle = table.lock().handle(fd)?;
                handle.set_nonblocking(arg != 0);
                Ok(0)
            }
            FIONREAD => {
                let handle = table.lock().handle(fd)?;
                Ok(handle.bytes_available()? as i64)
            }
            _ => {
                let handle = table.lock().handle(fd)?;
                handle.ioctl(request, arg)
            }
        }
    }

    pub fn fstat(&self, tid: Pid, fd: Fd) -> KernelResult<Metadata> {
        self.handle(tid, fd)?.stat()
    }
}

/// pipe2-style flags: O_NONBLOCK and O_CLOEXEC only
fn stream_flags(flags: u32) -> KernelResult<(bool, bool)> {
    if flags & !(O_NONBLOCK | O_CLOEXEC) != 0 {
        return Err(KernelError::invalid_argument(format!("stream flags 0o{:o}", flags)));
    }
    Ok((flags & O_NONBLOCK != 0, flags & O_CLOEXEC != 0))
}
