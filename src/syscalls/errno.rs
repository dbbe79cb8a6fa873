/*!
 * Errno Adapter
 * The one place error kinds become Linux errno values
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::core::errors::{ErrorKind, FdError, KernelError, KernelResult, MemoryError, ProcessError, VfsError};

/// Linux errno values used by the syscall surface
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Errno {
    EPERM = 1,
    ENOENT = 2,
    ESRCH = 3,
    EINTR = 4,
    EIO = 5,
    ENOEXEC = 8,
    EBADF = 9,
    ECHILD = 10,
    EAGAIN = 11,
    ENOMEM = 12,
    EACCES = 13,
    EBUSY = 16,
    EEXIST = 17,
    EXDEV = 18,
    ENOTDIR = 20,
    EISDIR = 21,
    EINVAL = 22,
    EMFILE = 24,
    ENOTTY = 25,
    ENOSPC = 28,
    ESPIPE = 29,
    EPIPE = 32,
    ENAMETOOLONG = 36,
    ENOTEMPTY = 39,
    ELOOP = 40,
    EOPNOTSUPP = 95,
}

impl Errno {
    /// Default errno of a kind
    pub const fn from_kind(kind: ErrorKind) -> Errno {
        match kind {
            ErrorKind::NotFound => Errno::ENOENT,
            ErrorKind::WrongType => Errno::ENOTDIR,
            ErrorKind::PermissionDenied => Errno::EACCES,
            ErrorKind::NotPermitted => Errno::EPERM,
            ErrorKind::AlreadyExists => Errno::EEXIST,
            ErrorKind::NoSuchProcess => Errno::ESRCH,
            ErrorKind::NoChild => Errno::ECHILD,
            ErrorKind::BadDescriptor => Errno::EBADF,
            ErrorKind::ResourceExhausted => Errno::EAGAIN,
            ErrorKind::SymlinkLoop => Errno::ELOOP,
            ErrorKind::InvalidArgument => Errno::EINVAL,
            ErrorKind::Interrupted => Errno::EINTR,
            ErrorKind::NotSupported => Errno::EOPNOTSUPP,
            ErrorKind::WouldBlock => Errno::EAGAIN,
            ErrorKind::BrokenPipe => Errno::EPIPE,
            ErrorKind::NotSeekable => Errno::ESPIPE,
            ErrorKind::CrossDevice => Errno::EXDEV,
            ErrorKind::NotATty => Errno::ENOTTY,
            ErrorKind::NoSpace => Errno::ENOSPC,
            ErrorKind::NotExecutable => Errno::ENOEXEC,
            ErrorKind::Io => Errno::EIO,
        }
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Errno for a kernel error
///
/// Starts from the kind and refines it where Linux distinguishes cases the
/// taxonomy folds together (is-a-directory, not-empty, descriptor versus
/// memory exhaustion).
pub fn to_errno(err: &KernelError) -> Errno {
    match err {
        KernelError::Vfs(VfsError::IsADirectory(_)) => Errno::EISDIR,
        KernelError::Vfs(VfsError::NotEmpty(_)) => Errno::ENOTEMPTY,
        KernelError::Vfs(VfsError::NameTooLong(_)) => Errno::ENAMETOOLONG,
        KernelError::Vfs(VfsError::Busy(_)) => Errno::EBUSY,
        KernelError::Fd(FdError::Exhausted { .. }) => Errno::EMFILE,
        KernelError::Memory(
            MemoryError::OutOfAddressSpace { .. }
            | MemoryError::TooManyMappings { .. }
            | MemoryError::OutOfMemory { .. },
        ) => Errno::ENOMEM,
        KernelError::Process(ProcessError::InterpreterLoop(_)) => Errno::ELOOP,
        other => Errno::from_kind(other.kind()),
    }
}

/// Linux return convention: the value on success, `-errno` on failure
pub fn syscall_return<T: Into<i64>>(result: KernelResult<T>) -> i64 {
    match result {
        Ok(value) => value.into(),
        Err(e) => {
            let errno = to_errno(&e);
            trace!(%errno, error = %e, "Syscall failed");
            -i64::from(errno.code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Errno::from_kind(ErrorKind::NoChild), Errno::ECHILD);
        assert_eq!(Errno::from_kind(ErrorKind::Interrupted).code(), 4);
        assert_eq!(Errno::from_kind(ErrorKind::SymlinkLoop).code(), 40);
    }

    #[test]
    fn test_refinements() {
        let err: KernelError = VfsError::NotEmpty("/tmp/d".into()).into();
        assert_eq!(err.kind(), ErrorKind::WrongType);
        assert_eq!(to_errno(&err), Errno::ENOTEMPTY);

        let err: KernelError = FdError::Exhausted { capacity: 3 }.into();
        assert_eq!(to_errno(&err), Errno::EMFILE);
    }

    #[test]
    fn test_return_convention() {
        assert_eq!(syscall_return::<i64>(Ok(7)), 7);
        assert_eq!(syscall_return::<i64>(Err(ProcessError::NoChild.into())), -10);
        assert_eq!(syscall_return::<u32>(Err(KernelError::Interrupted)), -4);
    }
}
