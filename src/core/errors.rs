/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::data_structures::InlineString;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::fd::FdError;
pub use crate::memory::MemoryError;
pub use crate::process::ProcessError;
pub use crate::signals::SignalError;
pub use crate::vfs::VfsError;

/// Error taxonomy shared by every component
///
/// Components fail with their own error enums; each of them reports exactly one
/// kind. Only the syscall adapter turns a kind into the platform convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    /// Non-directory traversed, directory where a file was expected, or directory not empty
    WrongType,
    PermissionDenied,
    NotPermitted,
    AlreadyExists,
    NoSuchProcess,
    NoChild,
    BadDescriptor,
    ResourceExhausted,
    SymlinkLoop,
    InvalidArgument,
    Interrupted,
    NotSupported,
    WouldBlock,
    BrokenPipe,
    NotSeekable,
    CrossDevice,
    NotATty,
    NoSpace,
    NotExecutable,
    Io,
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum KernelError {
    #[error("VFS error: {0}")]
    #[diagnostic(
        code(kernel::vfs),
        help("Check the path, the node type, and the parent directory.")
    )]
    Vfs(#[from] VfsError),

    #[error("File descriptor error: {0}")]
    #[diagnostic(code(kernel::fd))]
    Fd(#[from] FdError),

    #[error("Memory error: {0}")]
    #[diagnostic(code(kernel::memory))]
    Memory(#[from] MemoryError),

    #[error("Process error: {0}")]
    #[diagnostic(code(kernel::process))]
    Process(#[from] ProcessError),

    #[error("Signal error: {0}")]
    #[diagnostic(code(kernel::signal))]
    Signal(#[from] SignalError),

    #[error("Interrupted by signal")]
    #[diagnostic(
        code(kernel::interrupted),
        help("A deliverable signal arrived while the call was blocked.")
    )]
    Interrupted,

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(kernel::invalid_argument))]
    InvalidArgument(InlineString),

    #[error("Not supported: {0}")]
    #[diagnostic(
        code(kernel::not_supported),
        help("This operation is not supported by the target node or channel.")
    )]
    NotSupported(InlineString),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(kernel::configuration_error),
        help("Invalid configuration. Review KERNEL_* environment variables and the config file.")
    )]
    Configuration(InlineString),
}

impl KernelError {
    /// Create an invalid argument error
    #[inline]
    pub fn invalid_argument(msg: impl Into<InlineString>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not supported error
    #[inline]
    pub fn not_supported(msg: impl Into<InlineString>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// The taxonomy kind this error reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Vfs(e) => e.kind(),
            KernelError::Fd(e) => e.kind(),
            KernelError::Memory(e) => e.kind(),
            KernelError::Process(e) => e.kind(),
            KernelError::Signal(e) => e.kind(),
            KernelError::Interrupted => ErrorKind::Interrupted,
            KernelError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            KernelError::NotSupported(_) => ErrorKind::NotSupported,
            KernelError::Configuration(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Check whether the error is the interrupted-by-signal kind
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }
}

/// Result type for kernel operations
pub type KernelResult<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through_component_errors() {
        let err: KernelError = VfsError::NotADirectory("/etc/passwd".into()).into();
        assert_eq!(err.kind(), ErrorKind::WrongType);

        let err: KernelError = ProcessError::NoChild.into();
        assert_eq!(err.kind(), ErrorKind::NoChild);

        let err: KernelError = FdError::BadDescriptor(9).into();
        assert_eq!(err.kind(), ErrorKind::BadDescriptor);
    }

    #[test]
    fn test_kernel_error_display() {
        let error = KernelError::invalid_argument("bad whence");
        assert_eq!(error.to_string(), "Invalid argument: bad whence");
        assert!(KernelError::Interrupted.is_interrupted());
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::SymlinkLoop).unwrap();
        assert_eq!(json, "\"symlink_loop\"");
    }
}
