/*!
 * POSIX Kernel Library
 * Process and filesystem emulation for a user-space CPU emulator
 */

pub mod core;
pub mod fd;
pub mod kernel;
pub mod memory;
pub mod monitoring;
pub mod process;
pub mod signals;
pub mod syscalls;
pub mod vfs;

// Re-exports
pub use crate::core::{ErrorKind, Fd, InlineString, KernelConfig, KernelError, KernelResult, NodeId, Pid, INIT_PID};
pub use kernel::{Kernel, KernelBuilder};
pub use monitoring::{init_tracing, SyscallSpan};
pub use process::{ExitStatus, ProcessInfo, ProcessTable, Stage, WaitStatus};
pub use signals::{Delivery, SigAction, SigHandler, Signal, SignalSet};
pub use syscalls::{syscall_return, to_errno, Errno, ExecImage};
pub use vfs::{Entry, FileType, Metadata, Vfs};
