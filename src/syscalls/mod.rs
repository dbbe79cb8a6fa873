/*!
 * Syscalls Module
 * POSIX system call surface implemented as methods on `Kernel`
 *
 * Every call takes the calling thread id first. Methods return typed
 * `KernelResult`s; `errno` turns them into the Linux return convention.
 */

pub mod errno;
mod fd;
mod fs;
mod mmap;
mod process;
mod signal;
mod wait;

// Re-export public API
pub use errno::{syscall_return, to_errno, Errno};
pub use process::ExecImage;
