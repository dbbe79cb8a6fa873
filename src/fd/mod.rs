/*!
 * File Descriptors
 * Open-file handles, pipes and the per-process descriptor table
 */

pub mod handle;
pub mod pipe;
pub mod table;
pub mod types;

pub use handle::{HandleRef, OpenFileHandle, StatusFlags};
pub use pipe::{pipe, socket_pair, PipeReader, PipeWriter, SocketEnd};
pub use table::{FdEntry, FdTable, SharedFdTable};
pub use types::*;
