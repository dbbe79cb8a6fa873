/*!
 * VFS Types
 * Names, metadata, flags and errors shared by every node kind
 */

mod entry;
mod errors;
mod file_type;
mod metadata;
pub mod open_flags;
mod permissions;

pub use entry::Entry;
pub use errors::{VfsError, VfsResult};
pub use file_type::FileType;
pub use metadata::Metadata;
pub use open_flags::{OpenFlags, OpenMode};
pub use permissions::Permissions;
