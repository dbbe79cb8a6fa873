/*!
 * Virtual File System Module
 * Node graph, capability method-set, providers and path resolution
 */

pub mod graph;
pub mod node;
pub mod procfs;
pub mod providers;
pub mod resolver;
pub mod traits;
pub mod types;

// Re-exports
pub use graph::{Opened, Vfs};
pub use node::{Node, NodeKind, NodeRef};
pub use providers::{
    Device, DeviceKind, DynamicGroup, Generator, HostDirectory, HostFile, MemDirectory, MemFile,
    Property, Symlink,
};
pub use resolver::{ParentLookup, Resolver};
pub use traits::{DirIter, FileChannel, NodeOps};
pub use types::{Entry, FileType, Metadata, OpenFlags, OpenMode, Permissions, VfsError, VfsResult};
