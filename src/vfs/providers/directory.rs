/*!
 * In-Memory Directory
 * Stored children ordered by name
 */

use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use super::file::MemFile;
use super::symlink::Symlink;
use super::Attributes;
use crate::core::data_structures::InlineString;
use crate::core::types::NodeId;
use crate::vfs::node::{Node, NodeKind, NodeRef};
use crate::vfs::traits::{DirIter, FileChannel, NodeOps};
use crate::vfs::types::*;

struct Child {
    node: NodeRef,
    /// Mount points and boot-time entries cannot be removed or replaced
    protected: bool,
}

/// Directory whose children live in memory
pub struct MemDirectory {
    children: RwLock<BTreeMap<InlineString, Child>>,
    attrs: Attributes,
}

impl MemDirectory {
    pub fn new(mode: Permissions) -> Self {
        Self {
            children: RwLock::new(BTreeMap::new()),
            attrs: Attributes::new(mode),
        }
    }

    /// Namespace root
    pub fn create_root() -> NodeRef {
        Node::with_id(
            NodeId::ROOT,
            NodeKind::Directory,
            "/",
            None,
            Self::new(Permissions::executable()),
        )
    }

    /// Attach an externally built node under `name`
    ///
    /// Used for mount points and for the fixed entries created at boot; with
    /// `protected` set the entry refuses removal and replacement.
    pub fn attach(&self, this: &NodeRef, name: &str, node: NodeRef, protected: bool) -> VfsResult<()> {
        Entry::validate_name(name)?;
        let mut children = self.children.write();
        if let Some(existing) = children.get(name) {
            if existing.protected {
                return Err(VfsError::Busy(name.to_string()));
            }
        }
        node.set_parent(this, name);
        children.insert(InlineString::from(name), Child { node, protected });
        drop(children);
        self.attrs.touch();
        Ok(())
    }

    /// Number of stored children
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    fn check_writable(&self, this: &NodeRef) -> VfsResult<()> {
        if self.attrs.permissions().is_readonly() {
            return Err(VfsError::PermissionDenied(format!(
                "directory is readonly: {}",
                this.name()
            )));
        }
        Ok(())
    }

    fn insert_new<F>(&self, this: &NodeRef, name: &str, make: F) -> VfsResult<NodeRef>
    where
        F: FnOnce() -> NodeRef,
    {
        Entry::validate_name(name)?;
        self.check_writable(this)?;
        let mut children = self.children.write();
        if children.contains_key(name) {
            return Err(VfsError::AlreadyExists(name.to_string()));
        }
        let node = make();
        children.insert(
            InlineString::from(name),
            Child {
                node: Arc::clone(&node),
                protected: false,
            },
        );
        drop(children);
        self.attrs.touch();
        Ok(node)
    }

    fn check_removable(&self, name: &str) -> VfsResult<NodeRef> {
        let children = self.children.read();
        let child = children
            .get(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        if child.protected {
            return Err(VfsError::Busy(name.to_string()));
        }
        Ok(Arc::clone(&child.node))
    }

    fn check_replaceable(&self, name: &str) -> VfsResult<()> {
        match self.children.read().get(name) {
            Some(child) if child.protected => Err(VfsError::Busy(name.to_string())),
            _ => Ok(()),
        }
    }
}

impl NodeOps for MemDirectory {
    fn lookup(&self, _this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        self.children
            .read()
            .get(name)
            .map(|child| Arc::clone(&child.node))
            .ok_or_else(|| VfsError::NotFound(name.to_string()))
    }

    fn iterate(&self, _this: &NodeRef) -> VfsResult<DirIter> {
        let snapshot: Vec<Entry> = self
            .children
            .read()
            .iter()
            .map(|(name, child)| Entry::new(child.node.id(), name.clone(), child.node.file_type()))
            .collect();
        Ok(DirIter::from_entries(snapshot))
    }

    fn open(&self, this: &NodeRef, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        if flags.is_writable() {
            return Err(VfsError::IsADirectory(this.name().to_string()));
        }
        Ok(Box::new(DirectoryChannel))
    }

    fn create_directory(&self, this: &NodeRef, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        self.insert_new(this, name, || {
            Node::new(NodeKind::Directory, name, Some(this), MemDirectory::new(mode))
        })
    }

    fn create_file(&self, this: &NodeRef, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        self.insert_new(this, name, || {
            Node::new(NodeKind::Regular, name, Some(this), MemFile::new(mode))
        })
    }

    fn create_symlink(&self, this: &NodeRef, name: &str, target: &str) -> VfsResult<NodeRef> {
        if target.is_empty() {
            return Err(VfsError::NotFound("empty symlink target".into()));
        }
        self.insert_new(this, name, || {
            Node::new(NodeKind::Symlink, name, Some(this), Symlink::fixed(target))
        })
    }

    fn remove(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        self.check_writable(this)?;
        let node = self.check_removable(name)?;
        if node.is_dir() && node.has_children()? {
            return Err(VfsError::NotEmpty(name.to_string()));
        }
        self.children.write().remove(name);
        self.attrs.touch();
        Ok(node)
    }

    fn rename(
        &self,
        this: &NodeRef,
        old_name: &str,
        new_parent: &NodeRef,
        new_name: &str,
    ) -> VfsResult<()> {
        let target = new_parent
            .provider::<MemDirectory>()
            .ok_or(VfsError::CrossDevice)?;
        Entry::validate_name(new_name)?;
        self.check_writable(this)?;
        target.check_writable(new_parent)?;
        self.check_removable(old_name)?;
        target.check_replaceable(new_name)?;

        let moved = self
            .children
            .write()
            .remove(old_name)
            .ok_or_else(|| VfsError::NotFound(old_name.to_string()))?;
        moved.node.set_parent(new_parent, new_name);
        // The replaced node is released after the map lock is gone
        let replaced = target
            .children
            .write()
            .insert(InlineString::from(new_name), moved);
        drop(replaced);

        self.attrs.touch();
        if !Arc::ptr_eq(this, new_parent) {
            target.attrs.touch();
        }
        Ok(())
    }

    fn chmod(&self, _this: &NodeRef, mode: Permissions) -> VfsResult<()> {
        self.attrs.set_permissions(mode);
        Ok(())
    }

    fn set_times(&self, _this: &NodeRef, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
        self.attrs.set_times(accessed, modified);
        Ok(())
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        let mut metadata = self.attrs.metadata(this.id(), FileType::Directory, 0);
        let subdirs = self
            .children
            .read()
            .values()
            .filter(|child| child.node.is_dir())
            .count();
        metadata.nlink = 2 + subdirs as u64;
        Ok(metadata)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Channel of a directory opened for reading; entries are read through
/// `read_dir`, not `read`
pub(crate) struct DirectoryChannel;

impl FileChannel for DirectoryChannel {
    fn read(&mut self, _pos: u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::IsADirectory("cannot read a directory".into()))
    }

    fn write(&mut self, _pos: u64, _data: &[u8]) -> VfsResult<usize> {
        Err(VfsError::IsADirectory("cannot write a directory".into()))
    }
}
