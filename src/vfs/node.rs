/*!
 * VFS Node
 * Namespace objects: owning downward edges, non-owning parent back-references
 */

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use super::traits::{DirIter, FileChannel, NodeOps};
use super::types::*;
use crate::core::data_structures::InlineString;
use crate::core::types::NodeId;

/// Shared reference to a node
pub type NodeRef = Arc<Node>;

/// Next identifier for stored nodes; `NodeId::ROOT` is reserved for namespace roots
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(NodeId::ROOT.0 + 1);

/// Type tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Regular,
    Directory,
    Symlink,
    /// Text generated from live state at open time
    Property,
    /// Directory whose children are synthesized by a generator
    DynamicGroup,
    Device,
}

impl NodeKind {
    /// File type reported through stat and iteration
    #[inline]
    #[must_use]
    pub const fn file_type(self) -> FileType {
        match self {
            NodeKind::Regular | NodeKind::Property => FileType::File,
            NodeKind::Directory | NodeKind::DynamicGroup => FileType::Directory,
            NodeKind::Symlink => FileType::Symlink,
            NodeKind::Device => FileType::CharDevice,
        }
    }
}

/// Filesystem object
///
/// Nodes are owned by their parent directory (or by whoever looked them up,
/// for synthesized nodes); the parent link is a `Weak` so the tree has no
/// reference cycles. Dropping the last `NodeRef` runs the provider's
/// `destroy` hook.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    name: RwLock<InlineString>,
    parent: RwLock<Weak<Node>>,
    open_count: AtomicUsize,
    /// Set once the node is removed from its directory
    unlinked: AtomicBool,
    ops: Box<dyn NodeOps>,
}

impl Node {
    /// Create a stored node with a freshly allocated identifier
    pub fn new(
        kind: NodeKind,
        name: impl Into<InlineString>,
        parent: Option<&NodeRef>,
        ops: impl NodeOps + 'static,
    ) -> NodeRef {
        let id = NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, kind, name, parent, ops)
    }

    /// Create a node with a caller-chosen identifier (synthesized or host nodes)
    pub fn with_id(
        id: NodeId,
        kind: NodeKind,
        name: impl Into<InlineString>,
        parent: Option<&NodeRef>,
        ops: impl NodeOps + 'static,
    ) -> NodeRef {
        Arc::new(Self {
            id,
            kind,
            name: RwLock::new(name.into()),
            parent: RwLock::new(parent.map(Arc::downgrade).unwrap_or_default()),
            open_count: AtomicUsize::new(0),
            unlinked: AtomicBool::new(false),
            ops: Box::new(ops),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.kind.file_type()
    }

    /// Check if lookups may descend into this node
    ///
    /// # Performance
    /// Hot path - called for every segment during resolution
    #[inline(always)]
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory | NodeKind::DynamicGroup)
    }

    #[inline(always)]
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::Symlink
    }

    #[must_use]
    pub fn name(&self) -> InlineString {
        self.name.read().clone()
    }

    /// Parent node, if it is still alive
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.read().upgrade()
    }

    pub(crate) fn set_parent(&self, parent: &NodeRef, name: &str) {
        *self.parent.write() = Arc::downgrade(parent);
        *self.name.write() = InlineString::from(name);
    }

    /// Number of open file handles bound to this node
    #[inline]
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }

    pub(crate) fn handle_opened(&self) {
        self.open_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn handle_closed(&self) {
        self.open_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Provider implementation, for downcasting
    #[inline]
    pub fn ops(&self) -> &dyn NodeOps {
        self.ops.as_ref()
    }

    /// Downcast the provider to a concrete type
    pub fn provider<T: 'static>(&self) -> Option<&T> {
        self.ops.as_any().downcast_ref::<T>()
    }

    /// Absolute path built from the parent back-references
    ///
    /// Fails with NotFound when an ancestor is gone (the node was removed).
    pub fn path(self: &Arc<Self>) -> VfsResult<String> {
        let mut parts: Vec<InlineString> = Vec::new();
        let mut current = Arc::clone(self);
        while current.id != NodeId::ROOT {
            parts.push(current.name());
            current = current
                .parent()
                .ok_or_else(|| VfsError::NotFound(format!("{} is detached", self.name())))?;
        }
        if parts.is_empty() {
            return Ok("/".to_string());
        }
        let mut path = String::new();
        for part in parts.iter().rev() {
            path.push('/');
            path.push_str(part);
        }
        Ok(path)
    }

    pub fn lookup(self: &Arc<Self>, name: &str) -> VfsResult<NodeRef> {
        self.ops.lookup(self, name)
    }

    pub fn iterate(self: &Arc<Self>) -> VfsResult<DirIter> {
        self.ops.iterate(self)
    }

    pub fn open(self: &Arc<Self>, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        self.ops.open(self, flags)
    }

    pub fn read_link(self: &Arc<Self>) -> VfsResult<String> {
        self.ops.read_link(self)
    }

    /// Whether the node has been removed from the namespace
    #[inline]
    #[must_use]
    pub fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }

    /// Removed directories accept no new entries
    fn check_linked(&self, name: &str) -> VfsResult<()> {
        if self.is_unlinked() {
            return Err(VfsError::NotFound(format!("{}: directory has been removed", name)));
        }
        Ok(())
    }

    pub fn create_directory(self: &Arc<Self>, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        self.check_linked(name)?;
        self.ops.create_directory(self, name, mode)
    }

    pub fn create_file(self: &Arc<Self>, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        self.check_linked(name)?;
        self.ops.create_file(self, name, mode)
    }

    pub fn create_symlink(self: &Arc<Self>, name: &str, target: &str) -> VfsResult<NodeRef> {
        self.check_linked(name)?;
        self.ops.create_symlink(self, name, target)
    }

    /// Remove the child `name`; the removed node loses its back-reference
    pub fn remove(self: &Arc<Self>, name: &str) -> VfsResult<NodeRef> {
        let removed = self.ops.remove(self, name)?;
        *removed.parent.write() = Weak::new();
        removed.unlinked.store(true, Ordering::Release);
        Ok(removed)
    }

    pub fn rename(self: &Arc<Self>, old_name: &str, new_parent: &NodeRef, new_name: &str) -> VfsResult<()> {
        self.ops.rename(self, old_name, new_parent, new_name)
    }

    pub fn chmod(self: &Arc<Self>, mode: Permissions) -> VfsResult<()> {
        self.ops.chmod(self, mode)
    }

    pub fn set_times(self: &Arc<Self>, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
        self.ops.set_times(self, accessed, modified)
    }

    pub fn metadata(self: &Arc<Self>) -> VfsResult<Metadata> {
        self.ops.metadata(self)
    }

    /// Check whether the directory has any child
    pub fn has_children(self: &Arc<Self>) -> VfsResult<bool> {
        Ok(self.iterate()?.next().is_some())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.ops.destroy(self.id);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name.read().as_str())
            .finish()
    }
}
