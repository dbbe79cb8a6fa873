/*!
 * Host Directory Provider
 * Mounts a host directory into the namespace; the only persistent storage
 */

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::Any;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tracing::debug;

use super::symlink::Symlink;
use crate::core::types::NodeId;
use crate::vfs::node::{Node, NodeKind, NodeRef};
use crate::vfs::traits::{DirIter, FileChannel, NodeOps};
use crate::vfs::types::*;

/// Identity cache of one host mount
///
/// Repeated lookups of the same host path share one node while any reference
/// to it is alive; the node's teardown hook evicts the entry.
struct HostCache {
    nodes: DashMap<PathBuf, Weak<Node>, RandomState>,
    mount_id: NodeId,
    readonly: bool,
}

impl HostCache {
    fn check_write(&self) -> VfsResult<()> {
        if self.readonly {
            return Err(VfsError::ReadOnly);
        }
        Ok(())
    }

    fn evict(&self, path: &Path) {
        self.nodes.remove_if(path, |_, node| node.strong_count() == 0);
    }

    /// Move cache entries (and the providers' paths) from `old` to `new`
    fn rename_prefix(&self, old: &Path, new: &Path) {
        self.nodes.remove(new);
        let moved: Vec<(PathBuf, NodeRef)> = self
            .nodes
            .iter()
            .filter(|entry| entry.key().starts_with(old))
            .filter_map(|entry| entry.value().upgrade().map(|n| (entry.key().clone(), n)))
            .collect();
        for (path, node) in moved {
            self.nodes.remove(&path);
            let relocated = match path.strip_prefix(old) {
                Ok(rest) if rest.as_os_str().is_empty() => new.to_path_buf(),
                Ok(rest) => new.join(rest),
                Err(_) => continue,
            };
            if let Some(slot) = host_path_slot(&node) {
                *slot.write() = relocated.clone();
            }
            self.nodes.insert(relocated, Arc::downgrade(&node));
        }
    }
}

fn host_path_slot(node: &NodeRef) -> Option<&RwLock<PathBuf>> {
    if let Some(dir) = node.provider::<HostDirectory>() {
        return Some(&dir.path);
    }
    node.provider::<HostFile>().map(|file| &file.path)
}

fn io_error(e: std::io::Error, path: &Path) -> VfsError {
    use std::io::ErrorKind;
    let context = path.display().to_string();
    match e.kind() {
        ErrorKind::NotFound => VfsError::NotFound(context),
        ErrorKind::PermissionDenied => VfsError::PermissionDenied(context),
        ErrorKind::AlreadyExists => VfsError::AlreadyExists(context),
        _ => VfsError::IoError(format!("{}: {}", context, e)),
    }
}

#[cfg(unix)]
fn host_key(md: &fs::Metadata, _path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    md.ino()
}

#[cfg(not(unix))]
fn host_key(_md: &fs::Metadata, path: &Path) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

fn convert_file_type(ft: fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_file() {
        FileType::File
    } else {
        FileType::Unknown
    }
}

fn convert_metadata(id: NodeId, md: &fs::Metadata) -> Metadata {
    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        md.permissions().mode()
    };
    #[cfg(not(unix))]
    let mode = if md.permissions().readonly() {
        0o444
    } else {
        0o644
    };

    Metadata {
        id,
        file_type: convert_file_type(md.file_type()),
        size: md.len(),
        permissions: Permissions::new(mode),
        nlink: 1,
        modified: md.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        accessed: md.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
        created: md.created().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

fn set_mode(path: &Path, mode: Permissions) -> VfsResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode.mode))
            .map_err(|e| io_error(e, path))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path).map_err(|e| io_error(e, path))?.permissions();
        perms.set_readonly(mode.is_readonly());
        fs::set_permissions(path, perms).map_err(|e| io_error(e, path))
    }
}

/// Node for `path`, shared with any live node for the same host path
fn node_for(cache: &Arc<HostCache>, parent: &NodeRef, name: &str, path: PathBuf) -> VfsResult<NodeRef> {
    if let Some(existing) = cache.nodes.get(&path).and_then(|weak| weak.upgrade()) {
        return Ok(existing);
    }
    let md = fs::symlink_metadata(&path).map_err(|e| io_error(e, &path))?;
    let id = NodeId::derived(cache.mount_id, host_key(&md, &path));

    if md.file_type().is_symlink() {
        // Links are cheap to rebuild and are not cached
        let target = fs::read_link(&path).map_err(|e| io_error(e, &path))?;
        return Ok(Node::with_id(
            id,
            NodeKind::Symlink,
            name,
            Some(parent),
            Symlink::fixed(target.to_string_lossy().into_owned()),
        ));
    }

    let node = if md.is_dir() {
        Node::with_id(
            id,
            NodeKind::Directory,
            name,
            Some(parent),
            HostDirectory {
                path: RwLock::new(path.clone()),
                cache: Arc::clone(cache),
            },
        )
    } else {
        Node::with_id(
            id,
            NodeKind::Regular,
            name,
            Some(parent),
            HostFile {
                path: RwLock::new(path.clone()),
                cache: Arc::clone(cache),
            },
        )
    };
    cache.nodes.insert(path, Arc::downgrade(&node));
    Ok(node)
}

/// Directory backed by a host directory
pub struct HostDirectory {
    path: RwLock<PathBuf>,
    cache: Arc<HostCache>,
}

impl HostDirectory {
    /// Build the root node of a host mount
    pub fn mount(root: impl Into<PathBuf>, readonly: bool) -> VfsResult<NodeRef> {
        let root = root.into();
        let md = fs::metadata(&root).map_err(|e| io_error(e, &root))?;
        if !md.is_dir() {
            return Err(VfsError::NotADirectory(root.display().to_string()));
        }
        let mount_id = NodeId::derived(NodeId::ROOT, host_key(&md, &root));
        let cache = Arc::new(HostCache {
            nodes: DashMap::with_hasher(RandomState::new()),
            mount_id,
            readonly,
        });
        debug!(path = %root.display(), readonly, "Host directory mounted");
        Ok(Node::with_id(
            mount_id,
            NodeKind::Directory,
            "storage",
            None,
            HostDirectory {
                path: RwLock::new(root),
                cache,
            },
        ))
    }

    /// Host path currently backing this directory
    #[must_use]
    pub fn host_path(&self) -> PathBuf {
        self.path.read().clone()
    }

    fn child_path(&self, name: &str) -> VfsResult<PathBuf> {
        Entry::validate_name(name)?;
        Ok(self.path.read().join(name))
    }
}

impl NodeOps for HostDirectory {
    fn lookup(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        let path = self.child_path(name)?;
        node_for(&self.cache, this, name, path)
    }

    fn iterate(&self, _this: &NodeRef) -> VfsResult<DirIter> {
        let path = self.host_path();
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| io_error(e, &path))? {
            let entry = entry.map_err(|e| io_error(e, &path))?;
            let md = match entry.path().symlink_metadata() {
                Ok(md) => md,
                // Vanished between listing and stat
                Err(_) => continue,
            };
            entries.push(Entry::new(
                NodeId::derived(self.cache.mount_id, host_key(&md, &entry.path())),
                entry.file_name().to_string_lossy().into_owned(),
                convert_file_type(md.file_type()),
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(DirIter::from_entries(entries))
    }

    fn open(&self, this: &NodeRef, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        if flags.is_writable() {
            return Err(VfsError::IsADirectory(this.name().to_string()));
        }
        Ok(Box::new(super::directory::DirectoryChannel))
    }

    fn create_directory(&self, this: &NodeRef, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        self.cache.check_write()?;
        let path = self.child_path(name)?;
        fs::create_dir(&path).map_err(|e| io_error(e, &path))?;
        set_mode(&path, mode)?;
        node_for(&self.cache, this, name, path)
    }

    fn create_file(&self, this: &NodeRef, name: &str, mode: Permissions) -> VfsResult<NodeRef> {
        self.cache.check_write()?;
        let path = self.child_path(name)?;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| io_error(e, &path))?;
        set_mode(&path, mode)?;
        node_for(&self.cache, this, name, path)
    }

    fn create_symlink(&self, this: &NodeRef, name: &str, target: &str) -> VfsResult<NodeRef> {
        self.cache.check_write()?;
        let path = self.child_path(name)?;
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, &path).map_err(|e| io_error(e, &path))?;
            node_for(&self.cache, this, name, path)
        }
        #[cfg(not(unix))]
        {
            let _ = (this, target, path);
            Err(VfsError::NotSupported("host symlinks".into()))
        }
    }

    fn remove(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        self.cache.check_write()?;
        let path = self.child_path(name)?;
        let node = node_for(&self.cache, this, name, path.clone())?;
        if node.is_dir() {
            let mut listing = fs::read_dir(&path).map_err(|e| io_error(e, &path))?;
            if listing.next().is_some() {
                return Err(VfsError::NotEmpty(name.to_string()));
            }
            fs::remove_dir(&path).map_err(|e| io_error(e, &path))?;
        } else {
            fs::remove_file(&path).map_err(|e| io_error(e, &path))?;
        }
        self.cache.nodes.remove(&path);
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
            .provider::<HostDirectory>()
            .filter(|dir| Arc::ptr_eq(&dir.cache, &self.cache))
            .ok_or(VfsError::CrossDevice)?;
        self.cache.check_write()?;
        let old_path = self.child_path(old_name)?;
        let new_path = target.child_path(new_name)?;
        // Keep the moved node alive so its back-reference can be updated
        let moved = node_for(&self.cache, this, old_name, old_path.clone())?;
        fs::rename(&old_path, &new_path).map_err(|e| io_error(e, &old_path))?;
        self.cache.rename_prefix(&old_path, &new_path);
        moved.set_parent(new_parent, new_name);
        Ok(())
    }

    fn chmod(&self, _this: &NodeRef, mode: Permissions) -> VfsResult<()> {
        self.cache.check_write()?;
        set_mode(&self.host_path(), mode)
    }

    fn set_times(&self, _this: &NodeRef, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
        self.cache.check_write()?;
        set_host_times(&self.host_path(), accessed, modified)
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        let path = self.host_path();
        let md = fs::metadata(&path).map_err(|e| io_error(e, &path))?;
        Ok(convert_metadata(this.id(), &md))
    }

    fn destroy(&self, _id: NodeId) {
        self.cache.evict(&self.path.read());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn set_host_times(path: &Path, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
    let file = fs::File::open(path).map_err(|e| io_error(e, path))?;
    file.set_times(
        fs::FileTimes::new()
            .set_accessed(accessed)
            .set_modified(modified),
    )
    .map_err(|e| io_error(e, path))
}

/// Regular file backed by a host file
pub struct HostFile {
    path: RwLock<PathBuf>,
    cache: Arc<HostCache>,
}

impl NodeOps for HostFile {
    fn open(&self, _this: &NodeRef, flags: OpenFlags) -> VfsResult<Box<dyn FileChannel>> {
        if flags.is_writable() {
            self.cache.check_write()?;
        }
        let path = self.path.read().clone();
        let file = fs::OpenOptions::new()
            .read(flags.read)
            .write(flags.is_writable())
            .truncate(flags.truncate)
            .open(&path)
            .map_err(|e| io_error(e, &path))?;
        Ok(Box::new(HostFileChannel { file, path }))
    }

    fn chmod(&self, _this: &NodeRef, mode: Permissions) -> VfsResult<()> {
        self.cache.check_write()?;
        set_mode(&self.path.read(), mode)
    }

    fn set_times(&self, _this: &NodeRef, accessed: SystemTime, modified: SystemTime) -> VfsResult<()> {
        self.cache.check_write()?;
        set_host_times(&self.path.read(), accessed, modified)
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        let path = self.path.read().clone();
        let md = fs::metadata(&path).map_err(|e| io_error(e, &path))?;
        Ok(convert_metadata(this.id(), &md))
    }

    fn destroy(&self, _id: NodeId) {
        self.cache.evict(&self.path.read());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct HostFileChannel {
    file: fs::File,
    path: PathBuf,
}

impl FileChannel for HostFileChannel {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.file
            .seek(SeekFrom::Start(pos))
            .and_then(|_| self.file.read(buf))
            .map_err(|e| io_error(e, &self.path))
    }

    fn write(&mut self, pos: u64, data: &[u8]) -> VfsResult<usize> {
        self.file
            .seek(SeekFrom::Start(pos))
            .and_then(|_| self.file.write(data))
            .map_err(|e| io_error(e, &self.path))
    }

    fn size(&self) -> VfsResult<u64> {
        self.file
            .metadata()
            .map(|md| md.len())
            .map_err(|e| io_error(e, &self.path))
    }

    fn truncate(&mut self, len: u64) -> VfsResult<()> {
        self.file.set_len(len).map_err(|e| io_error(e, &self.path))
    }
}
