/*!
 * VFS Facade
 * Namespace operations used by the syscall surface
 */

use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

use super::node::NodeRef;
use super::providers::MemDirectory;
use super::resolver::{ParentLookup, Resolver};
use super::traits::{DirIter, FileChannel};
use super::types::*;

/// Node opened by `Vfs::open`
pub struct Opened {
    pub node: NodeRef,
    pub channel: Box<dyn FileChannel>,
}

/// The filesystem namespace
///
/// Cheap to clone; all clones share the same root. Every operation takes the
/// caller's working directory for relative paths.
#[derive(Clone)]
pub struct Vfs {
    root: NodeRef,
    max_symlink_expansions: usize,
}

impl Vfs {
    /// Empty namespace with an in-memory root
    pub fn new(max_symlink_expansions: usize) -> Self {
        Self::with_root(MemDirectory::create_root(), max_symlink_expansions)
    }

    pub fn with_root(root: NodeRef, max_symlink_expansions: usize) -> Self {
        Self {
            root,
            max_symlink_expansions,
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    #[inline]
    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.root, self.max_symlink_expansions)
    }

    /// Attach `node` at `path`, shadowing any unprotected entry there
    ///
    /// The parent must be an in-memory directory; the mount point cannot be
    /// removed afterwards.
    pub fn mount(&self, path: &str, node: NodeRef) -> VfsResult<()> {
        let lookup = self.resolve_parent(&self.root, path)?;
        let dir = lookup
            .dir
            .provider::<MemDirectory>()
            .ok_or_else(|| VfsError::NotSupported(format!("cannot mount under {}", path)))?;
        dir.attach(&lookup.dir, &lookup.name, node, true)?;
        info!(path, "Mounted");
        Ok(())
    }

    pub fn resolve(&self, cwd: &NodeRef, path: &str, follow: bool) -> VfsResult<NodeRef> {
        self.resolver().resolve(cwd, path, follow)
    }

    pub fn resolve_parent(&self, cwd: &NodeRef, path: &str) -> VfsResult<ParentLookup> {
        self.resolver().resolve_parent(cwd, path)
    }

    /// Open (and with `create`, possibly create) the node at `path`
    pub fn open(&self, cwd: &NodeRef, path: &str, flags: OpenFlags, mode: OpenMode) -> VfsResult<Opened> {
        flags.validate()?;
        let node = if flags.will_create() {
            self.open_or_create(cwd, path, flags, mode)?
        } else {
            self.resolve(cwd, path, !flags.nofollow)?
        };

        if node.is_symlink() {
            return Err(VfsError::SymlinkLoop(format!("{} is a symbolic link", path)));
        }
        if flags.directory && !node.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        if node.is_dir() && flags.is_writable() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }

        let channel = node.open(flags)?;
        debug!(path, id = %node.id(), "Opened");
        Ok(Opened { node, channel })
    }

    fn open_or_create(&self, cwd: &NodeRef, path: &str, flags: OpenFlags, mode: OpenMode) -> VfsResult<NodeRef> {
        let ParentLookup {
            dir,
            name,
            trailing_slash,
        } = self.resolve_parent(cwd, path)?;
        match dir.lookup(&name) {
            Ok(_) if flags.create_new => Err(VfsError::AlreadyExists(path.to_string())),
            Ok(existing) if existing.is_symlink() && !flags.nofollow => {
                self.resolve(cwd, path, true)
            }
            Ok(existing) => Ok(existing),
            Err(VfsError::NotFound(_)) if trailing_slash => {
                Err(VfsError::IsADirectory(path.to_string()))
            }
            Err(VfsError::NotFound(_)) => dir.create_file(&name, mode.permissions),
            Err(e) => Err(e),
        }
    }

    pub fn mkdir(&self, cwd: &NodeRef, path: &str, mode: Permissions) -> VfsResult<NodeRef> {
        let lookup = self.resolve_parent(cwd, path)?;
        if lookup.dir.lookup(&lookup.name).is_ok() {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        let node = lookup.dir.create_directory(&lookup.name, mode)?;
        debug!(path, id = %node.id(), "Directory created");
        Ok(node)
    }

    pub fn rmdir(&self, cwd: &NodeRef, path: &str) -> VfsResult<()> {
        let lookup = self.resolve_parent(cwd, path)?;
        let child = lookup.dir.lookup(&lookup.name)?;
        if !child.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        if Arc::ptr_eq(&child, &self.root) {
            return Err(VfsError::Busy(path.to_string()));
        }
        lookup.dir.remove(&lookup.name)?;
        debug!(path, "Directory removed");
        Ok(())
    }

    pub fn unlink(&self, cwd: &NodeRef, path: &str) -> VfsResult<()> {
        let lookup = self.resolve_parent(cwd, path)?;
        let child = lookup.dir.lookup(&lookup.name)?;
        if child.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        if lookup.trailing_slash {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        lookup.dir.remove(&lookup.name)?;
        debug!(path, "Unlinked");
        Ok(())
    }

    /// Move `old` to `new`, replacing a compatible destination
    pub fn rename(&self, cwd: &NodeRef, old: &str, new: &str) -> VfsResult<()> {
        let from = self.resolve_parent(cwd, old)?;
        let to = self.resolve_parent(cwd, new)?;
        let moving = from.dir.lookup(&from.name)?;

        if Arc::ptr_eq(&from.dir, &to.dir) && from.name == to.name {
            return Ok(());
        }
        if (from.trailing_slash || to.trailing_slash) && !moving.is_dir() {
            return Err(VfsError::NotADirectory(old.to_string()));
        }
        if moving.is_dir() {
            // A directory cannot move below itself
            let mut ancestor = Some(Arc::clone(&to.dir));
            while let Some(dir) = ancestor {
                if Arc::ptr_eq(&dir, &moving) {
                    return Err(VfsError::InvalidArgument(format!(
                        "cannot move {} into its own subtree",
                        old
                    )));
                }
                if Arc::ptr_eq(&dir, &self.root) {
                    break;
                }
                ancestor = dir.parent();
            }
        }

        match to.dir.lookup(&to.name) {
            Ok(existing) if Arc::ptr_eq(&existing, &moving) => return Ok(()),
            Ok(existing) => match (moving.is_dir(), existing.is_dir()) {
                (true, false) => return Err(VfsError::NotADirectory(new.to_string())),
                (false, true) => return Err(VfsError::IsADirectory(new.to_string())),
                (true, true) if existing.has_children()? => {
                    return Err(VfsError::NotEmpty(new.to_string()))
                }
                _ => {}
            },
            Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        from.dir.rename(&from.name, &to.dir, &to.name)?;
        debug!(from = old, to = new, "Renamed");
        Ok(())
    }

    pub fn symlink(&self, cwd: &NodeRef, target: &str, link: &str) -> VfsResult<NodeRef> {
        let lookup = self.resolve_parent(cwd, link)?;
        if lookup.dir.lookup(&lookup.name).is_ok() {
            return Err(VfsError::AlreadyExists(link.to_string()));
        }
        lookup.dir.create_symlink(&lookup.name, target)
    }

    pub fn readlink(&self, cwd: &NodeRef, path: &str) -> VfsResult<String> {
        self.resolve(cwd, path, false)?.read_link()
    }

    pub fn stat(&self, cwd: &NodeRef, path: &str, follow: bool) -> VfsResult<Metadata> {
        self.resolve(cwd, path, follow)?.metadata()
    }

    pub fn chmod(&self, cwd: &NodeRef, path: &str, mode: Permissions) -> VfsResult<()> {
        self.resolve(cwd, path, true)?.chmod(mode)
    }

    pub fn set_times(
        &self,
        cwd: &NodeRef,
        path: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> VfsResult<()> {
        self.resolve(cwd, path, true)?.set_times(accessed, modified)
    }

    /// Snapshot of the directory at `path`
    pub fn read_dir(&self, cwd: &NodeRef, path: &str) -> VfsResult<DirIter> {
        let node = self.resolve(cwd, path, true)?;
        if !node.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        node.iterate()
    }
}
