/*!
 * Filesystem Syscalls
 * Path-based operations resolved against the caller's working directory
 */

use std::time::SystemTime;
use tracing::{debug, instrument};

use crate::core::errors::KernelResult;
use crate::core::types::Pid;
use crate::kernel::Kernel;
use crate::vfs::{Entry, Metadata, NodeRef, Permissions, VfsError};

impl Kernel {
    fn cwd_of(&self, tid: Pid) -> KernelResult<NodeRef> {
        self.enter(tid);
        Ok(self.processes().cwd(tid)?)
    }

    pub fn stat(&self, tid: Pid, path: &str) -> KernelResult<Metadata> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().stat(&cwd, path, true)?)
    }

    /// stat without following a final symlink
    pub fn lstat(&self, tid: Pid, path: &str) -> KernelResult<Metadata> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().stat(&cwd, path, false)?)
    }

    #[instrument(skip(self))]
    pub fn mkdir(&self, tid: Pid, path: &str, mode: u32) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        self.vfs().mkdir(&cwd, path, Permissions::new(mode))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn rmdir(&self, tid: Pid, path: &str) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().rmdir(&cwd, path)?)
    }

    #[instrument(skip(self))]
    pub fn unlink(&self, tid: Pid, path: &str) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().unlink(&cwd, path)?)
    }

    #[instrument(skip(self))]
    pub fn rename(&self, tid: Pid, old: &str, new: &str) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().rename(&cwd, old, new)?)
    }

    /// Create `link` pointing at `target` (stored verbatim)
    #[instrument(skip(self))]
    pub fn symlink(&self, tid: Pid, target: &str, link: &str) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        self.vfs().symlink(&cwd, target, link)?;
        Ok(())
    }

    pub fn readlink(&self, tid: Pid, path: &str) -> KernelResult<String> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().readlink(&cwd, path)?)
    }

    #[instrument(skip(self))]
    pub fn chmod(&self, tid: Pid, path: &str, mode: u32) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().chmod(&cwd, path, Permissions::new(mode))?)
    }

    pub fn utimes(&self, tid: Pid, path: &str, accessed: SystemTime, modified: SystemTime) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().set_times(&cwd, path, accessed, modified)?)
    }

    #[instrument(skip(self))]
    pub fn chdir(&self, tid: Pid, path: &str) -> KernelResult<()> {
        let cwd = self.cwd_of(tid)?;
        let dir = self.vfs().resolve(&cwd, path, true)?;
        if !dir.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()).into());
        }
        self.processes().set_cwd(tid, dir)?;
        debug!(tid, path, "Working directory changed");
        Ok(())
    }

    /// Absolute path of the working directory
    ///
    /// Fails NotFound once the directory has been removed.
    pub fn getcwd(&self, tid: Pid) -> KernelResult<String> {
        let cwd = self.cwd_of(tid)?;
        Ok(cwd.path()?)
    }

    /// Entries of the directory at `path` ("." and ".." are not listed)
    pub fn read_dir(&self, tid: Pid, path: &str) -> KernelResult<Vec<Entry>> {
        let cwd = self.cwd_of(tid)?;
        Ok(self.vfs().read_dir(&cwd, path)?.collect())
    }
}
