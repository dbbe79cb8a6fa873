/*!
 * Symbolic Link
 * Fixed or computed target text
 */

use std::any::Any;
use std::time::SystemTime;

use crate::vfs::node::NodeRef;
use crate::vfs::traits::NodeOps;
use crate::vfs::types::*;

type TargetFn = Box<dyn Fn() -> VfsResult<String> + Send + Sync>;

enum Target {
    Fixed(String),
    Computed(TargetFn),
}

/// Symbolic link node
pub struct Symlink {
    target: Target,
    created: SystemTime,
}

impl Symlink {
    pub fn fixed(target: impl Into<String>) -> Self {
        Self {
            target: Target::Fixed(target.into()),
            created: SystemTime::now(),
        }
    }

    /// Link whose target is recomputed on every read (e.g. `/proc/self`)
    pub fn computed<F>(target: F) -> Self
    where
        F: Fn() -> VfsResult<String> + Send + Sync + 'static,
    {
        Self {
            target: Target::Computed(Box::new(target)),
            created: SystemTime::now(),
        }
    }

    fn target(&self) -> VfsResult<String> {
        match &self.target {
            Target::Fixed(text) => Ok(text.clone()),
            Target::Computed(compute) => compute(),
        }
    }
}

impl NodeOps for Symlink {
    fn read_link(&self, _this: &NodeRef) -> VfsResult<String> {
        self.target()
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        let size = self.target().map(|t| t.len() as u64).unwrap_or(0);
        Ok(Metadata::new(
            this.id(),
            FileType::Symlink,
            size,
            Permissions::symlink(),
            self.created,
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
