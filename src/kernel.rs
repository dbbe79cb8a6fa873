/*!
 * Kernel Context
 * Long-lived state shared by every logical process, and the cooperative
 * suspension points blocking syscalls are built on
 */

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::KernelConfig;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::Pid;
use crate::monitoring::SyscallSpan;
use crate::process::{ProcessError, ProcessTable, Stage, TableLimits};
use crate::signals::Delivery;
use crate::vfs::{procfs, Device, DeviceKind, HostDirectory, Node, NodeKind, Permissions, Symlink, Vfs};

struct KernelInner {
    config: KernelConfig,
    processes: ProcessTable,
    vfs: Vfs,
}

/// Kernel context
///
/// Cheap to clone; every logical process future holds a clone. Syscalls are
/// methods on this type (see `syscalls`).
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

/// Builder for a booted kernel
///
/// # Example
/// ```ignore
/// let kernel = Kernel::builder()
///     .with_config(config)
///     .with_storage("/var/lib/kernel")
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct KernelBuilder {
    config: Option<KernelConfig>,
    storage: Option<PathBuf>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Host directory mounted at /storage (overrides the config)
    pub fn with_storage(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = Some(path.into());
        self
    }

    /// Build the namespace and create init
    pub fn build(self) -> KernelResult<Kernel> {
        let mut config = self.config.unwrap_or_default();
        if let Some(storage) = self.storage {
            config.storage_path = Some(storage);
        }
        config.validate()?;

        let vfs = Vfs::new(config.max_symlink_expansions);
        let processes = ProcessTable::new(TableLimits::from(&config));
        let root = vfs.root().clone();

        vfs.mkdir(&root, "/dev", Permissions::executable())?;
        for kind in [DeviceKind::Null, DeviceKind::Zero, DeviceKind::Full] {
            let path = format!("/dev/{}", kind.name());
            vfs.mount(&path, Node::new(NodeKind::Device, kind.name(), None, Device::new(kind)))?;
        }
        vfs.mount(
            "/dev/fd",
            Node::new(NodeKind::Symlink, "fd", None, Symlink::fixed("/proc/self/fd")),
        )?;
        vfs.mount("/proc", procfs::create(&processes))?;
        vfs.mkdir(&root, "/tmp", Permissions::new(0o1777))?;

        if let Some(storage) = &config.storage_path {
            if let Err(e) = std::fs::create_dir_all(storage) {
                warn!(error = %e, path = %storage.display(), "Could not create storage directory");
            }
            vfs.mount("/storage", HostDirectory::mount(storage.clone(), false)?)?;
            info!(storage_path = %storage.display(), "Mounted host storage at /storage");
        }

        processes.create_init(root)?;
        info!(
            max_processes = config.max_processes,
            max_fds = config.max_fds,
            "Kernel booted"
        );

        Ok(Kernel {
            inner: Arc::new(KernelInner {
                config,
                processes,
                vfs,
            }),
        })
    }
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// Boot with the default configuration
    pub fn boot() -> KernelResult<Self> {
        KernelBuilder::new().build()
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    #[inline]
    pub fn processes(&self) -> &ProcessTable {
        &self.inner.processes
    }

    #[inline]
    pub fn vfs(&self) -> &Vfs {
        &self.inner.vfs
    }

    /// Mark `tid` as the thread whose syscall is executing
    #[inline]
    pub fn enter(&self, tid: Pid) {
        self.inner.processes.set_current(tid);
    }

    /// Yield the runtime for one scheduling quantum
    ///
    /// The thread counts as interruptibly sleeping meanwhile; generating a
    /// signal for it clears the marker.
    pub async fn suspend(&self, tid: Pid) {
        self.inner.processes.set_sleeping(tid, true);
        tokio::time::sleep(self.inner.config.scheduler_quantum()).await;
        self.inner.processes.set_sleeping(tid, false);
    }

    /// Suspension-point bookkeeping
    ///
    /// Raises an expired alarm, applies pending default dispositions and
    /// parks while the group is stopped. Fails once the thread has been
    /// terminated.
    pub async fn checkpoint(&self, tid: Pid) -> KernelResult<()> {
        loop {
            let processes = &self.inner.processes;
            processes.poll_alarm(tid);
            match processes.stage(tid)? {
                Stage::Stopped => {
                    self.suspend(tid).await;
                    continue;
                }
                Stage::Running => {}
                _ => return Err(ProcessError::Terminated(tid).into()),
            }
            match processes.apply_default_actions(tid)? {
                Delivery::Terminated(status) => {
                    debug!(tid, ?status, "Terminated at checkpoint");
                    return Err(ProcessError::Terminated(tid).into());
                }
                Delivery::Stopped(_) => continue,
                Delivery::None | Delivery::Handler(_) => return Ok(()),
            }
        }
    }

    /// Poll-and-retry loop of a blocking syscall
    ///
    /// `attempt` returns `Some` once the call can complete. Between attempts
    /// the thread suspends; a deliverable signal ends the wait with
    /// Interrupted.
    pub async fn block_on<T, F>(&self, tid: Pid, syscall: &'static str, mut attempt: F) -> KernelResult<T>
    where
        F: FnMut() -> KernelResult<Option<T>>,
    {
        let mut span = SyscallSpan::new(syscall, tid);
        let result = loop {
            if let Err(e) = self.checkpoint(tid).await {
                break Err(e);
            }
            match attempt() {
                Ok(Some(value)) => break Ok(value),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            if self.inner.processes.has_deliverable(tid) {
                break Err(KernelError::Interrupted);
            }
            span.suspended();
            self.suspend(tid).await;
        };
        span.record_result(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::INIT_PID;

    #[test]
    fn test_boot_layout() {
        let kernel = Kernel::boot().unwrap();
        let root = kernel.vfs().root().clone();
        for path in ["/dev/null", "/dev/zero", "/dev/full", "/proc/1", "/tmp"] {
            assert!(kernel.vfs().resolve(&root, path, true).is_ok(), "{}", path);
        }
        assert_eq!(kernel.vfs().readlink(&root, "/dev/fd").unwrap(), "/proc/self/fd");
        assert_eq!(kernel.processes().leaders(), vec![INIT_PID]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = KernelConfig {
            max_fds: 0,
            ..KernelConfig::default()
        };
        assert!(Kernel::builder().with_config(config).build().is_err());
    }
}
