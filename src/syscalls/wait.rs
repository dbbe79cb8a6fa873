/*!
 * Wait Syscalls
 * waitpid over the single-scan wait state machine
 */

use tracing::{debug, instrument};

use crate::core::errors::KernelResult;
use crate::core::types::Pid;
use crate::kernel::Kernel;
use crate::process::{WaitOptions, WaitStatus, WaitTarget};

impl Kernel {
    /// Wait for a child to change state
    ///
    /// `target` follows waitpid(2): -1 any child, 0 the caller's process
    /// group, a positive pid, or a negated process group. With WNOHANG the
    /// call returns `None` while matching children exist but none is ready;
    /// otherwise it suspends until one is, or until a deliverable signal
    /// interrupts it.
    #[instrument(skip(self))]
    pub async fn waitpid(&self, tid: Pid, target: i32, options: u32) -> KernelResult<Option<(Pid, WaitStatus)>> {
        self.enter(tid);
        let options = WaitOptions::from_bits(options)?;
        let target = WaitTarget::from_raw(target);

        if options.nohang() {
            self.checkpoint(tid).await?;
            return Ok(self.processes().try_wait(tid, target, options)?);
        }

        let (pid, status) = self
            .block_on(tid, "waitpid", || Ok(self.processes().try_wait(tid, target, options)?))
            .await?;
        debug!(tid, pid, ?status, "Wait completed");
        Ok(Some((pid, status)))
    }
}
