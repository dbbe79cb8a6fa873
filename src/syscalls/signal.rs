/*!
 * Signal Syscalls
 * Generation, masks, dispositions and the blocking waits that end on a
 * signal
 */

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::core::errors::KernelResult;
use crate::core::types::Pid;
use crate::kernel::Kernel;
use crate::process::ProcessError;
use crate::signals::{Delivery, SigAction, SigmaskHow, Signal, SignalSet};

impl Kernel {
    #[instrument(skip(self))]
    pub fn kill(&self, tid: Pid, pid: i32, signo: u32) -> KernelResult<()> {
        self.enter(tid);
        self.processes().kill(tid, pid, signo)
    }

    /// Thread-directed signal; signal 0 only checks that `target` exists
    #[instrument(skip(self))]
    pub fn tkill(&self, tid: Pid, target: Pid, signo: u32) -> KernelResult<()> {
        self.enter(tid);
        if signo == 0 {
            return match self.processes().stage(target) {
                Ok(_) => Ok(()),
                Err(_) => Err(ProcessError::ProcessNotFound(target).into()),
            };
        }
        let sig = Signal::from_number(signo)?;
        self.processes().send_thread_signal(target, sig)?;
        Ok(())
    }

    /// Install (with `Some`) and/or query the disposition of `signo`
    pub fn sigaction(&self, tid: Pid, signo: u32, action: Option<SigAction>) -> KernelResult<SigAction> {
        let sig = Signal::from_number(signo)?;
        self.processes().sigaction(tid, sig, action)
    }

    /// Change the caller's blocked set; returns the previous one
    ///
    /// `how` is only looked at when a set is given.
    pub fn sigprocmask(&self, tid: Pid, how: u32, set: Option<SignalSet>) -> KernelResult<SignalSet> {
        let how = match set {
            Some(_) => SigmaskHow::from_raw(how)?,
            None => SigmaskHow::Block,
        };
        Ok(self.processes().sigprocmask(tid, how, set)?)
    }

    pub fn sigpending(&self, tid: Pid) -> KernelResult<SignalSet> {
        Ok(self.processes().sigpending(tid)?)
    }

    /// Wait for a signal with `mask` temporarily installed
    ///
    /// Always ends with Interrupted. The previous mask comes back once the
    /// next signal is delivered (see `deliver_signals`).
    #[instrument(skip(self))]
    pub async fn sigsuspend(&self, tid: Pid, mask: SignalSet) -> KernelResult<()> {
        self.enter(tid);
        self.processes().sigsuspend_begin(tid, mask)?;
        self.block_on(tid, "sigsuspend", || Ok(None::<()>)).await
    }

    /// Return from a handler, restoring the frame's mask
    pub fn sigreturn(&self, tid: Pid, mask: SignalSet) -> KernelResult<()> {
        Ok(self.processes().sigreturn(tid, mask)?)
    }

    /// Deliver the next pending unblocked signal
    ///
    /// The emulator calls this after every syscall return and acts on the
    /// result: push a handler frame, stop running, or tear the thread down.
    pub fn deliver_signals(&self, tid: Pid) -> KernelResult<Delivery> {
        let delivery = self.processes().deliver_pending(tid)?;
        if !matches!(delivery, Delivery::None) {
            debug!(tid, ?delivery, "Signal delivered");
        }
        Ok(delivery)
    }

    pub fn alarm(&self, tid: Pid, secs: u32) -> KernelResult<u32> {
        Ok(self.processes().alarm(tid, secs)?)
    }

    /// Suspend until a signal arrives; always ends with Interrupted
    #[instrument(skip(self))]
    pub async fn pause(&self, tid: Pid) -> KernelResult<()> {
        self.enter(tid);
        self.block_on(tid, "pause", || Ok(None::<()>)).await
    }

    #[instrument(skip(self))]
    pub async fn nanosleep(&self, tid: Pid, duration: Duration) -> KernelResult<()> {
        self.enter(tid);
        let deadline = Instant::now() + duration;
        self.block_on(tid, "nanosleep", || Ok((Instant::now() >= deadline).then_some(())))
            .await
    }

    /// Give up the rest of the quantum
    pub async fn sched_yield(&self, tid: Pid) -> KernelResult<()> {
        self.checkpoint(tid).await?;
        self.suspend(tid).await;
        Ok(())
    }
}
