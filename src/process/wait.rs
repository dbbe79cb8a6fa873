/*!
 * Wait / Reap
 * Status encoding, wait options and the single-pass child scan
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

use super::record::ProcessRecord;
use super::table::ProcessTable;
use super::types::*;
use crate::core::types::Pid;
use crate::signals::Signal;

pub const WNOHANG: u32 = 0x0000_0001;
pub const WUNTRACED: u32 = 0x0000_0002;
pub const WCONTINUED: u32 = 0x0000_0008;
/// Thread-id form: a positive target names a thread rather than a process
pub const WTHREAD: u32 = 0x4000_0000;

/// Validated waitpid options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitOptions(u32);

impl WaitOptions {
    const KNOWN: u32 = WNOHANG | WUNTRACED | WCONTINUED | WTHREAD;

    pub fn from_bits(bits: u32) -> ProcessResult<Self> {
        if bits & !Self::KNOWN != 0 {
            return Err(ProcessError::InvalidArgument(format!(
                "unknown wait options 0x{:x}",
                bits & !Self::KNOWN
            )));
        }
        Ok(Self(bits))
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn nohang(&self) -> bool {
        self.0 & WNOHANG != 0
    }

    #[inline]
    pub fn untraced(&self) -> bool {
        self.0 & WUNTRACED != 0
    }

    #[inline]
    pub fn continued(&self) -> bool {
        self.0 & WCONTINUED != 0
    }

    #[inline]
    pub fn thread(&self) -> bool {
        self.0 & WTHREAD != 0
    }
}

/// Linux wait status word
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitStatus(i32);

impl WaitStatus {
    #[inline]
    pub fn exited(code: i32) -> Self {
        Self((code & 0xff) << 8)
    }

    #[inline]
    pub fn signaled(signal: Signal, core: bool) -> Self {
        Self(signal.number() as i32 | if core { 0x80 } else { 0 })
    }

    #[inline]
    pub fn stopped(signal: Signal) -> Self {
        Self(0x7f | (signal.number() as i32) << 8)
    }

    #[inline]
    pub fn continued() -> Self {
        Self(0xffff)
    }

    pub fn from_exit(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Exited { code } => Self::exited(code),
            ExitStatus::Signaled { signal, core } => Self::signaled(signal, core),
        }
    }

    #[inline]
    pub fn raw(&self) -> i32 {
        self.0
    }

    pub fn if_exited(&self) -> bool {
        self.0 & 0x7f == 0
    }

    pub fn exit_status(&self) -> i32 {
        (self.0 >> 8) & 0xff
    }

    pub fn if_signaled(&self) -> bool {
        let low = self.0 & 0x7f;
        low != 0 && low != 0x7f
    }

    pub fn term_sig(&self) -> i32 {
        self.0 & 0x7f
    }

    pub fn core_dumped(&self) -> bool {
        self.if_signaled() && self.0 & 0x80 != 0
    }

    pub fn if_stopped(&self) -> bool {
        self.0 & 0xff == 0x7f
    }

    pub fn stop_sig(&self) -> i32 {
        (self.0 >> 8) & 0xff
    }

    pub fn if_continued(&self) -> bool {
        self.0 == 0xffff
    }
}

impl fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.if_continued() {
            write!(f, "WaitStatus(continued)")
        } else if self.if_stopped() {
            write!(f, "WaitStatus(stopped {})", self.stop_sig())
        } else if self.if_exited() {
            write!(f, "WaitStatus(exited {})", self.exit_status())
        } else {
            write!(f, "WaitStatus(signaled {}, core {})", self.term_sig(), self.core_dumped())
        }
    }
}

/// Which children a wait request matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// -1
    AnyChild,
    /// 0: children in the caller's process group
    SameGroup,
    /// Positive pid
    Pid(Pid),
    /// Negative: children in process group `-target`
    Group(Pid),
}

impl WaitTarget {
    pub fn from_raw(target: i32) -> Self {
        match target {
            -1 => WaitTarget::AnyChild,
            0 => WaitTarget::SameGroup,
            t if t > 0 => WaitTarget::Pid(t as Pid),
            t => WaitTarget::Group(t.unsigned_abs()),
        }
    }
}

enum Report {
    Reap(ExitStatus),
    Stopped(Signal),
    Continued,
}

impl ProcessTable {
    /// One non-blocking wait attempt on behalf of `caller_tid`
    ///
    /// Scans the table once, recording both whether any child matches and
    /// whether one is ready. Returns `Ok(None)` when children match but none
    /// is ready and `NoChild` when nothing matches. A zombie that is reported
    /// is released and its times folded into the caller.
    pub fn try_wait(
        &self,
        caller_tid: Pid,
        target: WaitTarget,
        options: WaitOptions,
    ) -> ProcessResult<Option<(Pid, WaitStatus)>> {
        let mut records = self.write();
        let caller = records
            .get(&caller_tid)
            .ok_or(ProcessError::ProcessNotFound(caller_tid))?;
        let (caller_pid, caller_pgid) = (caller.pid, caller.pgid);

        // Groups whose leader may be a zombie while other threads still run
        let busy: BTreeSet<Pid> = records
            .values()
            .filter(|r| !r.is_leader() && r.is_live())
            .map(|r| r.pid)
            .collect();

        let thread_form = options.thread() && matches!(target, WaitTarget::Pid(_));
        let matches = |r: &ProcessRecord| -> bool {
            if thread_form {
                let WaitTarget::Pid(tid) = target else {
                    return false;
                };
                return r.tid == tid
                    && r.tid != caller_tid
                    && (r.ppid == caller_pid || r.pid == caller_pid);
            }
            if !r.is_leader() || r.ppid != caller_pid {
                return false;
            }
            match target {
                WaitTarget::AnyChild => true,
                WaitTarget::SameGroup => r.pgid == caller_pgid,
                WaitTarget::Pid(pid) => r.pid == pid,
                WaitTarget::Group(pgid) => r.pgid == pgid,
            }
        };

        let mut any_match = false;
        let mut ready = None;
        for record in records.values() {
            if !matches(record) {
                continue;
            }
            any_match = true;
            if let Some(report) = readiness(record, options, &busy) {
                ready = Some((record.tid, report));
                break;
            }
        }

        let Some((tid, report)) = ready else {
            return if any_match {
                Ok(None)
            } else {
                Err(ProcessError::NoChild)
            };
        };

        match report {
            Report::Stopped(signal) => {
                if let Some(record) = records.get_mut(&tid) {
                    record.stop_reported = true;
                }
                Ok(Some((tid, WaitStatus::stopped(signal))))
            }
            Report::Continued => {
                if let Some(record) = records.get_mut(&tid) {
                    record.continued_unreported = false;
                }
                Ok(Some((tid, WaitStatus::continued())))
            }
            Report::Reap(status) => {
                let mut zombie = records
                    .remove(&tid)
                    .ok_or(ProcessError::ProcessNotFound(tid))?;
                zombie.transition(Stage::Released)?;
                if zombie.is_leader() {
                    if let Some(reaper) = records.get_mut(&caller_pid) {
                        reaper.accumulate_child_times(&zombie);
                    }
                } else if let Some(leader) = records.get_mut(&zombie.pid) {
                    // A reaped thread's usage stays with its group
                    leader.times += zombie.times;
                }
                drop(records);
                info!(pid = tid, reaper = caller_pid, ?status, "Reaped");
                drop(zombie);
                Ok(Some((tid, WaitStatus::from_exit(status))))
            }
        }
    }
}

fn readiness(record: &ProcessRecord, options: WaitOptions, busy: &BTreeSet<Pid>) -> Option<Report> {
    match record.stage {
        Stage::Zombie => {
            if record.is_leader() && busy.contains(&record.pid) {
                return None;
            }
            Some(Report::Reap(record.exit.unwrap_or(ExitStatus::exited(0))))
        }
        Stage::Stopped if !record.stop_reported && (record.traced || options.untraced()) => {
            Some(Report::Stopped(record.stop_signal.unwrap_or(Signal::SIGSTOP)))
        }
        _ if record.continued_unreported && options.continued() => Some(Report::Continued),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_encoding() {
        let exited = WaitStatus::exited(3);
        assert!(exited.if_exited());
        assert_eq!(exited.exit_status(), 3);
        assert!(!exited.if_signaled());

        let killed = WaitStatus::signaled(Signal::SIGSEGV, true);
        assert!(killed.if_signaled());
        assert_eq!(killed.term_sig(), 11);
        assert!(killed.core_dumped());

        let stopped = WaitStatus::stopped(Signal::SIGTSTP);
        assert!(stopped.if_stopped());
        assert_eq!(stopped.stop_sig(), 20);
        assert_eq!(stopped.raw(), 0x147f);

        let continued = WaitStatus::continued();
        assert!(continued.if_continued());
        assert!(!continued.if_exited() && !continued.if_signaled() && !continued.if_stopped());
    }

    #[test]
    fn test_options_and_targets() {
        assert!(WaitOptions::from_bits(WNOHANG | WUNTRACED).is_ok());
        assert!(WaitOptions::from_bits(0x100).is_err());
        assert_eq!(WaitTarget::from_raw(-1), WaitTarget::AnyChild);
        assert_eq!(WaitTarget::from_raw(0), WaitTarget::SameGroup);
        assert_eq!(WaitTarget::from_raw(12), WaitTarget::Pid(12));
        assert_eq!(WaitTarget::from_raw(-12), WaitTarget::Group(12));
    }
}
