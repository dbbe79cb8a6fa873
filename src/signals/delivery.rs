/*!
 * Signal Delivery
 * Generation, masking and delivery against the process table
 */

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::types::*;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::{Pid, INIT_PID};
use crate::process::lifecycle::exit_group_locked;
use crate::process::table::{group_of, Reclaimed, Records};
use crate::process::{ExitStatus, ProcessError, ProcessRecord, ProcessResult, ProcessTable, Stage};

/// Addressing of a generated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Exactly the named thread (tkill)
    Thread,
    /// Any thread of the named thread's group
    Group,
}

/// Outcome of one delivery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing deliverable
    None,
    /// The emulator must enter this handler
    Handler(HandlerFrame),
    /// The group stopped
    Stopped(Signal),
    /// The group terminated
    Terminated(ExitStatus),
}

const STOP_SIGNALS: SignalSet = SignalSet::from_bits(
    1 << (Signal::SIGSTOP as u32 - 1)
        | 1 << (Signal::SIGTSTP as u32 - 1)
        | 1 << (Signal::SIGTTIN as u32 - 1)
        | 1 << (Signal::SIGTTOU as u32 - 1),
);

/// Generate `sig` for `target` with the table locked
///
/// Applies generation-time effects, then marks the signal pending on the
/// chosen thread and wakes it. Returns whether the signal was queued.
pub(crate) fn generate(records: &mut Records, target: Pid, sig: Signal, direction: Direction) -> bool {
    let Some(pid) = records.get(&target).map(|r| r.pid) else {
        return false;
    };

    match sig {
        Signal::SIGCONT => resume_group(records, pid, true),
        Signal::SIGKILL => resume_group(records, pid, false),
        s if s.is_stop() => {
            for tid in group_of(records, pid) {
                if let Some(record) = records.get_mut(&tid) {
                    record.pending.remove(Signal::SIGCONT);
                }
            }
        }
        _ => {}
    }

    let chosen = match direction {
        Direction::Thread => records.get(&target).filter(|r| r.is_live()).map(|r| r.tid),
        Direction::Group => {
            let live: Vec<Pid> = group_of(records, pid)
                .into_iter()
                .filter(|tid| records.get(tid).is_some_and(|r| r.is_live()))
                .collect();
            live.iter()
                .copied()
                .find(|tid| records.get(tid).is_some_and(|r| !r.blocked.contains(sig)))
                .or_else(|| live.first().copied())
        }
    };
    let Some(tid) = chosen else {
        trace!(target, %sig, "No live thread to receive signal");
        return false;
    };
    let Some(record) = records.get_mut(&tid) else {
        return false;
    };

    if !record.blocked.contains(sig) && record.actions.lock().is_ignored(sig) {
        trace!(tid, %sig, "Ignored signal discarded");
        return false;
    }
    record.pending.insert(sig);
    record.sleeping = false;
    debug!(tid, %sig, "Signal pending");
    true
}

/// SIGCONT and SIGKILL: everything stopped in the group runs again
fn resume_group(records: &mut Records, pid: Pid, report: bool) {
    let mut resumed = false;
    for tid in group_of(records, pid) {
        let Some(record) = records.get_mut(&tid) else {
            continue;
        };
        if report {
            record.pending = record.pending.difference(STOP_SIGNALS);
        }
        if record.stage == Stage::Stopped && record.transition(Stage::Running).is_ok() {
            resumed = true;
        }
    }
    if !resumed {
        return;
    }

    let Some(leader) = records.get_mut(&pid) else {
        return;
    };
    leader.stop_signal = None;
    leader.stop_reported = false;
    let ppid = leader.ppid;
    if report {
        leader.continued_unreported = true;
        info!(pid, "Process continued");
        notify_parent_of_state_change(records, ppid);
    }
}

/// Stop every running thread of the group `tid` belongs to
fn stop_group(records: &mut Records, tid: Pid, sig: Signal) {
    let Some(pid) = records.get(&tid).map(|r| r.pid) else {
        return;
    };
    for member in group_of(records, pid) {
        if let Some(record) = records.get_mut(&member) {
            if record.stage == Stage::Running && record.transition(Stage::Stopped).is_ok() {
                record.sleeping = false;
            }
        }
    }
    let Some(leader) = records.get_mut(&pid) else {
        return;
    };
    leader.stop_signal = Some(sig);
    leader.stop_reported = false;
    leader.continued_unreported = false;
    let ppid = leader.ppid;
    info!(pid, %sig, "Process stopped");
    notify_parent_of_state_change(records, ppid);
}

/// SIGCHLD for a stop or continue unless the parent asked for SA_NOCLDSTOP
fn notify_parent_of_state_change(records: &mut Records, ppid: Pid) {
    let Some(parent) = records.get(&ppid) else {
        return;
    };
    if parent.actions.lock().get(Signal::SIGCHLD).has_flag(SA_NOCLDSTOP) {
        return;
    }
    generate(records, ppid, Signal::SIGCHLD, Direction::Group);
}

/// Deliver the next deliverable signal of `tid` with the table locked
///
/// With `run_handlers` unset, caught signals stay pending and only default
/// and ignore dispositions are applied.
pub(crate) fn deliver_locked(
    records: &mut Records,
    tid: Pid,
    run_handlers: bool,
    reclaimed: &mut Reclaimed,
) -> ProcessResult<Delivery> {
    loop {
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        if !record.is_live() {
            return Err(ProcessError::Terminated(tid));
        }

        let deliverable = record.pending.difference(record.blocked);
        let candidates = if deliverable.contains(Signal::SIGKILL) {
            SignalSet::of(&[Signal::SIGKILL])
        } else {
            deliverable
        };
        let actions = record.actions.lock().clone();
        let Some(sig) = candidates
            .iter()
            .find(|s| run_handlers || !matches!(actions.get(*s).handler, SigHandler::Catch(_)))
        else {
            return Ok(Delivery::None);
        };
        record.pending.remove(sig);
        let action = actions.get(sig);

        match action.handler {
            SigHandler::Catch(handler) => {
                let restore_mask = record.saved_mask.take().unwrap_or(record.blocked);
                let mut mask = action.mask;
                if !action.has_flag(SA_NODEFER) {
                    mask.insert(sig);
                }
                record.blocked = record.blocked.union(mask).blockable();
                if action.has_flag(SA_RESETHAND) {
                    record.actions.lock().reset(sig);
                }
                debug!(tid, %sig, handler, "Handler frame");
                return Ok(Delivery::Handler(HandlerFrame {
                    signal: sig,
                    handler,
                    flags: action.flags,
                    restore_mask,
                }));
            }
            SigHandler::Ignore => continue,
            SigHandler::Default => match sig.default_action() {
                DefaultAction::Ignore | DefaultAction::Continue => continue,
                DefaultAction::Stop => {
                    stop_group(records, tid, sig);
                    return Ok(Delivery::Stopped(sig));
                }
                DefaultAction::Terminate | DefaultAction::Core => {
                    let status = ExitStatus::killed(sig);
                    exit_group_locked(records, tid, status, reclaimed)?;
                    return Ok(Delivery::Terminated(status));
                }
            },
        }
    }
}

impl ProcessTable {
    /// Process-directed signal to the group of `pid`
    pub fn send_signal(&self, pid: Pid, sig: Signal) -> ProcessResult<bool> {
        let mut records = self.write();
        if !records.contains_key(&pid) {
            return Err(ProcessError::ProcessNotFound(pid));
        }
        Ok(generate(&mut records, pid, sig, Direction::Group))
    }

    /// Thread-directed signal (tkill)
    pub fn send_thread_signal(&self, tid: Pid, sig: Signal) -> ProcessResult<bool> {
        let mut records = self.write();
        if !records.get(&tid).is_some_and(|r| r.is_live()) {
            return Err(ProcessError::ProcessNotFound(tid));
        }
        Ok(generate(&mut records, tid, sig, Direction::Thread))
    }

    /// kill(2) addressing on behalf of `caller_tid`
    ///
    /// Signal 0 only checks that a target exists.
    pub fn kill(&self, caller_tid: Pid, pid: i32, signo: u32) -> KernelResult<()> {
        let sig = match signo {
            0 => None,
            n => Some(Signal::from_number(n)?),
        };
        let mut records = self.write();
        let caller = records
            .get(&caller_tid)
            .ok_or(ProcessError::ProcessNotFound(caller_tid))?;
        let (caller_pid, caller_pgid) = (caller.pid, caller.pgid);

        let targets: Vec<Pid> = match pid {
            p if p > 0 => records
                .get(&(p as Pid))
                .map(|r| vec![r.pid])
                .unwrap_or_default(),
            0 => leaders_where(&records, |r| r.pgid == caller_pgid),
            -1 => leaders_where(&records, |r| r.pid != INIT_PID && r.pid != caller_pid),
            p => {
                let pgid = p.unsigned_abs();
                leaders_where(&records, |r| r.pgid == pgid)
            }
        };
        if targets.is_empty() {
            return Err(ProcessError::ProcessNotFound(pid.unsigned_abs()).into());
        }

        if let Some(sig) = sig {
            for target in &targets {
                generate(&mut records, *target, sig, Direction::Group);
            }
            debug!(caller = caller_tid, pid, %sig, count = targets.len(), "kill");
        }
        Ok(())
    }

    /// Install and/or query a disposition; returns the previous one
    ///
    /// Setting a disposition that ignores the signal discards it from every
    /// thread's pending set.
    pub fn sigaction(&self, tid: Pid, sig: Signal, action: Option<SigAction>) -> KernelResult<SigAction> {
        let mut records = self.write();
        let record = records.get(&tid).ok_or(ProcessError::ProcessNotFound(tid))?;
        let pid = record.pid;
        let shared = record.actions.clone();
        let mut actions = shared.lock();
        let Some(action) = action else {
            return Ok(actions.get(sig));
        };
        let old = actions.set(sig, action)?;
        let now_ignored = actions.is_ignored(sig);
        drop(actions);

        if now_ignored {
            for member in group_of(&records, pid) {
                if let Some(record) = records.get_mut(&member) {
                    record.pending.remove(sig);
                }
            }
        }
        Ok(old)
    }

    /// Change the blocked set; returns the previous one
    pub fn sigprocmask(&self, tid: Pid, how: SigmaskHow, set: Option<SignalSet>) -> ProcessResult<SignalSet> {
        let mut records = self.write();
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        let old = record.blocked;
        if let Some(set) = set {
            record.blocked = match how {
                SigmaskHow::Block => old.union(set),
                SigmaskHow::Unblock => old.difference(set),
                SigmaskHow::SetMask => set,
            }
            .blockable();
        }
        Ok(old)
    }

    /// Pending signals of the thread that are currently blocked
    pub fn sigpending(&self, tid: Pid) -> ProcessResult<SignalSet> {
        self.with_record(tid, |r| {
            SignalSet::from_bits(r.pending.bits() & r.blocked.bits())
        })
    }

    /// Install the temporary sigsuspend mask, remembering the current one
    pub fn sigsuspend_begin(&self, tid: Pid, mask: SignalSet) -> ProcessResult<()> {
        let mut records = self.write();
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        record.saved_mask = Some(record.blocked);
        record.blocked = mask.blockable();
        Ok(())
    }

    /// Handler return: restore the mask carried by the frame
    pub fn sigreturn(&self, tid: Pid, mask: SignalSet) -> ProcessResult<()> {
        let mut records = self.write();
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        record.blocked = mask.blockable();
        Ok(())
    }

    /// Whether a pending unblocked signal would interrupt a blocking call
    ///
    /// Signals that are ignored at this point do not count.
    pub fn has_deliverable(&self, tid: Pid) -> bool {
        let records = self.read();
        let Some(record) = records.get(&tid) else {
            return false;
        };
        let deliverable = record.pending.difference(record.blocked);
        if deliverable.is_empty() {
            return false;
        }
        let actions = record.actions.lock();
        let found = deliverable.iter().any(|sig| match actions.get(sig).handler {
            SigHandler::Catch(_) => true,
            SigHandler::Ignore => false,
            SigHandler::Default => !matches!(
                sig.default_action(),
                DefaultAction::Ignore | DefaultAction::Continue
            ),
        });
        found
    }

    /// Deliver the next deliverable signal, running handlers
    pub fn deliver_pending(&self, tid: Pid) -> KernelResult<Delivery> {
        self.deliver(tid, true)
    }

    /// Apply pending default dispositions (stop, terminate) without
    /// consuming caught signals
    pub fn apply_default_actions(&self, tid: Pid) -> KernelResult<Delivery> {
        self.deliver(tid, false)
    }

    fn deliver(&self, tid: Pid, run_handlers: bool) -> KernelResult<Delivery> {
        let mut reclaimed = Reclaimed::default();
        let mut records = self.write();
        let result = deliver_locked(&mut records, tid, run_handlers, &mut reclaimed);
        drop(records);
        drop(reclaimed);
        result.map_err(KernelError::from)
    }

    /// Arm (or with 0, cancel) the process alarm
    ///
    /// Returns the seconds left on the previous alarm, rounded up.
    pub fn alarm(&self, tid: Pid, secs: u32) -> ProcessResult<u32> {
        let mut records = self.write();
        let pid = records
            .get(&tid)
            .map(|r| r.pid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        let leader = records
            .get_mut(&pid)
            .ok_or(ProcessError::ProcessNotFound(pid))?;
        let now = Instant::now();
        let remaining = leader.alarm.map_or(0, |deadline| {
            let left = deadline.saturating_duration_since(now);
            let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
            u32::try_from(secs.max(1)).unwrap_or(u32::MAX)
        });
        leader.alarm = (secs > 0).then(|| now + Duration::from_secs(u64::from(secs)));
        Ok(remaining)
    }

    /// Raise SIGALRM if the process alarm has expired
    pub fn poll_alarm(&self, tid: Pid) -> bool {
        let mut records = self.write();
        let Some(pid) = records.get(&tid).map(|r| r.pid) else {
            return false;
        };
        let now = Instant::now();
        let expired = match records.get_mut(&pid) {
            Some(leader) if leader.alarm.is_some_and(|deadline| deadline <= now) => {
                leader.alarm = None;
                true
            }
            _ => false,
        };
        if expired {
            debug!(pid, "Alarm expired");
            generate(&mut records, pid, Signal::SIGALRM, Direction::Group);
        }
        expired
    }
}

fn leaders_where(records: &Records, predicate: impl Fn(&ProcessRecord) -> bool) -> Vec<Pid> {
    records
        .values()
        .filter(|r| r.is_leader() && predicate(r))
        .map(|r| r.pid)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{SharingMode, TableLimits};
    use crate::vfs::Vfs;

    fn table() -> (ProcessTable, Pid) {
        let vfs = Vfs::new(40);
        let table = ProcessTable::new(TableLimits::default());
        table.create_init(vfs.root().clone()).unwrap();
        let child = table.create(INIT_PID, SharingMode::Fork).unwrap();
        (table, child)
    }

    #[test]
    fn test_blocked_signal_stays_pending() {
        let (table, child) = table();
        table
            .sigprocmask(child, SigmaskHow::Block, Some(SignalSet::of(&[Signal::SIGUSR1])))
            .unwrap();
        assert!(table.send_signal(child, Signal::SIGUSR1).unwrap());
        assert!(!table.has_deliverable(child));
        assert_eq!(table.deliver_pending(child).unwrap(), Delivery::None);
        assert!(table.sigpending(child).unwrap().contains(Signal::SIGUSR1));
    }

    #[test]
    fn test_ignored_signal_is_discarded() {
        let (table, child) = table();
        assert!(!table.send_signal(child, Signal::SIGCHLD).unwrap());
        assert!(!table.send_signal(child, Signal::SIGURG).unwrap());
    }

    #[test]
    fn test_handler_frame_blocks_signal() {
        let (table, child) = table();
        table
            .sigaction(
                child,
                Signal::SIGUSR2,
                Some(SigAction::new(SigHandler::Catch(0x1000), SignalSet::empty(), 0)),
            )
            .unwrap();
        table.send_signal(child, Signal::SIGUSR2).unwrap();
        let Delivery::Handler(frame) = table.deliver_pending(child).unwrap() else {
            panic!("expected handler frame");
        };
        assert_eq!(frame.handler, 0x1000);
        assert!(frame.restore_mask.is_empty());
        let blocked = table.sigprocmask(child, SigmaskHow::Block, None).unwrap();
        assert!(blocked.contains(Signal::SIGUSR2));
    }

    #[test]
    fn test_stop_and_continue() {
        let (table, child) = table();
        table.send_signal(child, Signal::SIGTSTP).unwrap();
        assert_eq!(
            table.apply_default_actions(child).unwrap(),
            Delivery::Stopped(Signal::SIGTSTP)
        );
        assert_eq!(table.stage(child).unwrap(), Stage::Stopped);

        table.send_signal(child, Signal::SIGCONT).unwrap();
        assert_eq!(table.stage(child).unwrap(), Stage::Running);
        assert!(table.with_record(child, |r| r.continued_unreported).unwrap());
    }

    #[test]
    fn test_kill_terminates() {
        let (table, child) = table();
        table.kill(INIT_PID, child as i32, 9).unwrap();
        assert_eq!(
            table.apply_default_actions(child).unwrap(),
            Delivery::Terminated(ExitStatus::killed(Signal::SIGKILL))
        );
        assert_eq!(table.stage(child).unwrap(), Stage::Zombie);
    }

    #[test]
    fn test_kill_addressing() {
        let (table, _child) = table();
        assert!(table.kill(INIT_PID, 4242, 0).is_err());
        assert!(table.kill(INIT_PID, -4242, 15).is_err());
        assert!(table.kill(INIT_PID, 1, 0).is_ok());
        assert!(table.kill(INIT_PID, 1, 99).is_err());
    }
}
