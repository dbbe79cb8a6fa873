/*!
 * Process Lifecycle
 * Creation, exit, exec commit, job-control identity and time accounting
 */

use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::record::{ProcessRecord, Resources};
use super::table::{group_of, ProcessTable, Reclaimed, Records};
use super::types::*;
use crate::core::data_structures::InlineString;
use crate::core::limits::{COMM_LEN, MAX_MEMORY_MAPPINGS};
use crate::core::types::{Pid, INIT_PID};
use crate::fd::FdTable;
use crate::memory::AddressSpace;
use crate::signals::delivery::{generate, Direction};
use crate::signals::{SigHandler, Signal, SignalSet, SA_NOCLDWAIT};
use crate::vfs::NodeRef;

impl ProcessTable {
    /// Create the process that adopts orphans (pid 1)
    pub fn create_init(&self, cwd: NodeRef) -> ProcessResult<Pid> {
        let mut records = self.write();
        if records.contains_key(&INIT_PID) {
            return Err(ProcessError::InvalidArgument("init already exists".into()));
        }
        let mut init = ProcessRecord::leader(INIT_PID, 0, "init");
        init.argv = vec!["init".to_string()];
        init.resources = Resources {
            fds: Some(FdTable::shared(self.limits().max_fds)),
            memory: Some(AddressSpace::shared(MAX_MEMORY_MAPPINGS)),
            cwd: Some(cwd),
        };
        records.insert(INIT_PID, init);
        info!(pid = INIT_PID, "Init process created");
        Ok(INIT_PID)
    }

    /// Create a record from `parent_tid` under `mode`
    ///
    /// The new record starts with an empty pending set and the creator's
    /// blocked set.
    pub fn create(&self, parent_tid: Pid, mode: SharingMode) -> ProcessResult<Pid> {
        let mut records = self.write();
        let limit = self.limits().max_processes;
        if records.len() >= limit {
            return Err(ProcessError::ProcessLimitExceeded {
                current: records.len(),
                limit,
            });
        }
        let tid = self.allocate_pid(&records)?;
        let parent = records
            .get(&parent_tid)
            .filter(|r| r.is_live())
            .ok_or(ProcessError::ProcessNotFound(parent_tid))?;

        let mut child = ProcessRecord::leader(tid, parent.pid, parent.name.clone());
        child.pgid = parent.pgid;
        child.sid = parent.sid;
        child.blocked = parent.blocked;
        child.argv = parent.argv.clone();
        child.resources.cwd = parent.resources.cwd.clone();

        match mode {
            SharingMode::Fork | SharingMode::Vfork => {
                child.actions = Arc::new(Mutex::new(parent.actions.lock().clone()));
                child.resources.fds = parent
                    .resources
                    .fds
                    .as_ref()
                    .map(|table| Arc::new(Mutex::new(table.lock().clone())));
                child.resources.memory = if mode == SharingMode::Vfork {
                    child.vfork_parent = Some(parent_tid);
                    parent.resources.memory.clone()
                } else {
                    parent
                        .resources
                        .memory
                        .as_ref()
                        .map(|space| Arc::new(Mutex::new(space.lock().fork_copy())))
                };
            }
            SharingMode::Thread => {
                child.pid = parent.pid;
                child.ppid = parent.ppid;
                child.actions = Arc::clone(&parent.actions);
                child.resources.fds = parent.resources.fds.clone();
                child.resources.memory = parent.resources.memory.clone();
                child.did_exec = parent.did_exec;
            }
        }

        records.insert(tid, child);
        info!(parent = parent_tid, child = tid, ?mode, "Process created");
        Ok(tid)
    }

    /// Apply one lifecycle transition; `Released` removes the record
    pub fn set_lifecycle(&self, tid: Pid, stage: Stage) -> ProcessResult<()> {
        let mut records = self.write();
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        record.transition(stage)?;
        let released = (stage == Stage::Released).then(|| records.remove(&tid));
        drop(records);
        drop(released);
        debug!(tid, ?stage, "Lifecycle transition");
        Ok(())
    }

    /// Terminate every thread of the group `tid` belongs to
    pub fn exit_group(&self, tid: Pid, status: ExitStatus) -> ProcessResult<()> {
        let mut reclaimed = Reclaimed::default();
        let mut records = self.write();
        let result = exit_group_locked(&mut records, tid, status, &mut reclaimed);
        drop(records);
        drop(reclaimed);
        result
    }

    /// Terminate one thread; the last live thread takes the group down
    pub fn exit_thread(&self, tid: Pid, status: ExitStatus) -> ProcessResult<()> {
        let mut reclaimed = Reclaimed::default();
        let mut records = self.write();
        let result = exit_thread_locked(&mut records, tid, status, &mut reclaimed);
        drop(records);
        drop(reclaimed);
        result
    }

    /// Point of no return of execve
    ///
    /// Releases the other threads, unshares and sweeps the descriptor table,
    /// resets caught signals, replaces the address space and releases a vfork
    /// parent. Returns the caller's tid afterwards, which is the group id.
    pub fn commit_exec(&self, tid: Pid, name: &str, argv: Vec<String>) -> ProcessResult<Pid> {
        let mut reclaimed = Reclaimed::default();
        let mut records = self.write();
        let pid = records
            .get(&tid)
            .filter(|r| r.is_live())
            .map(|r| r.pid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;

        let mut released_times = CpuTimes::default();
        for other in group_of(&records, pid) {
            if other != tid {
                if let Some(record) = records.remove(&other) {
                    released_times += record.times;
                    reclaimed.records.push(record);
                }
            }
        }

        if tid != pid {
            // A non-leader exec takes over the leader's identity
            let mut record = records
                .remove(&tid)
                .ok_or(ProcessError::ProcessNotFound(tid))?;
            if let Some(old_leader) = reclaimed.records.iter().find(|r| r.tid == pid) {
                record.child_times = old_leader.child_times;
                record.alarm = old_leader.alarm;
                record.traced = old_leader.traced;
                record.vfork_parent = old_leader.vfork_parent;
            }
            record.tid = pid;
            records.insert(pid, record);
        }

        let record = records
            .get_mut(&pid)
            .ok_or(ProcessError::ProcessNotFound(pid))?;
        record.times += released_times;

        let old_fds = record.resources.fds.take();
        if let Some(shared) = &old_fds {
            let mut table = shared.lock().clone();
            reclaimed.handles.extend(table.close_on_exec_sweep());
            record.resources.fds = Some(Arc::new(Mutex::new(table)));
        }
        let mut actions = record.actions.lock().clone();
        actions.reset_caught();
        record.actions = Arc::new(Mutex::new(actions));
        let old_memory = record
            .resources
            .memory
            .replace(AddressSpace::shared(MAX_MEMORY_MAPPINGS));
        reclaimed.resources.push(Resources {
            fds: old_fds,
            memory: old_memory,
            cwd: None,
        });

        record.name = InlineString::truncated(name, COMM_LEN);
        record.argv = argv;
        record.did_exec = true;
        record.saved_mask = None;
        if let Some(parent) = record.vfork_parent.take() {
            debug!(pid, parent, "Vfork parent released by exec");
        }

        drop(records);
        drop(reclaimed);
        info!(pid, name, "Exec committed");
        Ok(pid)
    }

    /// Whether `child` still holds its vfork parent
    pub fn vfork_pending(&self, child: Pid) -> bool {
        self.read()
            .get(&child)
            .is_some_and(|r| r.is_live() && r.vfork_parent.is_some())
    }

    pub fn getpgid(&self, caller: Pid, pid: Pid) -> ProcessResult<Pid> {
        let target = if pid == 0 { caller } else { pid };
        self.with_record(target, |r| r.pgid)
    }

    pub fn getsid(&self, caller: Pid, pid: Pid) -> ProcessResult<Pid> {
        let target = if pid == 0 { caller } else { pid };
        self.with_record(target, |r| r.sid)
    }

    /// Move a process into a process group
    ///
    /// The target is the caller or one of its children. Session leaders and
    /// children that have exec'd cannot be moved; the group must exist in the
    /// caller's session unless it is the target's own pid.
    pub fn setpgid(&self, caller_tid: Pid, pid: Pid, pgid: Pid) -> ProcessResult<()> {
        let mut records = self.write();
        let caller = records
            .get(&caller_tid)
            .ok_or(ProcessError::ProcessNotFound(caller_tid))?;
        let (caller_pid, caller_sid) = (caller.pid, caller.sid);
        let target_pid = if pid == 0 { caller_pid } else { pid };
        let pgid = if pgid == 0 { target_pid } else { pgid };

        let target = records
            .get(&target_pid)
            .filter(|r| r.is_leader())
            .ok_or(ProcessError::ProcessNotFound(target_pid))?;
        if target_pid != caller_pid {
            if target.ppid != caller_pid {
                return Err(ProcessError::ProcessNotFound(target_pid));
            }
            if target.sid != caller_sid {
                return Err(ProcessError::NotPermitted(format!(
                    "{} is in another session",
                    target_pid
                )));
            }
            if target.did_exec {
                return Err(ProcessError::PermissionDenied(format!(
                    "{} has already exec'd",
                    target_pid
                )));
            }
        }
        if target.sid == target_pid {
            return Err(ProcessError::NotPermitted(format!(
                "{} is a session leader",
                target_pid
            )));
        }
        if pgid != target_pid
            && !records
                .values()
                .any(|r| r.pgid == pgid && r.sid == caller_sid && r.is_live())
        {
            return Err(ProcessError::NotPermitted(format!(
                "no process group {} in session {}",
                pgid, caller_sid
            )));
        }

        for record in records.values_mut().filter(|r| r.pid == target_pid) {
            record.pgid = pgid;
        }
        debug!(pid = target_pid, pgid, "Process group changed");
        Ok(())
    }

    /// Start a new session led by the caller
    pub fn setsid(&self, caller_tid: Pid) -> ProcessResult<Pid> {
        let mut records = self.write();
        let pid = records
            .get(&caller_tid)
            .map(|r| r.pid)
            .ok_or(ProcessError::ProcessNotFound(caller_tid))?;
        if records.values().any(|r| r.pgid == pid) {
            return Err(ProcessError::NotPermitted(format!(
                "{} already leads a process group",
                pid
            )));
        }
        for record in records.values_mut().filter(|r| r.pid == pid) {
            record.sid = pid;
            record.pgid = pid;
        }
        info!(pid, "New session");
        Ok(pid)
    }

    /// Charge CPU time reported by the emulator to a thread
    pub fn charge_time(&self, tid: Pid, user: Duration, system: Duration) -> ProcessResult<()> {
        let mut records = self.write();
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        record.times += CpuTimes::new(user, system);
        Ok(())
    }

    /// Own (all threads) and reaped-descendant times of the caller's process
    pub fn times(&self, tid: Pid) -> ProcessResult<Times> {
        let records = self.read();
        let pid = records
            .get(&tid)
            .map(|r| r.pid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        let own = records
            .values()
            .filter(|r| r.pid == pid)
            .fold(CpuTimes::default(), |acc, r| acc + r.times);
        let children = records
            .get(&pid)
            .map(|leader| leader.child_times)
            .unwrap_or_default();
        Ok(Times { own, children })
    }

    /// Mark a process as traced; its stops are reported without WUNTRACED
    pub fn set_traced(&self, pid: Pid, traced: bool) -> ProcessResult<()> {
        let mut records = self.write();
        let record = records
            .get_mut(&pid)
            .ok_or(ProcessError::ProcessNotFound(pid))?;
        record.traced = traced;
        Ok(())
    }
}

/// Group exit with the table locked
pub(crate) fn exit_group_locked(
    records: &mut Records,
    tid: Pid,
    status: ExitStatus,
    reclaimed: &mut Reclaimed,
) -> ProcessResult<()> {
    let pid = records
        .get(&tid)
        .map(|r| r.pid)
        .ok_or(ProcessError::ProcessNotFound(tid))?;

    let mut released_times = CpuTimes::default();
    for other in group_of(records, pid) {
        if other != pid {
            if let Some(record) = records.remove(&other) {
                released_times += record.times;
                reclaimed.records.push(record);
            }
        }
    }

    let leader = records
        .get_mut(&pid)
        .ok_or(ProcessError::ProcessNotFound(pid))?;
    leader.times += released_times;
    if leader.stage == Stage::Stopped {
        leader.transition(Stage::Running)?;
    }
    if leader.stage != Stage::Zombie {
        leader.transition(Stage::Zombie)?;
    }
    leader.exit = Some(status);
    leader.pending = SignalSet::empty();
    leader.saved_mask = None;
    leader.alarm = None;
    leader.sleeping = false;
    leader.stop_signal = None;
    leader.continued_unreported = false;
    reclaimed.resources.push(mem::take(&mut leader.resources));
    let ppid = leader.ppid;
    leader.vfork_parent = None;

    if pid != INIT_PID {
        reparent_children(records, pid);
    }
    info!(pid, ?status, "Process exited");
    notify_parent_of_exit(records, pid, ppid, reclaimed);
    Ok(())
}

/// Single-thread exit with the table locked
pub(crate) fn exit_thread_locked(
    records: &mut Records,
    tid: Pid,
    status: ExitStatus,
    reclaimed: &mut Reclaimed,
) -> ProcessResult<()> {
    let pid = records
        .get(&tid)
        .map(|r| r.pid)
        .ok_or(ProcessError::ProcessNotFound(tid))?;
    let others_live = records
        .values()
        .any(|r| r.pid == pid && r.tid != tid && r.is_live());
    if !others_live {
        // A leader that left earlier keeps its own status
        let status = records
            .get(&pid)
            .filter(|leader| tid != pid && leader.stage == Stage::Zombie)
            .and_then(|leader| leader.exit)
            .unwrap_or(status);
        return exit_group_locked(records, tid, status, reclaimed);
    }

    let record = records
        .get_mut(&tid)
        .ok_or(ProcessError::ProcessNotFound(tid))?;
    if record.stage == Stage::Stopped {
        record.transition(Stage::Running)?;
    }
    record.transition(Stage::Zombie)?;
    record.exit = Some(status);
    record.pending = SignalSet::empty();
    record.sleeping = false;
    reclaimed.resources.push(mem::take(&mut record.resources));
    debug!(tid, pid, ?status, "Thread exited");
    Ok(())
}

fn reparent_children(records: &mut Records, pid: Pid) {
    let mut adopted_zombie = false;
    for record in records
        .values_mut()
        .filter(|r| r.ppid == pid && r.pid != pid)
    {
        record.ppid = INIT_PID;
        adopted_zombie |= record.is_leader() && record.stage == Stage::Zombie;
    }
    if adopted_zombie {
        generate(records, INIT_PID, Signal::SIGCHLD, Direction::Group);
    }
}

/// SIGCHLD to the parent, or immediate release when it ignores SIGCHLD
fn notify_parent_of_exit(records: &mut Records, pid: Pid, ppid: Pid, reclaimed: &mut Reclaimed) {
    let Some(parent) = records.get(&ppid) else {
        return;
    };
    let action = parent.actions.lock().get(Signal::SIGCHLD);
    if action.handler == SigHandler::Ignore || action.has_flag(SA_NOCLDWAIT) {
        if let Some(zombie) = records.remove(&pid) {
            debug!(pid, parent = ppid, "Auto-reaped");
            reclaimed.records.push(zombie);
        }
        return;
    }
    generate(records, ppid, Signal::SIGCHLD, Direction::Group);
}
