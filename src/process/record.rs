/*!
 * Process Record
 * One entry of the process table: a thread, or the leader of a thread group
 */

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

use super::types::*;
use crate::core::data_structures::InlineString;
use crate::core::types::Pid;
use crate::fd::SharedFdTable;
use crate::memory::SharedAddressSpace;
use crate::signals::{Signal, SignalActions, SignalSet};
use crate::vfs::NodeRef;

/// Signal dispositions shared by the threads of a group
pub type SharedActions = Arc<Mutex<SignalActions>>;

/// References a record holds into other subsystems
///
/// Dropped at exit, which runs descriptor close side effects.
#[derive(Debug, Default)]
pub struct Resources {
    pub fds: Option<SharedFdTable>,
    pub memory: Option<SharedAddressSpace>,
    pub cwd: Option<NodeRef>,
}

/// Process or thread record
#[derive(Debug)]
pub struct ProcessRecord {
    pub tid: Pid,
    /// Thread-group id (tid of the leader)
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pid,
    pub sid: Pid,
    pub stage: Stage,
    pub exit: Option<ExitStatus>,

    pub pending: SignalSet,
    pub blocked: SignalSet,
    /// Mask to restore after the next handler (sigsuspend)
    pub saved_mask: Option<SignalSet>,
    pub actions: SharedActions,

    pub traced: bool,
    pub stop_signal: Option<Signal>,
    pub stop_reported: bool,
    pub continued_unreported: bool,

    pub times: CpuTimes,
    pub child_times: CpuTimes,

    pub resources: Resources,
    pub name: InlineString,
    pub argv: Vec<String>,
    pub did_exec: bool,
    /// Parent thread blocked in vfork until this child execs or exits
    pub vfork_parent: Option<Pid>,
    /// Pending alarm deadline (kept on the leader)
    pub alarm: Option<Instant>,
    /// Interruptibly waiting at a suspension point
    pub sleeping: bool,
}

impl ProcessRecord {
    /// Thread-group leader record
    pub fn leader(pid: Pid, ppid: Pid, name: impl Into<InlineString>) -> Self {
        Self {
            tid: pid,
            pid,
            ppid,
            pgid: pid,
            sid: pid,
            stage: Stage::Running,
            exit: None,
            pending: SignalSet::empty(),
            blocked: SignalSet::empty(),
            saved_mask: None,
            actions: Arc::new(Mutex::new(SignalActions::default())),
            traced: false,
            stop_signal: None,
            stop_reported: false,
            continued_unreported: false,
            times: CpuTimes::default(),
            child_times: CpuTimes::default(),
            resources: Resources::default(),
            name: name.into(),
            argv: Vec::new(),
            did_exec: false,
            vfork_parent: None,
            alarm: None,
            sleeping: false,
        }
    }

    #[inline]
    pub fn is_leader(&self) -> bool {
        self.tid == self.pid
    }

    /// Not yet terminated
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self.stage, Stage::Running | Stage::Stopped)
    }

    /// Move to `to`, refusing transitions outside the lifecycle table
    pub fn transition(&mut self, to: Stage) -> ProcessResult<()> {
        if !self.stage.can_transition_to(to) {
            return Err(ProcessError::InvalidStateTransition {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        Ok(())
    }

    /// Fold a reaped child's consumption into this record's descendant totals
    pub fn accumulate_child_times(&mut self, zombie: &ProcessRecord) {
        self.child_times += zombie.times + zombie.child_times;
    }

    pub fn info(&self, threads: usize) -> ProcessInfo {
        ProcessInfo {
            tid: self.tid,
            pid: self.pid,
            ppid: self.ppid,
            pgid: self.pgid,
            sid: self.sid,
            stage: self.stage,
            sleeping: self.sleeping,
            traced: self.traced,
            name: self.name.to_string(),
            argv: self.argv.clone(),
            threads,
            exit: self.exit,
            pending: self.pending,
            blocked: self.blocked,
            times: self.times,
            child_times: self.child_times,
            mapped_bytes: self
                .resources
                .memory
                .as_ref()
                .map(|space| space.lock().mapped_bytes())
                .unwrap_or(0),
        }
    }
}
