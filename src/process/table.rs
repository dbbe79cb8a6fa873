/*!
 * Process Table
 * Authoritative set of process and thread records
 */

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use super::record::{ProcessRecord, Resources, SharedActions};
use super::types::*;
use crate::core::config::KernelConfig;
use crate::core::limits::FIRST_USER_PID;
use crate::core::types::{Pid, INIT_PID};
use crate::fd::{HandleRef, SharedFdTable};
use crate::memory::SharedAddressSpace;
use crate::vfs::NodeRef;

pub(crate) type Records = BTreeMap<Pid, ProcessRecord>;

/// Table capacity settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_processes: usize,
    pub max_pid: Pid,
    pub max_fds: u32,
}

impl From<&KernelConfig> for TableLimits {
    fn from(config: &KernelConfig) -> Self {
        Self {
            max_processes: config.max_processes,
            max_pid: config.max_pid,
            max_fds: u32::try_from(config.max_fds).unwrap_or(u32::MAX),
        }
    }
}

impl Default for TableLimits {
    fn default() -> Self {
        Self::from(&KernelConfig::default())
    }
}

/// Everything a table operation detached from live records
///
/// Dropped only after the table lock is released, so descriptor close side
/// effects and node teardown hooks never run under it.
#[derive(Default)]
pub(crate) struct Reclaimed {
    pub records: Vec<ProcessRecord>,
    pub resources: Vec<Resources>,
    pub handles: Vec<HandleRef>,
}

struct TableInner {
    records: RwLock<Records>,
    next_pid: Mutex<Pid>,
    /// Thread whose syscall is executing, for /proc/self
    current: AtomicU32,
    limits: TableLimits,
}

/// Process table handle
///
/// Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct ProcessTable {
    inner: Arc<TableInner>,
}

/// Non-owning handle held by procfs
#[derive(Clone)]
pub struct WeakProcessTable {
    inner: Weak<TableInner>,
}

impl WeakProcessTable {
    pub fn upgrade(&self) -> Option<ProcessTable> {
        self.inner.upgrade().map(|inner| ProcessTable { inner })
    }
}

impl ProcessTable {
    pub fn new(limits: TableLimits) -> Self {
        Self {
            inner: Arc::new(TableInner {
                records: RwLock::new(BTreeMap::new()),
                next_pid: Mutex::new(FIRST_USER_PID),
                current: AtomicU32::new(INIT_PID),
                limits,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakProcessTable {
        WeakProcessTable {
            inner: Arc::downgrade(&self.inner),
        }
    }

    #[inline]
    pub fn limits(&self) -> TableLimits {
        self.inner.limits
    }

    #[inline]
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.inner.records.read()
    }

    #[inline]
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.inner.records.write()
    }

    /// Record the thread whose syscall is running
    #[inline]
    pub fn set_current(&self, tid: Pid) {
        self.inner.current.store(tid, Ordering::Release);
    }

    #[inline]
    pub fn current(&self) -> Pid {
        self.inner.current.load(Ordering::Acquire)
    }

    /// Number of records, zombies included
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, tid: Pid) -> bool {
        self.read().contains_key(&tid)
    }

    /// First record (in tid order) matching `predicate`
    pub fn for_each<F>(&self, mut predicate: F) -> Option<Pid>
    where
        F: FnMut(&ProcessRecord) -> bool,
    {
        self.read()
            .values()
            .find(|record| predicate(record))
            .map(|record| record.tid)
    }

    /// Run `f` against the record of `tid`
    pub fn with_record<R>(&self, tid: Pid, f: impl FnOnce(&ProcessRecord) -> R) -> ProcessResult<R> {
        self.read()
            .get(&tid)
            .map(f)
            .ok_or(ProcessError::ProcessNotFound(tid))
    }

    pub fn info(&self, tid: Pid) -> ProcessResult<ProcessInfo> {
        let records = self.read();
        let record = records.get(&tid).ok_or(ProcessError::ProcessNotFound(tid))?;
        Ok(record.info(live_threads(&records, record.pid)))
    }

    pub fn stage(&self, tid: Pid) -> ProcessResult<Stage> {
        self.with_record(tid, |r| r.stage)
    }

    /// Thread-group leaders in pid order
    pub fn leaders(&self) -> Vec<Pid> {
        self.read()
            .values()
            .filter(|r| r.is_leader())
            .map(|r| r.tid)
            .collect()
    }

    /// Thread ids of the group led by `pid`, leader first
    pub fn threads_of(&self, pid: Pid) -> Vec<Pid> {
        group_of(&self.read(), pid)
    }

    /// Leaders whose parent is `pid`
    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.read()
            .values()
            .filter(|r| r.is_leader() && r.ppid == pid)
            .map(|r| r.tid)
            .collect()
    }

    pub fn set_sleeping(&self, tid: Pid, sleeping: bool) {
        if let Some(record) = self.write().get_mut(&tid) {
            record.sleeping = sleeping;
        }
    }

    /// Descriptor table of the process `tid` belongs to
    pub fn fds(&self, tid: Pid) -> ProcessResult<SharedFdTable> {
        let records = self.read();
        find_resource(&records, tid, |r| r.resources.fds.clone())
    }

    pub fn memory(&self, tid: Pid) -> ProcessResult<SharedAddressSpace> {
        let records = self.read();
        find_resource(&records, tid, |r| r.resources.memory.clone())
    }

    pub fn cwd(&self, tid: Pid) -> ProcessResult<NodeRef> {
        let records = self.read();
        find_resource(&records, tid, |r| r.resources.cwd.clone())
    }

    /// Change the working directory of every thread in the group
    pub fn set_cwd(&self, tid: Pid, dir: NodeRef) -> ProcessResult<()> {
        let mut previous = Vec::new();
        let mut records = self.write();
        let pid = records
            .get(&tid)
            .map(|r| r.pid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        for record in records.values_mut().filter(|r| r.pid == pid && r.is_live()) {
            previous.push(record.resources.cwd.replace(Arc::clone(&dir)));
        }
        drop(records);
        drop(previous);
        Ok(())
    }

    pub fn actions(&self, tid: Pid) -> ProcessResult<SharedActions> {
        self.with_record(tid, |r| Arc::clone(&r.actions))
    }

    /// Rename the process (comm)
    pub fn set_name(&self, tid: Pid, name: &str) -> ProcessResult<()> {
        let mut records = self.write();
        let record = records
            .get_mut(&tid)
            .ok_or(ProcessError::ProcessNotFound(tid))?;
        record.name = name.into();
        Ok(())
    }

    /// Next free pid from the rolling cursor
    ///
    /// Skips values in use as a tid, process group or session.
    pub(crate) fn allocate_pid(&self, records: &Records) -> ProcessResult<Pid> {
        let max_pid = self.inner.limits.max_pid;
        let in_use: BTreeSet<Pid> = records
            .values()
            .flat_map(|r| [r.tid, r.pgid, r.sid])
            .collect();
        let mut cursor = self.inner.next_pid.lock();
        for _ in FIRST_USER_PID..=max_pid {
            let candidate = *cursor;
            *cursor = if candidate >= max_pid {
                FIRST_USER_PID
            } else {
                candidate + 1
            };
            if candidate >= FIRST_USER_PID && !in_use.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ProcessError::PidsExhausted { max_pid })
    }
}

/// Thread ids of a group, leader first
pub(crate) fn group_of(records: &Records, pid: Pid) -> Vec<Pid> {
    let mut group: Vec<Pid> = Vec::new();
    if records.get(&pid).is_some_and(|r| r.pid == pid) {
        group.push(pid);
    }
    group.extend(
        records
            .values()
            .filter(|r| r.pid == pid && r.tid != pid)
            .map(|r| r.tid),
    );
    group
}

pub(crate) fn live_threads(records: &Records, pid: Pid) -> usize {
    records
        .values()
        .filter(|r| r.pid == pid && r.is_live())
        .count()
}

/// Resource of `tid`, falling back to a live thread of the same group when
/// the record itself already released it
fn find_resource<T>(
    records: &Records,
    tid: Pid,
    get: impl Fn(&ProcessRecord) -> Option<T>,
) -> ProcessResult<T> {
    let record = records.get(&tid).ok_or(ProcessError::ProcessNotFound(tid))?;
    get(record)
        .or_else(|| {
            records
                .values()
                .filter(|r| r.pid == record.pid && r.is_live())
                .find_map(&get)
        })
        .ok_or(ProcessError::Terminated(tid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(max_pid: Pid) -> ProcessTable {
        ProcessTable::new(TableLimits {
            max_processes: 64,
            max_pid,
            max_fds: 16,
        })
    }

    #[test]
    fn test_pid_allocation_wraps_and_skips_groups() {
        let table = table_with(6);
        let mut records = table.write();
        records.insert(INIT_PID, ProcessRecord::leader(INIT_PID, 0, "init"));
        let mut holder = ProcessRecord::leader(2, INIT_PID, "a");
        holder.pgid = 4;
        records.insert(2, holder);

        assert_eq!(table.allocate_pid(&records).unwrap(), 3);
        assert_eq!(table.allocate_pid(&records).unwrap(), 5);
        assert_eq!(table.allocate_pid(&records).unwrap(), 6);
        // Wrapped: 2 is a tid and 4 a process group
        assert_eq!(table.allocate_pid(&records).unwrap(), 3);
    }

    #[test]
    fn test_pid_exhaustion() {
        let table = table_with(3);
        let mut records = table.write();
        records.insert(2, ProcessRecord::leader(2, INIT_PID, "a"));
        records.insert(3, ProcessRecord::leader(3, INIT_PID, "b"));
        assert_eq!(
            table.allocate_pid(&records),
            Err(ProcessError::PidsExhausted { max_pid: 3 })
        );
    }

    #[test]
    fn test_for_each_returns_first_match() {
        let table = table_with(100);
        {
            let mut records = table.write();
            records.insert(INIT_PID, ProcessRecord::leader(INIT_PID, 0, "init"));
            records.insert(7, ProcessRecord::leader(7, INIT_PID, "a"));
            records.insert(9, ProcessRecord::leader(9, INIT_PID, "b"));
        }
        assert_eq!(table.for_each(|r| r.ppid == INIT_PID), Some(7));
        assert_eq!(table.for_each(|r| r.name.as_str() == "b"), Some(9));
        assert_eq!(table.for_each(|r| r.ppid == 42), None);
        assert_eq!(table.children_of(INIT_PID), vec![7, 9]);
    }
}
