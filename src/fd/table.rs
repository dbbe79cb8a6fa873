/*!
 * Descriptor Table
 * Per thread-group mapping of small integers to shared handles
 */

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::handle::HandleRef;
use super::types::{FdError, FdResult};
use crate::core::types::Fd;

/// Table shared by the threads of one process
pub type SharedFdTable = Arc<Mutex<FdTable>>;

/// Slot contents
#[derive(Debug, Clone)]
pub struct FdEntry {
    pub handle: HandleRef,
    pub cloexec: bool,
}

/// Descriptor table
///
/// Cloning copies the slots and shares the handles, which is what `fork`
/// needs. Removing the last slot that references a handle runs its close
/// side effects.
#[derive(Debug, Clone)]
pub struct FdTable {
    entries: BTreeMap<Fd, FdEntry>,
    capacity: u32,
}

impl FdTable {
    pub fn new(capacity: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    pub fn shared(capacity: u32) -> SharedFdTable {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install `handle` at the lowest unused descriptor
    pub fn allocate(&mut self, handle: HandleRef, cloexec: bool) -> FdResult<Fd> {
        self.allocate_from(0, handle, cloexec)
    }

    /// Install `handle` at the lowest unused descriptor not below `min`
    pub fn allocate_from(&mut self, min: Fd, handle: HandleRef, cloexec: bool) -> FdResult<Fd> {
        let mut candidate = min;
        for &fd in self.entries.range(min..).map(|(fd, _)| fd) {
            if fd != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate >= self.capacity {
            return Err(FdError::Exhausted {
                capacity: self.capacity,
            });
        }
        self.entries.insert(candidate, FdEntry { handle, cloexec });
        Ok(candidate)
    }

    pub fn get(&self, fd: Fd) -> FdResult<&FdEntry> {
        self.entries.get(&fd).ok_or(FdError::BadDescriptor(fd))
    }

    pub fn handle(&self, fd: Fd) -> FdResult<HandleRef> {
        self.get(fd).map(|entry| Arc::clone(&entry.handle))
    }

    pub fn dup(&mut self, old: Fd) -> FdResult<Fd> {
        let handle = self.handle(old)?;
        self.allocate(handle, false)
    }

    /// Make `new` an alias of `old`, closing what `new` held
    ///
    /// `old == new` only validates `old`. Returns the displaced handle so the
    /// caller controls where its close side effects run.
    pub fn dup2(&mut self, old: Fd, new: Fd) -> FdResult<Option<HandleRef>> {
        let handle = self.handle(old)?;
        if old == new {
            return Ok(None);
        }
        if new >= self.capacity {
            return Err(FdError::BadDescriptor(new));
        }
        let displaced = self.entries.insert(
            new,
            FdEntry {
                handle,
                cloexec: false,
            },
        );
        Ok(displaced.map(|entry| entry.handle))
    }

    /// Remove the slot, returning its handle reference
    pub fn close(&mut self, fd: Fd) -> FdResult<HandleRef> {
        self.entries
            .remove(&fd)
            .map(|entry| entry.handle)
            .ok_or(FdError::BadDescriptor(fd))
    }

    pub fn cloexec(&self, fd: Fd) -> FdResult<bool> {
        self.get(fd).map(|entry| entry.cloexec)
    }

    pub fn set_cloexec(&mut self, fd: Fd, cloexec: bool) -> FdResult<()> {
        self.entries
            .get_mut(&fd)
            .map(|entry| entry.cloexec = cloexec)
            .ok_or(FdError::BadDescriptor(fd))
    }

    /// Exec-time sweep: remove every close-on-exec slot
    pub fn close_on_exec_sweep(&mut self) -> Vec<HandleRef> {
        let doomed: Vec<Fd> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.cloexec)
            .map(|(fd, _)| *fd)
            .collect();
        doomed
            .into_iter()
            .filter_map(|fd| self.entries.remove(&fd))
            .map(|entry| entry.handle)
            .collect()
    }

    /// Remove every slot
    pub fn clear(&mut self) -> Vec<HandleRef> {
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|entry| entry.handle)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fd, &FdEntry)> {
        self.entries.iter().map(|(fd, entry)| (*fd, entry))
    }

    /// Open descriptors in ascending order
    pub fn fds(&self) -> Vec<Fd> {
        self.entries.keys().copied().collect()
    }
}
