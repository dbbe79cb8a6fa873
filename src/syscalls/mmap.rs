/*!
 * Memory Mapping Syscalls
 * mmap and munmap over the per-process address space
 */

use tracing::{debug, instrument};

use crate::core::errors::{KernelError, KernelResult};
use crate::core::limits::PAGE_SIZE;
use crate::core::types::{Fd, Pid};
use crate::kernel::Kernel;
use crate::fd::FdError;
use crate::memory::{Backing, MapRequest, MappingInfo, MAP_ANONYMOUS};
use crate::vfs::OpenFlags;

impl Kernel {
    /// Map `len` bytes; returns the start address
    ///
    /// Without MAP_ANONYMOUS, `fd` names the file whose range starting at
    /// `offset` is copied in at map time.
    #[instrument(skip(self))]
    pub fn mmap(
        &self,
        tid: Pid,
        addr: u64,
        len: u64,
        prot: u32,
        flags: u32,
        fd: i32,
        offset: u64,
    ) -> KernelResult<u64> {
        self.enter(tid);
        let space = self.processes().memory(tid)?;
        space.lock().check_budget(len)?;
        let (backing, data) = if flags & MAP_ANONYMOUS != 0 {
            (Backing::Anonymous, Vec::new())
        } else {
            self.file_range(tid, fd, offset, len)?
        };

        let start = space.lock().map(MapRequest {
            addr,
            len,
            prot,
            flags,
            backing,
            data,
        })?;
        debug!(tid, start = format_args!("0x{:x}", start), len, "Mapped");
        Ok(start)
    }

    fn file_range(&self, tid: Pid, fd: i32, offset: u64, len: u64) -> KernelResult<(Backing, Vec<u8>)> {
        if offset % PAGE_SIZE != 0 {
            return Err(KernelError::invalid_argument(format!("unaligned mmap offset {}", offset)));
        }
        let fd = Fd::try_from(fd).map_err(|_| FdError::BadDescriptor(fd.unsigned_abs()))?;
        let handle = self.handle(tid, fd)?;
        let node = handle
            .node()
            .ok_or_else(|| KernelError::not_supported(format!("mapping {}", handle.path())))?;

        let size = node.metadata()?.size;
        let wanted = size.saturating_sub(offset).min(len);
        let mut channel = node.open(OpenFlags::read_only())?;
        let mut data = vec![0u8; wanted as usize];
        let mut filled = 0;
        while filled < data.len() {
            let n = channel.read(offset + filled as u64, &mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        channel.close();
        data.truncate(filled);
        Ok((
            Backing::File {
                path: handle.path().to_string(),
                offset,
            },
            data,
        ))
    }

    #[instrument(skip(self))]
    pub fn munmap(&self, tid: Pid, addr: u64, len: u64) -> KernelResult<()> {
        let space = self.processes().memory(tid)?;
        space.lock().unmap(addr, len)?;
        Ok(())
    }

    /// Copy `len` bytes out of mapped memory
    pub fn mem_read(&self, tid: Pid, addr: u64, len: usize) -> KernelResult<Vec<u8>> {
        let space = self.processes().memory(tid)?;
        let buf = space.lock().read_to_vec(addr, len)?;
        Ok(buf)
    }

    /// Store `data` into writable mapped memory
    pub fn mem_write(&self, tid: Pid, addr: u64, data: &[u8]) -> KernelResult<()> {
        let space = self.processes().memory(tid)?;
        space.lock().write(addr, data)?;
        Ok(())
    }

    pub fn mappings(&self, tid: Pid) -> KernelResult<Vec<MappingInfo>> {
        Ok(self.processes().memory(tid)?.lock().regions())
    }
}
