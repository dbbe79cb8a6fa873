/*!
 * Address Space
 * Page-aligned mapping table behind mmap and munmap
 */

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::*;
use crate::core::limits::{MAX_MAPPED_BYTES, MMAP_BASE, MMAP_LIMIT, PAGE_SIZE};

/// Address space shared by threads and vfork children
pub type SharedAddressSpace = Arc<Mutex<AddressSpace>>;

/// Arguments of one `mmap` call after descriptor lookup
#[derive(Debug, Clone)]
pub struct MapRequest {
    /// Placement hint, or the exact address under MAP_FIXED
    pub addr: u64,
    pub len: u64,
    pub prot: u32,
    pub flags: u32,
    pub backing: Backing,
    /// Initial contents; shorter data leaves the rest zero-filled
    pub data: Vec<u8>,
}

impl MapRequest {
    pub fn anonymous(len: u64, prot: u32, flags: u32) -> Self {
        Self {
            addr: 0,
            len,
            prot,
            flags: flags | MAP_ANONYMOUS,
            backing: Backing::Anonymous,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, addr: u64) -> Self {
        self.addr = addr;
        self
    }
}

#[derive(Debug, Clone)]
struct Region {
    len: u64,
    prot: u32,
    shared: bool,
    backing: Backing,
    storage: Arc<RwLock<Vec<u8>>>,
    /// Offset of this region's first byte within `storage`
    offset: usize,
}

impl Region {
    /// Part of the region covering `[from, from + len)` relative offsets
    fn slice(&self, from: u64, len: u64) -> Region {
        let backing = match &self.backing {
            Backing::Anonymous => Backing::Anonymous,
            Backing::File { path, offset } => Backing::File {
                path: path.clone(),
                offset: offset + from,
            },
        };
        Region {
            len,
            prot: self.prot,
            shared: self.shared,
            backing,
            storage: Arc::clone(&self.storage),
            offset: self.offset + from as usize,
        }
    }

    /// Private copy detached from the current storage
    fn detached(&self) -> Region {
        let storage = self.storage.read();
        let bytes = storage[self.offset..self.offset + self.len as usize].to_vec();
        Region {
            storage: Arc::new(RwLock::new(bytes)),
            offset: 0,
            ..self.clone()
        }
    }
}

/// Per-process set of mapped regions
#[derive(Debug)]
pub struct AddressSpace {
    regions: BTreeMap<u64, Region>,
    max_mappings: usize,
    max_bytes: u64,
}

#[inline]
fn page_align_up(len: u64) -> Option<u64> {
    len.checked_add(PAGE_SIZE - 1).map(|v| v & !(PAGE_SIZE - 1))
}

impl AddressSpace {
    pub fn new(max_mappings: usize) -> Self {
        Self {
            regions: BTreeMap::new(),
            max_mappings,
            max_bytes: MAX_MAPPED_BYTES,
        }
    }

    #[must_use]
    pub fn with_byte_limit(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn shared(max_mappings: usize) -> SharedAddressSpace {
        Arc::new(Mutex::new(Self::new(max_mappings)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Total bytes mapped
    pub fn mapped_bytes(&self) -> u64 {
        self.regions.values().map(|r| r.len).sum()
    }

    /// Reject a request that cannot fit the byte budget even after a
    /// MAP_FIXED replacement frees everything it overlaps
    pub fn check_budget(&self, len: u64) -> MemoryResult<()> {
        let len = page_align_up(len).ok_or(MemoryError::InvalidLength(len))?;
        if len > self.max_bytes {
            return Err(MemoryError::OutOfMemory {
                requested: len,
                available: self.max_bytes.saturating_sub(self.mapped_bytes()),
            });
        }
        Ok(())
    }

    /// Bytes of existing regions inside `[addr, end)`
    fn overlap_bytes(&self, addr: u64, end: u64) -> u64 {
        self.regions
            .range(..end)
            .map(|(&start, region)| {
                let lo = start.max(addr);
                let hi = (start + region.len).min(end);
                hi.saturating_sub(lo)
            })
            .sum()
    }

    /// Create a mapping and return its address
    pub fn map(&mut self, request: MapRequest) -> MemoryResult<u64> {
        let shared = request.flags & MAP_SHARED != 0;
        let private = request.flags & MAP_PRIVATE != 0;
        if shared == private {
            return Err(MemoryError::InvalidFlags(request.flags));
        }
        if request.len == 0 {
            return Err(MemoryError::InvalidLength(0));
        }
        let len = page_align_up(request.len).ok_or(MemoryError::InvalidLength(request.len))?;
        self.check_budget(len)?;

        let fixed = request.flags & MAP_FIXED != 0;
        let freed = if fixed {
            request
                .addr
                .checked_add(len)
                .map_or(0, |end| self.overlap_bytes(request.addr, end))
        } else {
            0
        };
        let available = self.max_bytes.saturating_sub(self.mapped_bytes() - freed);
        if len > available {
            return Err(MemoryError::OutOfMemory {
                requested: len,
                available,
            });
        }

        let start = if fixed {
            if request.addr % PAGE_SIZE != 0 {
                return Err(MemoryError::AlignmentError {
                    address: request.addr,
                    alignment: PAGE_SIZE,
                });
            }
            let end = request
                .addr
                .checked_add(len)
                .ok_or(MemoryError::InvalidAddress(request.addr))?;
            if request.addr < PAGE_SIZE || end > MMAP_LIMIT {
                return Err(MemoryError::InvalidAddress(request.addr));
            }
            self.unmap(request.addr, len)?;
            request.addr
        } else {
            let hint = page_align_up(request.addr)
                .filter(|a| *a >= MMAP_BASE)
                .unwrap_or(MMAP_BASE);
            self.find_gap(hint, len)
                .or_else(|| self.find_gap(MMAP_BASE, len))
                .ok_or(MemoryError::OutOfAddressSpace { requested: len })?
        };

        if self.regions.len() >= self.max_mappings {
            return Err(MemoryError::TooManyMappings {
                limit: self.max_mappings,
            });
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len as usize)
            .map_err(|_| MemoryError::OutOfMemory {
                requested: len,
                available,
            })?;
        bytes.resize(len as usize, 0);
        let copied = request.data.len().min(bytes.len());
        bytes[..copied].copy_from_slice(&request.data[..copied]);
        self.regions.insert(
            start,
            Region {
                len,
                prot: request.prot,
                shared,
                backing: request.backing,
                storage: Arc::new(RwLock::new(bytes)),
                offset: 0,
            },
        );
        Ok(start)
    }

    fn find_gap(&self, from: u64, len: u64) -> Option<u64> {
        let mut cursor = from;
        for (&start, region) in &self.regions {
            let end = start + region.len;
            if end <= cursor {
                continue;
            }
            if start >= cursor.checked_add(len)? {
                break;
            }
            cursor = cursor.max(end);
        }
        let end = cursor.checked_add(len)?;
        (end <= MMAP_LIMIT).then_some(cursor)
    }

    /// Remove `[addr, addr + len)`, splitting regions that straddle the edges
    pub fn unmap(&mut self, addr: u64, len: u64) -> MemoryResult<()> {
        if addr % PAGE_SIZE != 0 {
            return Err(MemoryError::AlignmentError {
                address: addr,
                alignment: PAGE_SIZE,
            });
        }
        if len == 0 {
            return Err(MemoryError::InvalidLength(0));
        }
        let end = page_align_up(len)
            .and_then(|len| addr.checked_add(len))
            .ok_or(MemoryError::InvalidLength(len))?;

        let overlapping: Vec<u64> = self
            .regions
            .range(..end)
            .filter(|(start, region)| **start + region.len > addr)
            .map(|(&start, _)| start)
            .collect();

        for start in overlapping {
            let Some(region) = self.regions.remove(&start) else {
                continue;
            };
            let region_end = start + region.len;
            if start < addr {
                self.regions.insert(start, region.slice(0, addr - start));
            }
            if region_end > end {
                self.regions
                    .insert(end, region.slice(end - start, region_end - end));
            }
        }
        Ok(())
    }

    /// Copy for a forked child: private regions are duplicated, shared
    /// regions keep their storage
    pub fn fork_copy(&self) -> AddressSpace {
        let regions = self
            .regions
            .iter()
            .map(|(&start, region)| {
                let copy = if region.shared {
                    region.clone()
                } else {
                    region.detached()
                };
                (start, copy)
            })
            .collect();
        AddressSpace {
            regions,
            max_mappings: self.max_mappings,
            max_bytes: self.max_bytes,
        }
    }

    /// Region containing `addr`
    fn region_at(&self, addr: u64) -> Option<(u64, &Region)> {
        self.regions
            .range(..=addr)
            .next_back()
            .filter(|(start, region)| addr < **start + region.len)
            .map(|(&start, region)| (start, region))
    }

    /// Verify `[addr, addr + len)` is mapped with every bit of `prot`
    pub fn check_range(&self, addr: u64, len: u64, prot: u32) -> MemoryResult<()> {
        let end = addr.checked_add(len).ok_or(MemoryError::InvalidAddress(addr))?;
        let mut at = addr;
        while at < end {
            let (start, region) = self.region_at(at).ok_or(MemoryError::InvalidAddress(at))?;
            if region.prot & prot != prot {
                return Err(MemoryError::ProtectionViolation(at));
            }
            at = start + region.len;
        }
        Ok(())
    }

    /// Copy `len` bytes out; the range is checked before anything is allocated
    pub fn read_to_vec(&self, addr: u64, len: usize) -> MemoryResult<Vec<u8>> {
        self.check_range(addr, len as u64, PROT_READ)?;
        let mut buf = vec![0u8; len];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }

    /// Read guest memory; the whole range must be mapped readable
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> MemoryResult<()> {
        let mut done = 0usize;
        while done < buf.len() {
            let at = addr + done as u64;
            let (start, region) = self.region_at(at).ok_or(MemoryError::InvalidAddress(at))?;
            if region.prot & PROT_READ == 0 {
                return Err(MemoryError::ProtectionViolation(at));
            }
            let within = (at - start) as usize;
            let n = (region.len as usize - within).min(buf.len() - done);
            let storage = region.storage.read();
            let from = region.offset + within;
            buf[done..done + n].copy_from_slice(&storage[from..from + n]);
            done += n;
        }
        Ok(())
    }

    /// Write guest memory; the whole range must be mapped writable
    pub fn write(&self, addr: u64, data: &[u8]) -> MemoryResult<()> {
        let mut done = 0usize;
        while done < data.len() {
            let at = addr + done as u64;
            let (start, region) = self.region_at(at).ok_or(MemoryError::InvalidAddress(at))?;
            if region.prot & PROT_WRITE == 0 {
                return Err(MemoryError::ProtectionViolation(at));
            }
            let within = (at - start) as usize;
            let n = (region.len as usize - within).min(data.len() - done);
            let mut storage = region.storage.write();
            let from = region.offset + within;
            storage[from..from + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
        Ok(())
    }

    /// Snapshot of the mapping table in address order
    pub fn regions(&self) -> Vec<MappingInfo> {
        self.regions
            .iter()
            .map(|(&start, region)| MappingInfo {
                start,
                len: region.len,
                prot: region.prot,
                shared: region.shared,
                backing: region.backing.clone(),
            })
            .collect()
    }
}
