//! Guest-visible linear memory
//!
//! The bridge never holds on to guest memory: it copies bytes in when the guest
//! passes a pointer and copies bytes out into a caller-supplied destination.
//! [`GuestMemory`] is that seam. [`LinearMemory`] is a self-contained,
//! bounds-checked implementation with a bump allocator, used when no external
//! runtime provides the memory.
//!
//! Memory layout follows the WebAssembly specification:
//! - Page size: 64KB (65,536 bytes)
//! - Address space: 32-bit (max 4GB)
//! - Bounds checking: Required for all accesses
//! - Out-of-bounds access: `MemoryError`

use crate::error::{BridgeError, Result};
use std::ops::Range;

/// WebAssembly page size in bytes (64KB)
pub const PAGE_SIZE: usize = 65536;

/// Maximum number of pages (2^16 = 64K pages = 4GB total)
pub const MAX_PAGES: u32 = 65536;

/// First address handed out by the allocator. Address 0 is never allocated so
/// a null pointer can't alias a live buffer.
pub const HEAP_BASE: u32 = 8;

/// Alignment of every allocation
const ALLOC_ALIGN: u32 = 8;

/// Byte-level access to memory shared with the guest
pub trait GuestMemory {
    /// Copy `len` bytes starting at `addr` out of guest memory
    fn read(&self, addr: u32, len: usize) -> Result<Vec<u8>>;

    /// Copy `bytes` into guest memory starting at `addr`
    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<()>;

    /// Reserve `len` bytes visible to the guest and return their address
    fn allocate(&mut self, len: u32) -> Result<u32>;

    /// Current size in bytes
    fn size_bytes(&self) -> usize;
}

/// A WebAssembly-style linear memory instance
///
/// All access is bounds-checked before touching the underlying data. The
/// allocator grows the memory a page at a time up to `max_pages`.
#[derive(Debug)]
pub struct LinearMemory {
    data: Vec<u8>,
    /// Growth limit, already resolved against [`MAX_PAGES`]
    max_pages: u32,
    /// Next free address for the bump allocator
    heap_top: u32,
}

impl LinearMemory {
    /// Create a memory of `initial_pages`, growable to `max_pages` (or to the
    /// 4GB address space when `None`)
    pub fn new(initial_pages: u32, max_pages: Option<u32>) -> Result<Self> {
        let limit = max_pages.unwrap_or(MAX_PAGES);
        if limit > MAX_PAGES {
            return Err(BridgeError::MemoryError(format!(
                "memory limit of {limit} pages is above the {MAX_PAGES} page address space"
            )));
        }
        if initial_pages > limit {
            return Err(BridgeError::MemoryError(format!(
                "{initial_pages} initial pages do not fit a {limit} page limit"
            )));
        }

        Ok(LinearMemory {
            data: vec![0u8; initial_pages as usize * PAGE_SIZE],
            max_pages: limit,
            heap_top: HEAP_BASE,
        })
    }

    /// Current size in pages
    pub fn size(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    /// Grow by whole pages until at least `min_bytes` are addressable
    fn grow_to(&mut self, min_bytes: usize) -> Result<()> {
        if min_bytes <= self.data.len() {
            return Ok(());
        }
        let pages = min_bytes.div_ceil(PAGE_SIZE);
        if pages > self.max_pages as usize {
            return Err(BridgeError::MemoryError(format!(
                "{min_bytes} bytes need {pages} pages, limit is {}",
                self.max_pages
            )));
        }

        let new_len = pages * PAGE_SIZE;
        self.data
            .try_reserve_exact(new_len - self.data.len())
            .map_err(|err| BridgeError::MemoryError(format!("cannot grow to {pages} pages: {err}")))?;
        self.data.resize(new_len, 0);
        log::trace!("linear memory grown to {} pages", pages);
        Ok(())
    }

    /// Byte range `addr..addr + len`, if it lies entirely inside memory
    #[inline]
    fn range(&self, addr: u32, len: usize) -> Result<Range<usize>> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(BridgeError::MemoryError(format!(
                "out of bounds memory access: {len} bytes at {start:#x}, memory is {} bytes",
                self.data.len()
            ))),
        }
    }

    /// Copy `len` bytes out of memory
    pub fn read_bytes(&self, addr: u32, len: usize) -> Result<Vec<u8>> {
        Ok(self.data[self.range(addr, len)?].to_vec())
    }

    /// Copy `bytes` into memory. Nothing is written if any byte would land out
    /// of bounds.
    pub fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> Result<()> {
        let range = self.range(addr, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Next address the allocator would hand out
    pub fn heap_top(&self) -> u32 {
        self.heap_top
    }
}

impl GuestMemory for LinearMemory {
    fn read(&self, addr: u32, len: usize) -> Result<Vec<u8>> {
        self.read_bytes(addr, len)
    }

    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<()> {
        self.write_bytes(addr, bytes)
    }

    /// Bump allocation. Memory grows by whole pages when the heap runs out;
    /// nothing is ever freed.
    fn allocate(&mut self, len: u32) -> Result<u32> {
        let out_of_memory = || BridgeError::MemoryError(format!("cannot allocate {len} bytes"));

        let start = self
            .heap_top
            .checked_add(ALLOC_ALIGN - 1)
            .map(|top| top & !(ALLOC_ALIGN - 1))
            .ok_or_else(out_of_memory)?;
        let end = start.checked_add(len).ok_or_else(out_of_memory)?;

        self.grow_to(end as usize)?;
        self.heap_top = end;
        Ok(start)
    }

    fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_creation() {
        let mem = LinearMemory::new(1, None).unwrap();
        assert_eq!(mem.size(), 1);
        assert_eq!(mem.size_bytes(), PAGE_SIZE);

        let mem = LinearMemory::new(0, Some(10)).unwrap();
        assert_eq!(mem.size_bytes(), 0);
    }

    #[test]
    fn test_memory_creation_errors() {
        assert!(LinearMemory::new(10, Some(5)).is_err());
        assert!(LinearMemory::new(MAX_PAGES + 1, None).is_err());
        assert!(LinearMemory::new(1, Some(MAX_PAGES + 1)).is_err());
    }

    #[test]
    fn test_bounds_checking() {
        let mem = LinearMemory::new(1, None).unwrap();

        assert_eq!(mem.range(0, PAGE_SIZE).unwrap(), 0..PAGE_SIZE);
        assert!(mem.range(PAGE_SIZE as u32 - 1, 1).is_ok());
        assert!(mem.range(PAGE_SIZE as u32, 0).is_ok());

        assert!(mem.range(PAGE_SIZE as u32, 1).is_err());
        assert!(mem.range(PAGE_SIZE as u32 - 1, 2).is_err());
        assert!(mem.range(u32::MAX, usize::MAX).is_err());
    }

    #[test]
    fn test_read_write() {
        let mut mem = LinearMemory::new(1, None).unwrap();

        mem.write_bytes(300, &[1, 2, 3]).unwrap();
        assert_eq!(mem.read_bytes(300, 3).unwrap(), vec![1, 2, 3]);
        assert!(mem.read_bytes(300, 0).unwrap().is_empty());

        assert!(mem.write_bytes(PAGE_SIZE as u32 - 2, &[0; 4]).is_err());
        assert!(mem.read_bytes(PAGE_SIZE as u32 - 3, 4).is_err());
        assert_eq!(mem.read_bytes(PAGE_SIZE as u32 - 2, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_allocate_is_aligned_and_disjoint() {
        let mut mem = LinearMemory::new(1, None).unwrap();

        let a = mem.allocate(3).unwrap();
        let b = mem.allocate(5).unwrap();
        assert_eq!(a, HEAP_BASE);
        assert_eq!(a % 8, 0);
        assert_eq!(b % 8, 0);
        assert!(b >= a + 3);
    }

    #[test]
    fn test_allocate_grows_memory() {
        let mut mem = LinearMemory::new(0, Some(2)).unwrap();

        let ptr = mem.allocate(100).unwrap();
        assert_eq!(mem.size(), 1);
        mem.write_bytes(ptr, &[0xAB; 100]).unwrap();

        mem.allocate(PAGE_SIZE as u32).unwrap();
        assert_eq!(mem.size(), 2);

        // Maximum reached, heap top unchanged
        let top = mem.heap_top();
        assert!(matches!(mem.allocate(PAGE_SIZE as u32), Err(BridgeError::MemoryError(_))));
        assert_eq!(mem.heap_top(), top);
        assert_eq!(mem.size(), 2);
    }
}
