// SPDX-License-Identifier: Apache-2.0

//! Confined heap
//!
//! The runtime's own allocations come from a single anonymous mapping whose
//! break only ever moves up. Memory handed out is never reused, releasing an
//! allocation is accepted and ignored.

use std::alloc::Layout;
use std::io;
use std::ptr::NonNull;

use log::trace;
use mmarinus::{perms, Map};

/// A monotonic heap backed by a private anonymous mapping.
pub struct Heap {
    map: Map<perms::ReadWrite>,
    brk: usize,
    brk_max: usize,
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("start", &format_args!("{:#x}", self.start()))
            .field("size", &self.size())
            .field("brk", &format_args!("{:#x}", self.brk))
            .field("brk_max", &format_args!("{:#x}", self.brk_max))
            .finish()
    }
}

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as usize,
        _ => 4096,
    }
}

impl Heap {
    /// Maps a heap of at least `size` bytes, rounded up to whole pages.
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let size = size
            .checked_add(page - 1)
            .map(|size| size / page * page)
            .filter(|size| *size > 0)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;

        let map = Map::bytes(size)
            .anywhere()
            .anonymously()
            .with(perms::ReadWrite)
            .map_err(|e| e.err)?;

        let start = map.addr();
        trace!("heap mapped at {start:#x} with {size} bytes");
        Ok(Self {
            map,
            brk: start,
            brk_max: start,
        })
    }

    /// First address of the heap.
    pub fn start(&self) -> usize {
        self.map.addr()
    }

    /// Size of the heap in bytes.
    pub fn size(&self) -> usize {
        self.map.size()
    }

    fn end(&self) -> usize {
        self.start() + self.size()
    }

    /// Whether `addr` lies within the heap.
    pub fn contains(&self, addr: usize) -> bool {
        (self.start()..self.end()).contains(&addr)
    }

    /// The highest break ever reached.
    pub fn brk_max(&self) -> usize {
        self.brk_max
    }

    /// Moves the break to `next`.
    ///
    /// Returns the new break, or the current one if `next` lies outside the heap.
    /// Lowering the break does not make memory available again.
    pub fn brk(&mut self, next: usize) -> usize {
        if next < self.start() || next > self.end() {
            return self.brk;
        }

        self.brk = next;
        self.brk_max = self.brk_max.max(next);
        next
    }

    /// Allocates memory for `layout`.
    ///
    /// Returns `None` once the heap is exhausted.
    pub fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let addr = self.brk_max.checked_add(layout.align() - 1)? & !(layout.align() - 1);
        let next = addr.checked_add(layout.size())?;
        if next > self.end() {
            return None;
        }

        self.brk(next);
        trace!("alloc {} bytes at {addr:#x}", layout.size());
        NonNull::new(addr as *mut u8)
    }

    /// Releases an allocation.
    ///
    /// The heap is monotonic, so the memory stays claimed.
    pub fn release(&mut self, ptr: NonNull<u8>, layout: Layout) {
        debug_assert!(self.contains(ptr.as_ptr() as usize));
        trace!("release {} bytes at {:p}", layout.size(), ptr);
    }
}
