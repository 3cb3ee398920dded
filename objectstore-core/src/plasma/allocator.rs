// Copyright 2017 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Allocator port consumed by the lifecycle manager, plus the two
//! implementations shipped with this crate: an mmap-backed production
//! allocator and a plain heap allocator used by tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use super::common::Allocation;

/// External allocator port. `allocate`/`fallback_allocate` return `None`
/// on exhaustion rather than an error type: the caller (the lifecycle
/// manager) is responsible for turning allocation failure into the
/// right `PlasmaError` variant once it has exhausted its eviction
/// cascade, so the port itself stays a simple capability.
pub trait Allocator: Send + Sync {
    /// Allocate from the primary pool. Returns `None` on exhaustion.
    fn allocate(&self, size: usize) -> Option<Allocation>;

    /// Allocate from the fallback pool (e.g. disk-backed). Returns `None`
    /// on exhaustion.
    fn fallback_allocate(&self, size: usize) -> Option<Allocation>;

    /// Return a previously allocated block. Always succeeds; consumes
    /// the token so it cannot be freed twice.
    fn free(&self, allocation: Allocation);

    /// Maximum number of primary bytes this allocator will hand out.
    fn footprint_limit(&self) -> usize;

    /// Total bytes currently allocated (primary + fallback).
    fn allocated(&self) -> usize;

    /// Bytes currently allocated from the fallback pool.
    fn fallback_allocated(&self) -> usize;
}

/// A plain heap-backed allocator. Used by unit and integration tests that
/// do not need real shared-memory semantics; not suitable for cross-process
/// sharing since the memory is process-private.
pub struct HeapAllocator {
    capacity: usize,
    total_allocated: AtomicUsize,
    fallback_allocated: AtomicUsize,
    allocations: Mutex<HashMap<usize, (usize, bool)>>, // address -> (size, is_fallback)
    next_fd: AtomicI32,
}

impl HeapAllocator {
    /// Create a new heap allocator with the given primary capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            total_allocated: AtomicUsize::new(0),
            fallback_allocated: AtomicUsize::new(0),
            allocations: Mutex::new(HashMap::new()),
            next_fd: AtomicI32::new(100),
        }
    }

    fn do_allocate(&self, size: usize, is_fallback: bool) -> Option<Allocation> {
        if size == 0 {
            return None;
        }
        if !is_fallback {
            let primary = self.total_allocated.load(Ordering::SeqCst)
                - self.fallback_allocated.load(Ordering::SeqCst);
            if primary + size > self.capacity {
                return None;
            }
        }

        let layout = std::alloc::Layout::from_size_align(size, 8).ok()?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return None;
        }

        self.allocations
            .lock()
            .insert(ptr as usize, (size, is_fallback));
        self.total_allocated.fetch_add(size, Ordering::SeqCst);
        if is_fallback {
            self.fallback_allocated.fetch_add(size, Ordering::SeqCst);
        }

        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        Some(Allocation::new(ptr, size, fd, 0, 0, size, is_fallback))
    }
}

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Option<Allocation> {
        self.do_allocate(size, false)
    }

    fn fallback_allocate(&self, size: usize) -> Option<Allocation> {
        self.do_allocate(size, true)
    }

    fn free(&self, allocation: Allocation) {
        let addr = allocation.address() as usize;
        let Some((size, is_fallback)) = self.allocations.lock().remove(&addr) else {
            return;
        };
        unsafe {
            let layout = std::alloc::Layout::from_size_align_unchecked(size, 8);
            std::alloc::dealloc(allocation.address(), layout);
        }
        self.total_allocated.fetch_sub(size, Ordering::SeqCst);
        if is_fallback {
            self.fallback_allocated.fetch_sub(size, Ordering::SeqCst);
        }
    }

    fn footprint_limit(&self) -> usize {
        self.capacity
    }

    fn allocated(&self) -> usize {
        self.total_allocated.load(Ordering::SeqCst)
    }

    fn fallback_allocated(&self) -> usize {
        self.fallback_allocated.load(Ordering::SeqCst)
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        let allocations: Vec<_> = self.allocations.lock().drain().collect();
        for (addr, (size, _)) in allocations {
            unsafe {
                let layout = std::alloc::Layout::from_size_align_unchecked(size, 8);
                std::alloc::dealloc(addr as *mut u8, layout);
            }
        }
    }
}

/// An allocator that always rejects allocation. Useful for exercising the
/// `OutOfMemory` path without any real memory pressure.
pub struct NullAllocator;

impl Allocator for NullAllocator {
    fn allocate(&self, _size: usize) -> Option<Allocation> {
        None
    }

    fn fallback_allocate(&self, _size: usize) -> Option<Allocation> {
        None
    }

    fn free(&self, _allocation: Allocation) {}

    fn footprint_limit(&self) -> usize {
        0
    }

    fn allocated(&self) -> usize {
        0
    }

    fn fallback_allocated(&self) -> usize {
        0
    }
}

/// Holds an mmap allocation along with its metadata; kept around purely
/// so the mapping stays alive until `free` drops it.
#[allow(dead_code)]
struct MmapAllocation {
    mmap: mmap_rs::MmapMut,
    size: usize,
    is_fallback: bool,
}

/// Production allocator. Primary allocation uses anonymous mmap (the
/// process's own shared-memory region); fallback allocation uses a
/// file-backed mmap so that it can spill beyond the primary footprint
/// limit onto disk.
pub struct MmapAllocator {
    fallback_directory: std::path::PathBuf,
    total_allocated: AtomicUsize,
    fallback_allocated: AtomicUsize,
    footprint_limit: usize,
    allocations: Mutex<HashMap<usize, MmapAllocation>>,
    next_fd: AtomicI32,
    alignment: usize,
}

impl MmapAllocator {
    /// Alignment for allocations (64 bytes, matching the reference allocator).
    const DEFAULT_ALIGNMENT: usize = 64;

    /// Reserved bytes for internal bookkeeping, kept out of the usable limit.
    const RESERVED_BYTES: usize = 256 * std::mem::size_of::<usize>();

    /// Create a new allocator.
    ///
    /// `fallback_directory` must be a writable directory; fallback
    /// allocations create (and immediately unlink) temp files there.
    pub fn new(fallback_directory: impl Into<std::path::PathBuf>, footprint_limit: usize) -> Self {
        Self {
            fallback_directory: fallback_directory.into(),
            total_allocated: AtomicUsize::new(0),
            fallback_allocated: AtomicUsize::new(0),
            footprint_limit,
            allocations: Mutex::new(HashMap::new()),
            next_fd: AtomicI32::new(100),
            alignment: Self::DEFAULT_ALIGNMENT,
        }
    }

    fn align_up(&self, size: usize) -> usize {
        (size + self.alignment - 1) & !(self.alignment - 1)
    }
}

impl Allocator for MmapAllocator {
    fn allocate(&self, size: usize) -> Option<Allocation> {
        if size == 0 {
            return None;
        }

        let total = self.total_allocated.load(Ordering::SeqCst);
        let fallback = self.fallback_allocated.load(Ordering::SeqCst);
        let primary_allocated = total.saturating_sub(fallback);
        let usable_limit = self.footprint_limit.saturating_sub(Self::RESERVED_BYTES);
        if primary_allocated + size > usable_limit {
            return None;
        }

        let aligned_size = self.align_up(size);
        let mmap = mmap_rs::MmapOptions::new(aligned_size).ok()?.map_mut().ok()?;
        let ptr = mmap.as_ptr() as *mut u8;
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);

        self.allocations.lock().insert(
            ptr as usize,
            MmapAllocation {
                mmap,
                size: aligned_size,
                is_fallback: false,
            },
        );
        self.total_allocated.fetch_add(size, Ordering::SeqCst);

        Some(Allocation::new(ptr, size, fd, 0, 0, aligned_size, false))
    }

    fn fallback_allocate(&self, size: usize) -> Option<Allocation> {
        if size == 0 {
            return None;
        }

        let aligned_size = self.align_up(size);
        let file = tempfile::tempfile_in(&self.fallback_directory).ok()?;
        file.set_len(aligned_size as u64).ok()?;

        let mmap = unsafe {
            mmap_rs::MmapOptions::new(aligned_size)
                .ok()?
                .with_file(&file, 0)
                .map_mut()
                .ok()?
        };
        let ptr = mmap.as_ptr() as *mut u8;
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);

        self.allocations.lock().insert(
            ptr as usize,
            MmapAllocation {
                mmap,
                size: aligned_size,
                is_fallback: true,
            },
        );
        self.total_allocated.fetch_add(size, Ordering::SeqCst);
        self.fallback_allocated.fetch_add(size, Ordering::SeqCst);

        Some(Allocation::new(ptr, size, fd, 0, 0, aligned_size, true))
    }

    fn free(&self, allocation: Allocation) {
        let addr = allocation.address() as usize;
        let size = allocation.size();

        if let Some(mmap_alloc) = self.allocations.lock().remove(&addr) {
            self.total_allocated.fetch_sub(size, Ordering::SeqCst);
            if mmap_alloc.is_fallback {
                self.fallback_allocated.fetch_sub(size, Ordering::SeqCst);
            }
            // mmap_alloc.mmap drops here, unmapping the memory.
        }
    }

    fn footprint_limit(&self) -> usize {
        self.footprint_limit
    }

    fn allocated(&self) -> usize {
        self.total_allocated.load(Ordering::SeqCst)
    }

    fn fallback_allocated(&self) -> usize {
        self.fallback_allocated.load(Ordering::SeqCst)
    }
}
