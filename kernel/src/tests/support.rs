use std::sync::atomic::{AtomicUsize, Ordering};

use crate::mem::pagetable::PageTable;
use crate::mem::pmem::{self, Frame, FrameAllocator, FramePool};
use crate::mem::pte::{pte_is_valid, pte_to_pa};
use crate::mem::uvm;

pub fn pool() -> &'static FramePool {
    pmem::pool()
}

pub fn new_table() -> *mut PageTable {
    uvm::create(pool()).expect("frame pool exhausted")
}

/// Start of the frame backing `va`, which must be mapped.
pub fn page_ptr(table: &PageTable, va: usize) -> *mut u8 {
    let slot = table.lookup(va).expect("page must be mapped");
    let entry = unsafe { *slot };
    assert!(pte_is_valid(entry), "page at {:#x} must be mapped", va);
    pte_to_pa(entry) as *mut u8
}

/// Delegates to the shared pool while counting every allocation and free,
/// optionally refusing allocations past a quota. Lets a test force
/// exhaustion mid-operation without draining the pool under the other
/// tests, and assert that rollback returned everything it took.
pub struct MeteredAllocator {
    quota: AtomicUsize,
    allocated: AtomicUsize,
    freed: AtomicUsize,
}

impl MeteredAllocator {
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: AtomicUsize::new(quota),
            allocated: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::with_quota(usize::MAX)
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }
}

impl FrameAllocator for MeteredAllocator {
    fn allocate_frame(&self) -> Option<Frame> {
        self.quota
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |q| q.checked_sub(1))
            .ok()?;
        let frame = pool().allocate_frame()?;
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Some(frame)
    }

    fn free_frame(&self, frame: Frame) {
        self.freed.fetch_add(1, Ordering::SeqCst);
        pool().free_frame(frame);
    }
}
