use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};

use spin::{Mutex, Once};

use super::addr::{align_down, align_up};
use super::{PGSIZE, PhysAddr};

/// One 4096-byte unit of physical memory, identified by its start address.
/// Only an allocator mints these; everyone else treats them as opaque.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Frame(PhysAddr);

impl Frame {
    /// Rebuild a handle from a raw frame-start address.
    ///
    /// # Safety
    /// `addr` must be the start of a frame previously handed out by the
    /// allocator the handle will be returned to.
    pub unsafe fn from_raw(addr: PhysAddr) -> Self {
        Self(addr)
    }

    pub fn addr(self) -> PhysAddr {
        self.0
    }

    pub fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }

    pub fn as_mut_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }
}

/// Physical frame source consumed by the mapping operations. Non-blocking:
/// exhaustion is `None`, never a wait. Frames come back through `free_frame`
/// exactly once. Contents of a fresh frame are unspecified; callers that
/// need zeroed memory zero it themselves.
pub trait FrameAllocator: Sync {
    fn allocate_frame(&self) -> Option<Frame>;
    fn free_frame(&self, frame: Frame);
}

/// Frames backing the pool. On real hardware this range would come from the
/// RAM left over after the kernel image; a static arena keeps the subsystem
/// independent of the linker script.
pub const POOL_PAGES: usize = 4096;

#[repr(C, align(4096))]
struct Arena(UnsafeCell<[u8; POOL_PAGES * PGSIZE]>);

unsafe impl Sync for Arena {}

static ARENA: Arena = Arena(UnsafeCell::new([0; POOL_PAGES * PGSIZE]));

#[repr(C)]
struct FreePage {
    next: Option<NonNull<FreePage>>,
}

struct PoolInner {
    head: Option<NonNull<FreePage>>,
    allocable: usize,
}

/// The kernel's frame pool: an intrusive free list threaded through the free
/// frames themselves.
pub struct FramePool {
    bounds: Once<(PhysAddr, PhysAddr)>,
    inner: Mutex<PoolInner>,
}

unsafe impl Sync for FramePool {}

static POOL: FramePool = FramePool::new();

impl FramePool {
    const fn new() -> Self {
        Self {
            bounds: Once::new(),
            inner: Mutex::new(PoolInner { head: None, allocable: 0 }),
        }
    }

    fn init(&self) -> (PhysAddr, PhysAddr) {
        *self.bounds.call_once(|| {
            let begin = align_up(ARENA.0.get() as PhysAddr);
            let end = align_down(ARENA.0.get() as PhysAddr + POOL_PAGES * PGSIZE);

            let mut head: Option<NonNull<FreePage>> = None;
            let mut count = 0usize;
            let mut current = begin;
            while current + PGSIZE <= end {
                let page = current as *mut FreePage;
                unsafe {
                    (*page).next = head;
                }
                head = NonNull::new(page);
                count += 1;
                current += PGSIZE;
            }

            *self.inner.lock() = PoolInner { head, allocable: count };
            printk!("pmem: frame pool [{:#x}, {:#x}), {} pages\n", begin, end, count);
            (begin, end)
        })
    }

    pub fn allocable(&self) -> usize {
        self.init();
        self.inner.lock().allocable
    }
}

impl FrameAllocator for FramePool {
    fn allocate_frame(&self) -> Option<Frame> {
        self.init();
        let head = {
            let mut inner = self.inner.lock();
            let head = inner.head?;
            inner.head = unsafe { (*head.as_ptr()).next };
            inner.allocable -= 1;
            head
        };
        let page = head.as_ptr() as *mut u8;
        unsafe { ptr::write_bytes(page, 0, PGSIZE) };
        Some(Frame(page as PhysAddr))
    }

    fn free_frame(&self, frame: Frame) {
        let (begin, end) = self.init();
        let addr = frame.addr();
        if addr < begin || addr >= end || addr % PGSIZE != 0 {
            panic!("pmem: free of {:#x} outside pool [{:#x}, {:#x})", addr, begin, end);
        }
        let mut inner = self.inner.lock();
        unsafe {
            let page = addr as *mut FreePage;
            (*page).next = inner.head;
            inner.head = NonNull::new(page);
        }
        inner.allocable += 1;
    }
}

/// The machine-wide frame pool.
pub fn pool() -> &'static FramePool {
    &POOL
}

/// Set up the pool eagerly during boot; allocation would otherwise do it on
/// first use.
pub fn init() {
    POOL.init();
}
