#![allow(dead_code)]

pub const PGSIZE: usize = 4096;
pub const PGNUM: usize = PGSIZE / core::mem::size_of::<usize>(); // 2^9
pub const PGMASK: usize = PGSIZE - 1;

/// One past the highest usable virtual address. Sv39 sign-extends bit 38, so
/// the usable range stops one level-2 slot short of the hole.
pub const MAXVA: usize = 1 << 38;

pub use addr::{PhysAddr, VirtAddr};
pub use pagetable::PageTable;
pub use pmem::{Frame, FrameAllocator};
pub use pte::Pte;

pub mod addr;
pub mod layout;
pub mod pagetable;
pub mod pmem;
pub mod pte;
pub mod uvm;
pub mod vm;
