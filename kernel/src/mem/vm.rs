//! Kernel-privileged tables: the machine-global direct-map table and the
//! per-process kernel tables that shadow a process's user mappings so the
//! kernel can dereference user addresses during system-call handling.

use core::ptr;

use riscv::asm::sfence_vma_all;
use riscv::register::satp;
use spin::Once;

use super::addr::{VirtAddr, align_up};
use super::layout::{self, KERNEL_REGIONS};
use super::pagetable::{OutOfFrames, PageTable};
use super::pmem::{Frame, FrameAllocator};
use super::pte::{PTE_R, PTE_U, PTE_W, pte_flags, pte_is_leaf, pte_is_table, pte_is_valid, pte_to_pa};
use super::uvm::UvmError;
use super::{PGNUM, PGSIZE};

static KERNEL_TABLE: Once<PageTable> = Once::new();

/// Install the shared direct-map set into a kernel-privileged table. Used
/// for the global table and for every per-process kernel table; the region
/// list itself lives in `layout`.
pub fn map_kernel_regions(table: &mut PageTable, fa: &dyn FrameAllocator) -> Result<(), OutOfFrames> {
    for region in KERNEL_REGIONS.iter() {
        printk!(
            "vm: map {} [{:#x}, {:#x}) -> {:#x} perm {:#x}\n",
            region.name,
            region.va,
            region.va + region.size,
            region.pa,
            region.perm
        );
        table.map_range(region.va, region.size, region.pa, region.perm, fa)?;
    }
    Ok(())
}

/// Build the machine-global kernel table. Runs once, during single-threaded
/// boot; the table is frozen afterwards and lives for the machine's
/// lifetime. Repeated calls are no-ops.
pub fn init_kernel_table(fa: &dyn FrameAllocator) {
    KERNEL_TABLE.call_once(|| {
        let mut table = PageTable::new();
        if map_kernel_regions(&mut table, fa).is_err() {
            panic!("init_kernel_table: out of frames");
        }
        // Boot needs the CLINT to program the timer; per-process kernel
        // tables leave the range unmapped.
        if table
            .map_range(layout::CLINT, layout::CLINT_SIZE, layout::CLINT, PTE_R | PTE_W, fa)
            .is_err()
        {
            panic!("init_kernel_table: out of frames");
        }
        table
    });
}

pub fn kernel_table() -> &'static PageTable {
    KERNEL_TABLE.get().expect("kernel table not initialized")
}

/// A fresh per-process kernel table carrying the direct-map set. The caller
/// shadows the process's user mappings into it with `shadow_copy`. `None`
/// when the allocator runs dry; nothing is left half-built.
pub fn new_kernel_table(fa: &dyn FrameAllocator) -> Option<*mut PageTable> {
    let frame = fa.allocate_frame()?;
    let root = frame.addr() as *mut PageTable;
    unsafe { ptr::write_bytes(root as *mut u8, 0, PGSIZE) };
    if map_kernel_regions(unsafe { &mut *root }, fa).is_err() {
        free_shadow_structure(root, fa);
        return None;
    }
    Some(root)
}

/// Point this hart at `table` and flush its cached translations. Required
/// after switching tables and after any mapping change this hart may have
/// cached; the flush is part of the contract, not an optimization.
pub fn activate(table: &PageTable) {
    let root_ppn = (table as *const PageTable as usize) >> 12;
    unsafe {
        satp::set(satp::Mode::Sv39, 0, root_ppn);
        sfence_vma_all();
    }
}

/// Mirror `src`'s leaf mappings in `[align_up(start), start + size)` into
/// `dst` with the user-access flag stripped: the kernel table may reach user
/// memory but must never grant user mode access through these entries.
/// `dst` takes no ownership of the frames. Rounding the start up keeps
/// repeated calls over a monotonically growing range from remapping pages
/// shadowed by an earlier call. A hole in the source range is a kernel bug.
/// On failure, everything this call installed is unmapped (not freed).
pub fn shadow_copy(
    src: &PageTable,
    dst: &mut PageTable,
    start: VirtAddr,
    size: usize,
    fa: &dyn FrameAllocator,
) -> Result<(), UvmError> {
    let first = align_up(start);
    let mut a = first;
    while a < start + size {
        let slot = src
            .lookup(a)
            .unwrap_or_else(|| panic!("shadow_copy: no table for va {:#x}", a));
        let entry = unsafe { *slot };
        if !pte_is_valid(entry) {
            panic!("shadow_copy: va {:#x} not mapped", a);
        }
        let pa = pte_to_pa(entry);
        let perm = pte_flags(entry) & !PTE_U;
        if dst.map_range(a, PGSIZE, pa, perm, fa).is_err() {
            dst.unmap_range(first, (a - first) / PGSIZE, false, fa);
            return Err(UvmError::MapFailed);
        }
        a += PGSIZE;
    }
    Ok(())
}

/// Shrink the shadowed range from `old_size` down to `new_size` without
/// releasing any frames; the user table owns them. Same tolerance as
/// `uvm::shrink`: already-vacant pages are skipped, so the call is
/// idempotent.
pub fn shadow_shrink(table: &mut PageTable, old_size: usize, new_size: usize) -> usize {
    if new_size >= old_size {
        return old_size;
    }
    let mut a = align_up(new_size);
    while a < align_up(old_size) {
        if let Some(slot) = table.lookup(a) {
            let entry = unsafe { *slot };
            if pte_is_valid(entry) {
                if !pte_is_leaf(entry) {
                    panic!("shadow_shrink: va {:#x} not a leaf", a);
                }
                unsafe { *slot = 0 };
            }
        }
        a += PGSIZE;
    }
    new_size
}

/// Release a kernel table's internal-node pages, the root included. Leaf
/// entries (the direct map and any still-shadowed user pages) are left
/// alone: the frames they reference are owned elsewhere.
pub fn free_shadow_structure(root: *mut PageTable, fa: &dyn FrameAllocator) {
    fn free_level(table: *mut PageTable, fa: &dyn FrameAllocator) {
        for i in 0..PGNUM {
            let entry = unsafe { (*table).entries[i] };
            if pte_is_table(entry) {
                free_level(pte_to_pa(entry) as *mut PageTable, fa);
                unsafe { (*table).entries[i] = 0 };
            }
        }
        fa.free_frame(unsafe { Frame::from_raw(table as usize) });
    }
    free_level(root, fa);
}
