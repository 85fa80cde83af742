use core::fmt::{self, Write};
use core::ptr;

use super::addr::{VirtAddr, align_down, vpn};
use super::pmem::{Frame, FrameAllocator};
use super::pte::{
    PTE_U, PTE_V, Pte, pa_to_pte, pte_flags, pte_is_leaf, pte_is_table, pte_is_valid, pte_to_pa,
};
use super::{MAXVA, PGNUM, PGSIZE, PhysAddr};

/// A required page-table page could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfFrames;

// align 4096 so a root can go straight into satp
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [Pte; PGNUM],
}

impl PageTable {
    pub const fn new() -> Self {
        PageTable { entries: [0; PGNUM] }
    }

    /// Descend L2 -> L1 and return the level-0 slot for `va`. With `alloc`,
    /// missing interior entries get a fresh zeroed table page and an
    /// internal PTE (valid, no access flags); without it the walk stops with
    /// `None`. The returned slot may itself be invalid; callers extract the
    /// frame with `pte_to_pa` on its contents. Leaves are never created
    /// here. Handing in a va at or past `MAXVA` is a kernel bug.
    pub fn walk(&mut self, va: VirtAddr, alloc: bool, fa: &dyn FrameAllocator) -> Option<*mut Pte> {
        if va >= MAXVA {
            panic!("walk: va {:#x} out of range", va);
        }
        let mut table: *mut PageTable = self as *mut PageTable;
        for level in (1..3).rev() {
            let idx = vpn(va)[level];
            let slot = unsafe { &mut (*table).entries[idx] };
            if pte_is_valid(*slot) {
                if pte_is_leaf(*slot) {
                    // super pages are not supported
                    return None;
                }
                table = pte_to_pa(*slot) as *mut PageTable;
            } else {
                if !alloc {
                    return None;
                }
                let frame = fa.allocate_frame()?;
                let next = frame.addr() as *mut PageTable;
                unsafe {
                    ptr::write_bytes(next as *mut u8, 0, PGSIZE);
                    *slot = pa_to_pte(frame.addr(), PTE_V);
                }
                table = next;
            }
        }
        Some(unsafe { &mut (*table).entries[vpn(va)[0]] as *mut Pte })
    }

    /// Read-only descent. Soft on every failure, a bad va included, so
    /// untrusted addresses can be probed without tripping walk's contract.
    pub fn lookup(&self, va: VirtAddr) -> Option<*mut Pte> {
        if va >= MAXVA {
            return None;
        }
        let mut table: *const PageTable = self as *const PageTable;
        for level in (1..3).rev() {
            let idx = vpn(va)[level];
            let pte = unsafe { (*table).entries[idx] };
            if !pte_is_table(pte) {
                return None;
            }
            table = pte_to_pa(pte) as *const PageTable;
        }
        Some(unsafe { &(*table).entries[vpn(va)[0]] as *const Pte as *mut Pte })
    }

    /// Resolve a user-supplied va to the start of its backing frame. `None`
    /// unless the leaf is valid and user-accessible; this is the one place an
    /// absent translation is input data rather than a bug.
    pub fn walkaddr(&self, va: VirtAddr) -> Option<PhysAddr> {
        let slot = self.lookup(va)?;
        let entry = unsafe { *slot };
        if !pte_is_valid(entry) || !pte_is_leaf(entry) {
            return None;
        }
        if pte_flags(entry) & PTE_U == 0 {
            return None;
        }
        Some(pte_to_pa(entry))
    }

    /// Install leaf mappings for every page covering `[va, va + size)`,
    /// advancing `pa` in lockstep. Neither va nor size needs to be aligned.
    /// Remapping a live page is a kernel bug, as is a range reaching past
    /// `MAXVA`. When a table page cannot be allocated the leaves installed
    /// by this call are removed again (the frames stay with the caller)
    /// before the error is reported.
    pub fn map_range(
        &mut self,
        va: VirtAddr,
        size: usize,
        pa: PhysAddr,
        perm: usize,
        fa: &dyn FrameAllocator,
    ) -> Result<(), OutOfFrames> {
        if size == 0 {
            panic!("map_range: zero size");
        }
        match va.checked_add(size) {
            Some(end) if end <= MAXVA => {}
            _ => panic!("map_range: [{:#x}, {:#x}+{:#x}) past MAXVA", va, va, size),
        }
        let first = align_down(va);
        let last = align_down(va + size - 1);
        let mut a = first;
        let mut pa_cur = align_down(pa);
        loop {
            let slot = match self.walk(a, true, fa) {
                Some(slot) => slot,
                None => {
                    if a > first {
                        self.unmap_range(first, (a - first) / PGSIZE, false, fa);
                    }
                    return Err(OutOfFrames);
                }
            };
            if pte_is_valid(unsafe { *slot }) {
                panic!("map_range: remap of va {:#x}", a);
            }
            unsafe { *slot = pa_to_pte(pa_cur, perm | PTE_V) };
            if a == last {
                break;
            }
            a += PGSIZE;
            pa_cur += PGSIZE;
        }
        Ok(())
    }

    /// Remove `npages` leaf mappings starting at page-aligned `va`. The
    /// mappings must exist and must be leaves. Frames go back to the
    /// allocator when `free`; a shadow table passes `false` because it never
    /// owns what its leaves reference.
    pub fn unmap_range(&mut self, va: VirtAddr, npages: usize, free: bool, fa: &dyn FrameAllocator) {
        if va % PGSIZE != 0 {
            panic!("unmap_range: va {:#x} not aligned", va);
        }
        let mut a = va;
        while a < va + npages * PGSIZE {
            let slot = self
                .lookup(a)
                .unwrap_or_else(|| panic!("unmap_range: no table for va {:#x}", a));
            let entry = unsafe { *slot };
            if !pte_is_valid(entry) {
                panic!("unmap_range: va {:#x} not mapped", a);
            }
            if !pte_is_leaf(entry) {
                panic!("unmap_range: va {:#x} not a leaf", a);
            }
            if free {
                fa.free_frame(unsafe { Frame::from_raw(pte_to_pa(entry)) });
            }
            unsafe { *slot = 0 };
            a += PGSIZE;
        }
    }

    /// Dump the tree: one line per valid entry, one ` ..` marker per depth
    /// level, internal nodes recursed into.
    pub fn dump(&self, w: &mut dyn Write) -> fmt::Result {
        fn dump_level(table: *const PageTable, depth: usize, w: &mut dyn Write) -> fmt::Result {
            for i in 0..PGNUM {
                let entry = unsafe { (*table).entries[i] };
                if !pte_is_valid(entry) {
                    continue;
                }
                for _ in 0..=depth {
                    w.write_str(" ..")?;
                }
                writeln!(w, "{}: pte {:#x} pa {:#x}", i, entry, pte_to_pa(entry))?;
                if pte_is_table(entry) {
                    dump_level(pte_to_pa(entry) as *const PageTable, depth + 1, w)?;
                }
            }
            Ok(())
        }
        writeln!(w, "page table {:#x}", self as *const PageTable as usize)?;
        dump_level(self as *const PageTable, 0, w)
    }

    /// `dump` through the console.
    pub fn print(&self) {
        struct Console;
        impl Write for Console {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                printk!("{}", s);
                Ok(())
            }
        }
        let _ = self.dump(&mut Console);
    }
}

/// Post-order release of a table's internal-node pages, the root included.
/// Every leaf must already be unmapped; finding one is a contract violation,
/// since freeing the page under a live mapping would leak the frame it
/// references.
pub fn free_structure(root: *mut PageTable, fa: &dyn FrameAllocator) {
    fn free_level(table: *mut PageTable, fa: &dyn FrameAllocator) {
        for i in 0..PGNUM {
            let entry = unsafe { (*table).entries[i] };
            if pte_is_table(entry) {
                free_level(pte_to_pa(entry) as *mut PageTable, fa);
                unsafe { (*table).entries[i] = 0 };
            } else if pte_is_valid(entry) {
                panic!("free_structure: leaf still mapped");
            }
        }
        fa.free_frame(unsafe { Frame::from_raw(table as usize) });
    }
    free_level(root, fa);
}
