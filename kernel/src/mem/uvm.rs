//! User address spaces: creation and teardown, the first program image,
//! size changes with rollback, the deep copy behind fork, and byte transfer
//! between kernel memory and a user space through its table.

use core::cmp::min;
use core::ptr;

use super::addr::{VirtAddr, align_down, align_up, page_offset};
use super::pagetable::{PageTable, free_structure};
use super::pmem::{Frame, FrameAllocator};
use super::pte::{
    PTE_R, PTE_U, PTE_W, PTE_X, pte_flags, pte_is_leaf, pte_is_valid, pte_to_pa,
};
use super::PGSIZE;

/// Recoverable allocator exhaustion during a size change or a copy; the
/// failed operation has already rolled its partial work back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UvmError {
    NoMem,
    MapFailed,
}

/// An untrusted user address could not be translated. Nothing is rolled
/// back; bytes moved before the fault stay moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyError {
    NotMapped,
    NoPerm,
    TooLong,
}

/// An empty user table: one zeroed root, no mappings. `None` when the
/// allocator is exhausted.
pub fn create(fa: &dyn FrameAllocator) -> Option<*mut PageTable> {
    let frame = fa.allocate_frame()?;
    let root = frame.addr() as *mut PageTable;
    unsafe { ptr::write_bytes(root as *mut u8, 0, PGSIZE) };
    Some(root)
}

/// Map the very first program image at va 0: one page, read/write/execute,
/// user-accessible, zero-filled before the image bytes land in it. Anything
/// bigger goes through the regular loader; more than a page here is a bug.
pub fn install_first_program(table: &mut PageTable, image: &[u8], fa: &dyn FrameAllocator) {
    if image.len() >= PGSIZE {
        panic!("install_first_program: image larger than a page");
    }
    let frame = match fa.allocate_frame() {
        Some(frame) => frame,
        None => panic!("install_first_program: out of frames"),
    };
    unsafe { ptr::write_bytes(frame.as_mut_ptr(), 0, PGSIZE) };
    if table
        .map_range(0, PGSIZE, frame.addr(), PTE_R | PTE_W | PTE_X | PTE_U, fa)
        .is_err()
    {
        panic!("install_first_program: out of frames");
    }
    unsafe { ptr::copy_nonoverlapping(image.as_ptr(), frame.as_mut_ptr(), image.len()) };
}

/// Grow an address space from `old_size` to `new_size`, mapping fresh
/// zero-filled frames read/write/execute/user. Either the whole range
/// appears and `new_size` comes back, or everything this call allocated is
/// undone and `old_size` comes back; partial growth is never observable.
pub fn grow(
    table: &mut PageTable,
    old_size: usize,
    new_size: usize,
    fa: &dyn FrameAllocator,
) -> usize {
    if new_size <= old_size {
        return old_size;
    }
    let mut a = align_up(old_size);
    while a < new_size {
        let frame = match fa.allocate_frame() {
            Some(frame) => frame,
            None => {
                shrink(table, a, old_size, fa);
                return old_size;
            }
        };
        unsafe { ptr::write_bytes(frame.as_mut_ptr(), 0, PGSIZE) };
        if table
            .map_range(a, PGSIZE, frame.addr(), PTE_R | PTE_W | PTE_X | PTE_U, fa)
            .is_err()
        {
            fa.free_frame(frame);
            shrink(table, a, old_size, fa);
            return old_size;
        }
        a += PGSIZE;
    }
    new_size
}

/// Shrink an address space from `old_size` to `new_size`, unmapping and
/// freeing every page whose aligned address falls in the vacated range.
/// No-op when `new_size` is not smaller. `old_size` may overstate the true
/// high-water mark; pages that were never mapped are skipped, which also
/// makes the call idempotent.
pub fn shrink(
    table: &mut PageTable,
    old_size: usize,
    new_size: usize,
    fa: &dyn FrameAllocator,
) -> usize {
    if new_size >= old_size {
        return old_size;
    }
    let mut a = align_up(new_size);
    while a < align_up(old_size) {
        if let Some(slot) = table.lookup(a) {
            let entry = unsafe { *slot };
            if pte_is_valid(entry) {
                if !pte_is_leaf(entry) {
                    panic!("shrink: va {:#x} not a leaf", a);
                }
                fa.free_frame(unsafe { Frame::from_raw(pte_to_pa(entry)) });
                unsafe { *slot = 0 };
            }
        }
        a += PGSIZE;
    }
    new_size
}

/// Deep-copy `src`'s `[0, size)` into `dst` for fork: fresh frames,
/// byte-identical contents, the source's exact permission flags. `src` is
/// never modified. All-or-nothing: on failure every page this call put into
/// `dst` is unmapped and freed first. A hole in the source range is a
/// kernel bug.
pub fn duplicate(
    src: &PageTable,
    dst: &mut PageTable,
    size: usize,
    fa: &dyn FrameAllocator,
) -> Result<(), UvmError> {
    let mut a = 0;
    while a < size {
        let slot = src
            .lookup(a)
            .unwrap_or_else(|| panic!("duplicate: no table for va {:#x}", a));
        let entry = unsafe { *slot };
        if !pte_is_valid(entry) {
            panic!("duplicate: va {:#x} not mapped", a);
        }
        let pa = pte_to_pa(entry);
        let perm = pte_flags(entry);
        let frame = match fa.allocate_frame() {
            Some(frame) => frame,
            None => {
                dst.unmap_range(0, a / PGSIZE, true, fa);
                return Err(UvmError::NoMem);
            }
        };
        unsafe { ptr::copy_nonoverlapping(pa as *const u8, frame.as_mut_ptr(), PGSIZE) };
        if dst.map_range(a, PGSIZE, frame.addr(), perm, fa).is_err() {
            fa.free_frame(frame);
            dst.unmap_range(0, a / PGSIZE, true, fa);
            return Err(UvmError::MapFailed);
        }
        a += PGSIZE;
    }
    Ok(())
}

/// Release a user address space: every leaf in `[0, size)` with its frame,
/// then the table structure itself.
pub fn free_address_space(root: *mut PageTable, size: usize, fa: &dyn FrameAllocator) {
    let table = unsafe { &mut *root };
    if size > 0 {
        table.unmap_range(0, align_up(size) / PGSIZE, true, fa);
    }
    free_structure(root, fa);
}

fn user_frame(table: &PageTable, va: VirtAddr) -> Result<usize, CopyError> {
    let slot = table.lookup(align_down(va)).ok_or(CopyError::NotMapped)?;
    let entry = unsafe { *slot };
    if !pte_is_valid(entry) || !pte_is_leaf(entry) {
        return Err(CopyError::NotMapped);
    }
    if pte_flags(entry) & PTE_U == 0 {
        return Err(CopyError::NoPerm);
    }
    Ok(pte_to_pa(entry))
}

/// Copy kernel bytes out to `dst_va` in a user space through its table,
/// splitting at page boundaries. Soft-fails at the first page that does not
/// translate; bytes already written stay written.
pub fn copy_out(table: &PageTable, mut dst_va: VirtAddr, src: &[u8]) -> Result<(), CopyError> {
    let mut copied = 0usize;
    while copied < src.len() {
        let pa = user_frame(table, dst_va)?;
        let off = page_offset(dst_va);
        let n = min(PGSIZE - off, src.len() - copied);
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr().add(copied), (pa + off) as *mut u8, n);
        }
        copied += n;
        dst_va += n;
    }
    Ok(())
}

/// Copy exactly `dst.len()` bytes in from `src_va` in a user space. Same
/// per-page soft-failure contract as `copy_out`.
pub fn copy_in(table: &PageTable, dst: &mut [u8], mut src_va: VirtAddr) -> Result<(), CopyError> {
    let mut copied = 0usize;
    while copied < dst.len() {
        let pa = user_frame(table, src_va)?;
        let off = page_offset(src_va);
        let n = min(PGSIZE - off, dst.len() - copied);
        unsafe {
            ptr::copy_nonoverlapping((pa + off) as *const u8, dst.as_mut_ptr().add(copied), n);
        }
        copied += n;
        src_va += n;
    }
    Ok(())
}

/// Copy a NUL-terminated string in from `src_va`, byte by byte, the
/// terminator included, so on success the destination is always terminated.
/// `TooLong` when no terminator shows up within `dst.len()` bytes. Returns
/// the number of bytes copied.
pub fn copy_in_str(
    table: &PageTable,
    dst: &mut [u8],
    mut src_va: VirtAddr,
) -> Result<usize, CopyError> {
    let mut copied = 0usize;
    while copied < dst.len() {
        let pa = user_frame(table, src_va)?;
        let mut off = page_offset(src_va);
        while off < PGSIZE && copied < dst.len() {
            let byte = unsafe { *((pa + off) as *const u8) };
            dst[copied] = byte;
            copied += 1;
            off += 1;
            if byte == 0 {
                return Ok(copied);
            }
        }
        src_va = align_down(src_va) + PGSIZE;
    }
    Err(CopyError::TooLong)
}
