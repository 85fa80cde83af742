#![allow(dead_code)]

pub type PhysAddr = usize;
pub type VirtAddr = usize;

use super::{PGMASK, PGSIZE};

#[inline(always)]
pub const fn align_up(value: usize) -> usize {
    assert!(PGSIZE.is_power_of_two());
    (value + PGMASK) & !PGMASK
}

#[inline(always)]
pub const fn align_down(value: usize) -> usize {
    assert!(PGSIZE.is_power_of_two());
    value & !PGMASK
}

#[inline(always)]
pub const fn page_offset(addr: VirtAddr) -> usize {
    addr & PGMASK
}

/// The three 9-bit table indices of a virtual address, level 0 first.
#[inline(always)]
pub const fn vpn(addr: VirtAddr) -> [usize; 3] {
    [(addr >> 12) & 0x1FF, (addr >> 21) & 0x1FF, (addr >> 30) & 0x1FF]
}
