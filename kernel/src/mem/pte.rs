use super::PhysAddr;

/// One page-table slot: `ppn << 10 | flags`. Valid with none of R/W/X set is
/// an internal node pointing at the next-level table; valid with any of them
/// is a leaf pointing at data.
pub type Pte = usize;

pub const PTE_V: usize = 1 << 0;
pub const PTE_R: usize = 1 << 1;
pub const PTE_W: usize = 1 << 2;
pub const PTE_X: usize = 1 << 3;
pub const PTE_U: usize = 1 << 4;
pub const PTE_G: usize = 1 << 5;
pub const PTE_A: usize = 1 << 6;
pub const PTE_D: usize = 1 << 7;

pub const PTE_FLAGS_MASK: usize = 0x3FF;

#[inline(always)]
pub const fn pa_to_pte(pa: PhysAddr, flags: usize) -> Pte {
    ((pa >> 12) << 10) | (flags & PTE_FLAGS_MASK)
}

#[inline(always)]
pub const fn pte_to_pa(pte: Pte) -> PhysAddr {
    (pte >> 10) << 12
}

#[inline(always)]
pub const fn pte_flags(pte: Pte) -> usize {
    pte & PTE_FLAGS_MASK
}

#[inline(always)]
pub const fn pte_is_valid(pte: Pte) -> bool {
    pte & PTE_V != 0
}

#[inline(always)]
pub const fn pte_is_leaf(pte: Pte) -> bool {
    pte & (PTE_R | PTE_W | PTE_X) != 0
}

#[inline(always)]
pub const fn pte_is_table(pte: Pte) -> bool {
    pte_is_valid(pte) && !pte_is_leaf(pte)
}
