//! Memory layout of the target machine, fixed at build time: MMIO windows,
//! the kernel image boundaries, the physical RAM extent and the trampoline
//! slot at the top of the virtual address space.

use super::addr::{PhysAddr, VirtAddr};
use super::pte::{PTE_R, PTE_W, PTE_X};
use super::{MAXVA, PGSIZE};

pub const UART0: PhysAddr = 0x1000_0000;
pub const VIRTIO0: PhysAddr = 0x1000_1000;
pub const CLINT: PhysAddr = 0x0200_0000;
pub const CLINT_SIZE: usize = 0x1_0000;
pub const PLIC: PhysAddr = 0x0c00_0000;
pub const PLIC_SIZE: usize = 0x40_0000;

pub const KERNBASE: PhysAddr = 0x8000_0000;
/// End of kernel code; kernel data and usable RAM follow up to `PHYSTOP`.
pub const KTEXT_END: PhysAddr = KERNBASE + 0x8_0000;
pub const PHYSTOP: PhysAddr = KERNBASE + 128 * 1024 * 1024;

/// Trap entry/exit page, mapped at the highest virtual page of every table.
pub const TRAMPOLINE: VirtAddr = MAXVA - PGSIZE;
/// The trampoline code lives in the last page of the kernel text.
pub const TRAMPOLINE_PA: PhysAddr = KTEXT_END - PGSIZE;

pub struct MapRegion {
    pub name: &'static str,
    pub va: VirtAddr,
    pub pa: PhysAddr,
    pub size: usize,
    pub perm: usize,
}

/// The direct-map set shared by the global kernel table and every
/// per-process kernel table. One list, one builder; the CLINT is mapped
/// separately into the global table only.
pub const KERNEL_REGIONS: [MapRegion; 6] = [
    MapRegion { name: "uart", va: UART0, pa: UART0, size: PGSIZE, perm: PTE_R | PTE_W },
    MapRegion { name: "virtio", va: VIRTIO0, pa: VIRTIO0, size: PGSIZE, perm: PTE_R | PTE_W },
    MapRegion { name: "plic", va: PLIC, pa: PLIC, size: PLIC_SIZE, perm: PTE_R | PTE_W },
    MapRegion {
        name: "text",
        va: KERNBASE,
        pa: KERNBASE,
        size: KTEXT_END - KERNBASE,
        perm: PTE_R | PTE_X,
    },
    MapRegion {
        name: "ram",
        va: KTEXT_END,
        pa: KTEXT_END,
        size: PHYSTOP - KTEXT_END,
        perm: PTE_R | PTE_W,
    },
    MapRegion {
        name: "trampoline",
        va: TRAMPOLINE,
        pa: TRAMPOLINE_PA,
        size: PGSIZE,
        perm: PTE_R | PTE_X,
    },
];
