//! Virtual-memory subsystem of a small Sv39 teaching kernel: page tables and
//! the walk primitive, kernel/user address-space construction, mapping and
//! size-changing operations, structural copies for fork and for per-process
//! kernel tables, and byte transfer across the kernel/user boundary.
//!
//! Process management, trap handling, the ELF loader and the file system are
//! external collaborators; the only resource consumed here is the physical
//! frame pool.

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod printk;

pub mod mem;

#[cfg(test)]
mod tests;
