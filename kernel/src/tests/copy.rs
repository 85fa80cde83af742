use super::support::{new_table, page_ptr, pool};
use crate::mem::pmem::FrameAllocator;
use crate::mem::pte::{PTE_R, PTE_W};
use crate::mem::uvm::{self, CopyError};
use crate::mem::PGSIZE;

#[test]
fn copy_out_splits_at_a_page_boundary() {
    let fa = pool();
    let root = new_table();
    let table = unsafe { &mut *root };
    let size = uvm::grow(table, 0, 2 * PGSIZE, fa);
    assert_eq!(size, 2 * PGSIZE);

    let payload: Vec<u8> = (1..=20).collect();
    let dst_va = PGSIZE - 6;
    uvm::copy_out(table, dst_va, &payload).unwrap();

    // 6 bytes land at the tail of the first frame, 14 at the head of the next
    let first = page_ptr(table, 0);
    let second = page_ptr(table, PGSIZE);
    for i in 0..6 {
        assert_eq!(unsafe { first.add(PGSIZE - 6 + i).read() }, payload[i]);
    }
    for i in 0..14 {
        assert_eq!(unsafe { second.add(i).read() }, payload[6 + i]);
    }

    let mut readback = [0u8; 20];
    uvm::copy_in(table, &mut readback, dst_va).unwrap();
    assert_eq!(readback, payload[..]);

    uvm::free_address_space(root, size, fa);
}

#[test]
fn copy_out_stops_at_the_first_unmapped_page() {
    let fa = pool();
    let root = new_table();
    let table = unsafe { &mut *root };
    let size = uvm::grow(table, 0, PGSIZE, fa);

    let payload = [0xabu8; 32];
    let dst_va = PGSIZE - 16;
    assert_eq!(uvm::copy_out(table, dst_va, &payload), Err(CopyError::NotMapped));

    // the bytes that fit the mapped page were already written
    let first = page_ptr(table, 0);
    assert_eq!(unsafe { first.add(PGSIZE - 16).read() }, 0xab);
    assert_eq!(unsafe { first.add(PGSIZE - 1).read() }, 0xab);

    uvm::free_address_space(root, size, fa);
}

#[test]
fn copy_in_rejects_kernel_only_pages() {
    let fa = pool();
    let root = new_table();
    let table = unsafe { &mut *root };

    let frame = fa.allocate_frame().unwrap();
    table
        .map_range(0, PGSIZE, frame.addr(), PTE_R | PTE_W, fa)
        .unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(uvm::copy_in(table, &mut buf, 0), Err(CopyError::NoPerm));
    assert!(table.walkaddr(0).is_none(), "walkaddr refuses kernel-only pages too");

    uvm::free_address_space(root, PGSIZE, fa);
}

#[test]
fn copy_in_str_takes_the_terminator() {
    let fa = pool();
    let root = new_table();
    let table = unsafe { &mut *root };
    let size = uvm::grow(table, 0, PGSIZE, fa);

    uvm::copy_out(table, 16, b"hi\0").unwrap();

    let mut buf = [0xffu8; 8];
    assert_eq!(uvm::copy_in_str(table, &mut buf, 16), Ok(3));
    assert_eq!(&buf[..3], b"hi\0");
    assert_eq!(buf[3], 0xff, "bytes past the terminator are untouched");

    uvm::free_address_space(root, size, fa);
}

#[test]
fn copy_in_str_without_a_terminator_is_too_long() {
    let fa = pool();
    let root = new_table();
    let table = unsafe { &mut *root };
    let size = uvm::grow(table, 0, PGSIZE, fa);

    uvm::copy_out(table, 0, &[b'x'; 10]).unwrap();

    let mut buf = [0u8; 10];
    assert_eq!(uvm::copy_in_str(table, &mut buf, 0), Err(CopyError::TooLong));

    uvm::free_address_space(root, size, fa);
}

#[test]
fn copy_in_str_spans_pages() {
    let fa = pool();
    let root = new_table();
    let table = unsafe { &mut *root };
    let size = uvm::grow(table, 0, 2 * PGSIZE, fa);

    uvm::copy_out(table, PGSIZE - 2, b"ab").unwrap();
    uvm::copy_out(table, PGSIZE, b"cd\0").unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(uvm::copy_in_str(table, &mut buf, PGSIZE - 2), Ok(5));
    assert_eq!(&buf[..5], b"abcd\0");

    uvm::free_address_space(root, size, fa);
}
