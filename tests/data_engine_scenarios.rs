//! Read/write/truncate scenarios against a live database.
//!
//! Requires `MYSQLFS_TEST_DATABASE_URL`; see `tests/support/mod.rs`.

mod support;

use mysqlfs_rs::fs::{data, metadata};

#[test]
fn write_then_read_round_trips_the_exact_bytes() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/a", 0o100644, 0, 0).unwrap();
    let written = data::write(&mut conn, inode, b"hello", 0).unwrap();
    assert_eq!(written, 5);

    let mut buf = [0u8; 5];
    let read = data::read(&mut conn, inode, &mut buf, 0).unwrap();
    assert_eq!(read, 5);
    assert_eq!(&buf, b"hello");

    let stat = metadata::getattr(&mut conn, "/a").unwrap();
    assert_eq!(stat.size, 5);
}

#[test]
fn write_past_eof_extends_size_and_pads_the_hole_with_nuls() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/b", 0o100644, 0, 0).unwrap();
    data::write(&mut conn, inode, b"X", 8191).unwrap();

    let stat = metadata::getattr(&mut conn, "/b").unwrap();
    assert_eq!(stat.size, 8192);

    let mut buf = vec![0u8; 8192];
    let read = data::read(&mut conn, inode, &mut buf, 0).unwrap();
    assert_eq!(read, 8192);
    assert!(buf[..8191].iter().all(|&b| b == 0));
    assert_eq!(buf[8191], b'X');
}

#[test]
fn write_of_zero_bytes_changes_nothing() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/zero", 0o100644, 0, 0).unwrap();
    let written = data::write(&mut conn, inode, b"", 0).unwrap();
    assert_eq!(written, 0);

    let stat = metadata::getattr(&mut conn, "/zero").unwrap();
    assert_eq!(stat.size, 0);
}

#[test]
fn truncate_to_zero_then_read_past_it_returns_nothing() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/c", 0o100644, 0, 0).unwrap();
    data::write(&mut conn, inode, b"some content", 0).unwrap();
    data::truncate(&mut conn, inode, 0).unwrap();

    let stat = metadata::getattr(&mut conn, "/c").unwrap();
    assert_eq!(stat.size, 0);

    let mut buf = [0u8; 16];
    let read = data::read(&mut conn, inode, &mut buf, 0).unwrap();
    assert_eq!(read, 0);
}

#[test]
fn truncate_larger_than_current_size_grows_an_implicit_hole() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/d", 0o100644, 0, 0).unwrap();
    data::write(&mut conn, inode, b"hi", 0).unwrap();
    data::truncate(&mut conn, inode, 10).unwrap();

    let stat = metadata::getattr(&mut conn, "/d").unwrap();
    assert_eq!(stat.size, 10);

    let mut buf = [0u8; 10];
    let read = data::read(&mut conn, inode, &mut buf, 0).unwrap();
    assert_eq!(read, 10);
    assert_eq!(&buf[..2], b"hi");
    assert!(buf[2..].iter().all(|&b| b == 0));
}

#[test]
fn write_spanning_a_block_boundary_reassembles_on_read() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/e", 0o100644, 0, 0).unwrap();
    // offset 4095, size 2: one byte in block 0, one byte in block 1.
    data::write(&mut conn, inode, b"AB", 4095).unwrap();

    let mut buf = [0u8; 2];
    let read = data::read(&mut conn, inode, &mut buf, 4095).unwrap();
    assert_eq!(read, 2);
    assert_eq!(&buf, b"AB");
}

#[test]
fn read_continues_past_a_short_interior_block_into_later_blocks() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/f", 0o100644, 0, 0).unwrap();
    // offset 5000 lands mid-block-1, producing a 905-byte row there that
    // never reaches the 4096-byte boundary. A read spanning blocks 0..2
    // must not stop once it hits that short row.
    data::write(&mut conn, inode, b"A", 5000).unwrap();
    data::write(&mut conn, inode, b"Z", 9000).unwrap();

    let mut buf = vec![0u8; 10000];
    let read = data::read(&mut conn, inode, &mut buf, 0).unwrap();
    assert_eq!(read, 10000);
    assert_eq!(buf[5000], b'A');
    assert_eq!(buf[9000], b'Z');
    assert!(buf[..5000].iter().all(|&b| b == 0));
    assert!(buf[5001..9000].iter().all(|&b| b == 0));
    assert!(buf[9001..].iter().all(|&b| b == 0));
}
