//! Lifecycle manager
//!
//! `open`/`release` reference counting, `unlink` with deferred purge once
//! `inuse` drops to zero, and the offline `fsck` consistency pass.

use mysql::prelude::Queryable;

use crate::error::{FsError, FsResult};
use crate::fs::path;
use crate::pool::SqlExecutor;

/// Resolve `path_str` and bump its `inuse` counter. The inode id doubles as
/// the opaque file handle handed back to the kernel bridge.
pub fn open(conn: &mut impl SqlExecutor, path_str: &str) -> FsResult<u64> {
    let resolved = path::resolve(conn, path_str)?;
    conn.exec_drop(
        "UPDATE inodes SET inuse = inuse + 1 WHERE inode = ?",
        (resolved.inode,),
    )?;
    Ok(resolved.inode)
}

/// Decrement `inuse` (never below zero) and attempt a purge.
pub fn release(conn: &mut impl SqlExecutor, inode: u64) -> FsResult<()> {
    conn.exec_drop(
        "UPDATE inodes SET inuse = GREATEST(inuse - 1, 0) WHERE inode = ?",
        (inode,),
    )?;
    purge(conn, inode)
}

/// Remove the directory entry naming `path_str`. Fails with `NotEmpty` if
/// the target is a non-empty directory. Sets `deleted` and attempts a purge
/// once the last name referencing the inode is gone.
pub fn unlink(conn: &mut impl SqlExecutor, path_str: &str) -> FsResult<()> {
    let resolved = path::resolve(conn, path_str)?;

    let has_children: Option<u64> = conn.exec_first(
        "SELECT inode FROM tree WHERE parent = ? LIMIT 1",
        (resolved.inode,),
    )?;
    if has_children.is_some() {
        return Err(FsError::NotEmpty);
    }

    conn.exec_drop(
        "DELETE FROM tree WHERE name = ? AND parent <=> ?",
        (&resolved.name, resolved.parent),
    )?;

    if resolved.nlinks > 1 {
        return Ok(());
    }

    set_deleted_if_unreferenced(conn, resolved.inode)?;
    purge(conn, resolved.inode)
}

fn set_deleted_if_unreferenced(conn: &mut impl SqlExecutor, inode: u64) -> FsResult<()> {
    conn.exec_drop(
        "UPDATE inodes \
         LEFT JOIN tree ON tree.inode = inodes.inode \
         SET inodes.deleted = 1 \
         WHERE inodes.inode = ? AND tree.name IS NULL",
        (inode,),
    )?;
    Ok(())
}

/// Idempotent: deletes the inode row only once `inuse` has returned to zero
/// and `deleted` is set. Concurrent openers racing this still hold a
/// positive `inuse` and simply block the purge until they release.
pub fn purge(conn: &mut impl SqlExecutor, inode: u64) -> FsResult<()> {
    conn.exec_drop(
        "DELETE FROM inodes WHERE inode = ? AND inuse = 0 AND deleted = 1",
        (inode,),
    )?;
    Ok(())
}

/// Offline consistency pass, run once at startup when configured, or as a
/// standalone diagnostic. Idempotent: running it twice is a no-op the
/// second time.
pub fn fsck(conn: &mut impl SqlExecutor) -> FsResult<()> {
    conn.query_drop("DELETE FROM inodes WHERE deleted = 1")?;

    conn.query_drop(
        "DELETE tree FROM tree \
         LEFT JOIN inodes ON inodes.inode = tree.inode \
         WHERE inodes.inode IS NULL",
    )?;

    conn.query_drop("UPDATE inodes SET inuse = 0")?;

    conn.query_drop(
        "DELETE data_blocks FROM data_blocks \
         LEFT JOIN inodes ON inodes.inode = data_blocks.inode \
         WHERE inodes.inode IS NULL",
    )?;

    conn.query_drop(
        "UPDATE inodes \
         LEFT JOIN (SELECT inode, SUM(OCTET_LENGTH(data)) AS total FROM data_blocks GROUP BY inode) sizes \
         ON sizes.inode = inodes.inode \
         SET inodes.size = COALESCE(sizes.total, 0)",
    )?;

    Ok(())
}

// Every routine here issues SQL directly against the schema; scenarios like
// unlink-while-open, non-empty-directory rejection, and double release are
// exercised with a live server in tests/lifecycle_scenarios.rs rather than
// mocked here.
