//! Metadata operations
//!
//! `getattr`, the permission/ownership/time setters, directory-entry
//! creation and removal helpers used by `mknod`/`mkdir`/`link`/`symlink`,
//! `readdir`, and `rename`. Each resolves its target through [`super::path`]
//! and then issues a single UPDATE or INSERT.

use mysql::prelude::Queryable;
use mysql::Row;

use crate::error::{FsError, FsResult};
use crate::fs::data;
use crate::fs::lifecycle;
use crate::fs::path::{self, Resolved};
use crate::fs::stat::{now, FileMode, Stat, NO_CHANGE};
use crate::pool::SqlExecutor;

pub fn getattr(conn: &mut impl SqlExecutor, path_str: &str) -> FsResult<Stat> {
    let resolved = path::resolve(conn, path_str)?;
    load_stat(conn, &resolved)
}

fn load_stat(conn: &mut impl SqlExecutor, resolved: &Resolved) -> FsResult<Stat> {
    let row: Option<(u32, u32, u32, u64, i64, i64, i64)> = conn.exec_first(
        "SELECT mode, uid, gid, size, ctime, mtime, atime FROM inodes WHERE inode = ?",
        (resolved.inode,),
    )?;
    let (mode, uid, gid, size, ctime, mtime, atime) = row.ok_or(FsError::NotFound)?;
    Ok(Stat {
        inode: resolved.inode,
        mode: FileMode::new(mode),
        uid,
        gid,
        size,
        ctime,
        mtime,
        atime,
        nlink: resolved.nlinks,
    })
}

pub fn chmod(conn: &mut impl SqlExecutor, inode: u64, mode_bits: u32) -> FsResult<()> {
    conn.exec_drop(
        "UPDATE inodes SET mode = (mode & ~?) | (? & ?), ctime = ? WHERE inode = ?",
        (
            FileMode::PERM_MASK.bits(),
            mode_bits,
            FileMode::PERM_MASK.bits(),
            now(),
            inode,
        ),
    )?;
    Ok(())
}

pub fn chown(conn: &mut impl SqlExecutor, inode: u64, uid: u32, gid: u32) -> FsResult<()> {
    match (uid == NO_CHANGE, gid == NO_CHANGE) {
        (true, true) => {}
        (false, true) => {
            conn.exec_drop(
                "UPDATE inodes SET uid = ?, ctime = ? WHERE inode = ?",
                (uid, now(), inode),
            )?;
        }
        (true, false) => {
            conn.exec_drop(
                "UPDATE inodes SET gid = ?, ctime = ? WHERE inode = ?",
                (gid, now(), inode),
            )?;
        }
        (false, false) => {
            conn.exec_drop(
                "UPDATE inodes SET uid = ?, gid = ?, ctime = ? WHERE inode = ?",
                (uid, gid, now(), inode),
            )?;
        }
    }
    Ok(())
}

pub fn utime(conn: &mut impl SqlExecutor, inode: u64, atime: i64, mtime: i64) -> FsResult<()> {
    conn.exec_drop(
        "UPDATE inodes SET atime = ?, mtime = ? WHERE inode = ?",
        (atime, mtime, inode),
    )?;
    Ok(())
}

/// Create a new `tree` row under `parent` plus its backing `inodes` row.
/// Shared by `mknod` and `mkdir` (the latter just ORs in `S_IFDIR`).
pub fn mknod(
    conn: &mut impl SqlExecutor,
    path_str: &str,
    mode_bits: u32,
    uid: u32,
    gid: u32,
) -> FsResult<u64> {
    let (dir, base) = path::split_parent(path_str);
    if base.len() > path::NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    let parent = path::inode_of(conn, dir)?;

    let t = now();
    conn.exec_drop(
        "INSERT INTO inodes (mode, uid, gid, ctime, mtime, atime, size, inuse, deleted) \
         VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0)",
        (mode_bits, uid, gid, t, t, t),
    )?;
    let inode = conn.last_insert_id();

    conn.exec_drop(
        "INSERT INTO tree (name, parent, inode) VALUES (?, ?, ?)",
        (base, parent, inode),
    )?;

    Ok(inode)
}

pub fn mkdir(conn: &mut impl SqlExecutor, path_str: &str, mode_bits: u32, uid: u32, gid: u32) -> FsResult<u64> {
    mknod(conn, path_str, mode_bits | FileMode::S_IFDIR.bits(), uid, gid)
}

pub fn link(conn: &mut impl SqlExecutor, from: &str, to: &str) -> FsResult<()> {
    let source = path::resolve(conn, from)?;
    let (to_dir, to_base) = path::split_parent(to);
    if to_base.len() > path::NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    let to_parent = path::inode_of(conn, to_dir)?;

    conn.exec_drop(
        "INSERT INTO tree (name, parent, inode) VALUES (?, ?, ?)",
        (to_base, to_parent, source.inode),
    )?;
    Ok(())
}

pub fn symlink(conn: &mut impl SqlExecutor, target: &str, link_path: &str, uid: u32, gid: u32) -> FsResult<()> {
    let inode = mknod(conn, link_path, FileMode::S_IFLNK.bits() | 0o755, uid, gid)?;
    data::write(conn, inode, target.as_bytes(), 0)?;
    Ok(())
}

pub fn readlink(conn: &mut impl SqlExecutor, path_str: &str, size: usize) -> FsResult<Vec<u8>> {
    let resolved = path::resolve(conn, path_str)?;
    let mut buf = vec![0u8; size];
    let n = data::read(conn, resolved.inode, &mut buf, 0)?;
    buf.truncate(n);
    Ok(buf)
}

/// One directory entry, as handed to the bridge-supplied filler callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode: u64,
    pub mode: FileMode,
}

pub fn readdir(conn: &mut impl SqlExecutor, parent_inode: u64) -> FsResult<Vec<DirEntry>> {
    let rows: Vec<Row> = conn.exec(
        "SELECT tree.name AS name, tree.inode AS inode, inodes.mode AS mode \
         FROM tree JOIN inodes ON inodes.inode = tree.inode \
         WHERE tree.parent = ?",
        (parent_inode,),
    )?;

    let mut entries = Vec::with_capacity(rows.len());
    for mut row in rows {
        let name: String = row.take("name").expect("projection includes name");
        let inode: u64 = row.take("inode").expect("projection includes inode");
        let mode: u32 = row.take("mode").expect("projection includes mode");
        entries.push(DirEntry {
            name,
            inode,
            mode: FileMode::new(mode),
        });
    }
    Ok(entries)
}

fn is_directory(conn: &mut impl SqlExecutor, inode: u64) -> FsResult<bool> {
    let mode: Option<u32> = conn.exec_first("SELECT mode FROM inodes WHERE inode = ?", (inode,))?;
    Ok(mode.map(FileMode::new).is_some_and(|m| m.is_dir()))
}

/// Unlink the destination (if any) and re-parent the source entry, wrapped
/// in a single transaction so a failure partway through never leaves the
/// tree half-renamed.
pub fn rename(conn: &mut mysql::Conn, from: &str, to: &str) -> FsResult<()> {
    if from == to {
        return Ok(());
    }

    let mut tx = conn.start_transaction(mysql::TxOpts::default())?;

    if let Ok(existing) = path::resolve(&mut tx, to) {
        if is_directory(&mut tx, existing.inode)? {
            return Err(FsError::Exists);
        }
        lifecycle::unlink(&mut tx, to)?;
    }

    let source = path::resolve(&mut tx, from)?;
    let (to_dir, to_base) = path::split_parent(to);
    let to_parent = path::inode_of(&mut tx, to_dir)?;

    tx.exec_drop(
        "UPDATE tree SET name = ?, parent = ? WHERE name = ? AND parent = ?",
        (to_base, to_parent, source.name, source.parent),
    )?;

    tx.commit()?;
    Ok(())
}
