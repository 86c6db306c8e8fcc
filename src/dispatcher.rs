//! FS dispatcher
//!
//! The operation table a kernel bridge is written against: one method per
//! POSIX call, each acquiring a pooled session, delegating to the
//! resolver/metadata/data/lifecycle routine, and releasing the session on
//! every exit path — including the error ones, since [`PooledConn::drop`]
//! does that regardless of how the method returns.

use crate::error::FsResult;
use crate::fs::metadata::DirEntry;
use crate::fs::stat::Stat;
use crate::fs::{data, lifecycle, metadata};
use crate::locks::InodeLocks;
use crate::pool::Pool;

/// Presents the path-based operation table to a kernel bridge. Holds the
/// connection pool and the per-inode lock table; stateless beyond that.
pub struct OperationTable {
    pool: Pool,
    locks: InodeLocks,
}

impl OperationTable {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            locks: InodeLocks::new(),
        }
    }

    pub fn getattr(&self, path: &str) -> FsResult<Stat> {
        let mut conn = self.pool.acquire()?;
        metadata::getattr(&mut *conn, path)
    }

    pub fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let mut conn = self.pool.acquire()?;
        let inode = crate::fs::path::inode_of(&mut *conn, path)?;
        metadata::readdir(&mut *conn, inode)
    }

    pub fn mknod(&self, path: &str, mode: u32, uid: u32, gid: u32) -> FsResult<u64> {
        let mut conn = self.pool.acquire()?;
        metadata::mknod(&mut *conn, path, mode, uid, gid)
    }

    pub fn mkdir(&self, path: &str, mode: u32, uid: u32, gid: u32) -> FsResult<u64> {
        let mut conn = self.pool.acquire()?;
        metadata::mkdir(&mut *conn, path, mode, uid, gid)
    }

    /// Also serves as `rmdir` — both resolve to the same unlink/non-empty
    /// semantics at the directory-entry level.
    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        lifecycle::unlink(&mut *conn, path)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        let inode = crate::fs::path::inode_of(&mut *conn, path)?;
        metadata::chmod(&mut *conn, inode, mode)
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        let inode = crate::fs::path::inode_of(&mut *conn, path)?;
        metadata::chown(&mut *conn, inode, uid, gid)
    }

    pub fn truncate(&self, path: &str, length: u64) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        let inode = crate::fs::path::inode_of(&mut *conn, path)?;
        self.locks.with_lock(inode, || data::truncate(&mut *conn, inode, length))
    }

    pub fn utime(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        let inode = crate::fs::path::inode_of(&mut *conn, path)?;
        metadata::utime(&mut *conn, inode, atime, mtime)
    }

    pub fn open(&self, path: &str) -> FsResult<u64> {
        let mut conn = self.pool.acquire()?;
        lifecycle::open(&mut *conn, path)
    }

    pub fn release(&self, inode: u64) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        let result = lifecycle::release(&mut *conn, inode);
        self.locks.reap();
        result
    }

    pub fn read(&self, inode: u64, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let mut conn = self.pool.acquire()?;
        data::read(&mut *conn, inode, buf, offset)
    }

    pub fn write(&self, inode: u64, buf: &[u8], offset: u64) -> FsResult<usize> {
        let mut conn = self.pool.acquire()?;
        self.locks.with_lock(inode, || data::write(&mut *conn, inode, buf, offset))
    }

    pub fn link(&self, from: &str, to: &str) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        metadata::link(&mut *conn, from, to)
    }

    pub fn symlink(&self, target: &str, link_path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        metadata::symlink(&mut *conn, target, link_path, uid, gid)
    }

    pub fn readlink(&self, path: &str, size: usize) -> FsResult<Vec<u8>> {
        let mut conn = self.pool.acquire()?;
        metadata::readlink(&mut *conn, path, size)
    }

    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let mut conn = self.pool.acquire()?;
        metadata::rename(&mut *conn, from, to)
    }
}
