//! Kernel bridge adapter
//!
//! The one piece that actually mounts something: a `fuser::Filesystem`
//! implementation translating the kernel's inode-keyed callbacks into calls
//! against the path-keyed [`OperationTable`]. FUSE inode numbers are ours to
//! assign — we hand them out from an atomic counter and keep a bidirectional
//! cache mapping each one back to the path the core understands. This
//! adapter carries no filesystem semantics of its own; every real decision
//! happens in the operation table it wraps.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bimap::BiMap;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};

use crate::dispatcher::OperationTable;
use crate::fs::stat::Stat;

const ROOT_INO: u64 = 1;
const TTL: Duration = Duration::from_secs(1);

/// Bidirectional ino↔path cache, plus the counter handing out fresh inos.
struct DentryCache {
    entries: BiMap<u64, String>,
    next_ino: AtomicU64,
}

impl DentryCache {
    fn new() -> Self {
        let mut entries = BiMap::new();
        entries.insert(ROOT_INO, "/".to_string());
        Self {
            entries,
            next_ino: AtomicU64::new(ROOT_INO + 1),
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.entries.get_by_left(&ino).cloned()
    }

    fn ino_of(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.entries.get_by_right(path) {
            return *ino;
        }
        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(ino, path.to_string());
        ino
    }

    fn forget(&mut self, path: &str) {
        self.entries.remove_by_right(path);
    }
}

/// A `fuser::Filesystem` over the path-based operation table.
pub struct Bridge {
    ops: OperationTable,
    cache: Mutex<DentryCache>,
}

impl Bridge {
    pub fn new(ops: OperationTable) -> Self {
        Self {
            ops,
            cache: Mutex::new(DentryCache::new()),
        }
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let cache = self.cache.lock().unwrap();
        let parent_path = cache.path_of(parent)?;
        let name = name.to_str()?;
        Some(if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        })
    }

    fn ino_for(&self, path: &str) -> u64 {
        self.cache.lock().unwrap().ino_of(path)
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.cache.lock().unwrap().path_of(ino)
    }

    fn attr_from_stat(ino: u64, stat: &Stat) -> FileAttr {
        let kind = if stat.mode.is_dir() {
            FileType::Directory
        } else if stat.mode.is_symlink() {
            FileType::Symlink
        } else {
            FileType::RegularFile
        };

        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: epoch_to_systemtime(stat.atime),
            mtime: epoch_to_systemtime(stat.mtime),
            ctime: epoch_to_systemtime(stat.ctime),
            crtime: epoch_to_systemtime(stat.ctime),
            kind,
            perm: stat.mode.permissions() as u16,
            nlink: stat.nlink as u32,
            uid: stat.uid,
            gid: stat.gid,
            rdev: 0,
            blksize: crate::block::BLOCK_SIZE as u32,
            flags: 0,
        }
    }
}

fn epoch_to_systemtime(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}

impl Filesystem for Bridge {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.getattr(&path) {
            Ok(stat) => {
                let ino = self.ino_for(&path);
                reply.entry(&TTL, &Self::attr_from_stat(ino, &stat), 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.getattr(&path) {
            Ok(stat) => reply.attr(&TTL, &Self::attr_from_stat(ino, &stat)),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(mode) = mode {
            if let Err(err) = self.ops.chmod(&path, mode) {
                reply.error(err.to_errno());
                return;
            }
        }
        if uid.is_some() || gid.is_some() {
            let uid = uid.unwrap_or(crate::fs::stat::NO_CHANGE);
            let gid = gid.unwrap_or(crate::fs::stat::NO_CHANGE);
            if let Err(err) = self.ops.chown(&path, uid, gid) {
                reply.error(err.to_errno());
                return;
            }
        }
        if let Some(size) = size {
            if let Err(err) = self.ops.truncate(&path, size) {
                reply.error(err.to_errno());
                return;
            }
        }

        match self.ops.getattr(&path) {
            Ok(stat) => reply.attr(&TTL, &Self::attr_from_stat(ino, &stat)),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.readlink(&path, crate::fs::path::PATH_MAX) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.mknod(&path, mode, req.uid(), req.gid()) {
            Ok(_) => match self.ops.getattr(&path) {
                Ok(stat) => {
                    let ino = self.ino_for(&path);
                    reply.entry(&TTL, &Self::attr_from_stat(ino, &stat), 0);
                }
                Err(err) => reply.error(err.to_errno()),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn mkdir(&mut self, req: &Request, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.mkdir(&path, mode, req.uid(), req.gid()) {
            Ok(_) => match self.ops.getattr(&path) {
                Ok(stat) => {
                    let ino = self.ino_for(&path);
                    reply.entry(&TTL, &Self::attr_from_stat(ino, &stat), 0);
                }
                Err(err) => reply.error(err.to_errno()),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.unlink(&path) {
            Ok(()) => {
                self.cache.lock().unwrap().forget(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn rmdir(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.unlink(req, parent, name, reply);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(from), Some(to)) = (self.child_path(parent, name), self.child_path(newparent, newname)) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.rename(&from, &to) {
            Ok(()) => {
                let mut cache = self.cache.lock().unwrap();
                cache.forget(&from);
                cache.forget(&to);
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn link(&mut self, _req: &Request, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
        let (Some(from), Some(to)) = (self.path_for(ino), self.child_path(newparent, newname)) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.link(&from, &to) {
            Ok(()) => match self.ops.getattr(&to) {
                Ok(stat) => {
                    let to_ino = self.ino_for(&to);
                    reply.entry(&TTL, &Self::attr_from_stat(to_ino, &stat), 0);
                }
                Err(err) => reply.error(err.to_errno()),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn symlink(&mut self, req: &Request, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, link_name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(target) = target.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.symlink(target, &path, req.uid(), req.gid()) {
            Ok(()) => match self.ops.getattr(&path) {
                Ok(stat) => {
                    let ino = self.ino_for(&path);
                    reply.entry(&TTL, &Self::attr_from_stat(ino, &stat), 0);
                }
                Err(err) => reply.error(err.to_errno()),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.ops.open(&path) {
            Ok(handle) => reply.opened(handle, 0),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.ops.release(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut buf = vec![0u8; size as usize];
        match self.ops.read(fh, &mut buf, offset as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.ops.write(fh, data, offset as u64) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.ops.readdir(&path) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(err.to_errno());
                return;
            }
        };

        let mut all = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let child_path = if path == "/" {
                format!("/{}", entry.name)
            } else {
                format!("{path}/{}", entry.name)
            };
            let child_ino = self.ino_for(&child_path);
            let kind = if entry.mode.is_dir() {
                FileType::Directory
            } else if entry.mode.is_symlink() {
                FileType::Symlink
            } else {
                FileType::RegularFile
            };
            all.push((child_ino, kind, entry.name));
        }

        for (i, (ino, kind, name)) in all.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preloaded_at_ino_one() {
        let cache = DentryCache::new();
        assert_eq!(cache.path_of(ROOT_INO).as_deref(), Some("/"));
    }

    #[test]
    fn ino_of_is_stable_across_repeated_lookups() {
        let mut cache = DentryCache::new();
        let first = cache.ino_of("/a");
        let second = cache.ino_of("/a");
        assert_eq!(first, second);
        assert_ne!(first, ROOT_INO);
    }

    #[test]
    fn distinct_paths_get_distinct_inos() {
        let mut cache = DentryCache::new();
        let a = cache.ino_of("/a");
        let b = cache.ino_of("/b");
        assert_ne!(a, b);
    }

    #[test]
    fn forget_allows_the_path_to_be_reassigned_a_fresh_ino() {
        let mut cache = DentryCache::new();
        let original = cache.ino_of("/a");
        cache.forget("/a");
        assert!(cache.path_of(original).is_none());

        let reassigned = cache.ino_of("/a");
        assert_ne!(reassigned, original);
    }

    #[test]
    fn attr_from_stat_maps_directory_mode_to_directory_kind() {
        let stat = Stat {
            inode: 5,
            mode: crate::fs::stat::FileMode::DEFAULT_ROOT_MODE,
            uid: 0,
            gid: 0,
            size: 0,
            ctime: 0,
            mtime: 0,
            atime: 0,
            nlink: 2,
        };
        let attr = Bridge::attr_from_stat(5, &stat);
        assert_eq!(attr.ino, 5);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
    }
}
