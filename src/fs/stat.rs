//! POSIX mode bits and the `stat` result type
//!
//! `inodes.mode` packs the POSIX file-type bits together with permission
//! bits, exactly as `st_mode` does. [`FileMode`] is a thin bitflags wrapper
//! so callers stop passing raw `u32`s around; [`Stat`] is what `getattr`
//! hands back to the dispatcher.

use bitflags::bitflags;
use std::time::{SystemTime, UNIX_EPOCH};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileMode: u32 {
        const S_IFMT   = 0o170000;
        const S_IFREG  = 0o100000;
        const S_IFDIR  = 0o040000;
        const S_IFLNK  = 0o120000;
        const S_IFCHR  = 0o020000;
        const S_IFBLK  = 0o060000;
        const S_IFIFO  = 0o010000;
        const S_IFSOCK = 0o140000;

        const PERM_MASK = 0o007777;
    }
}

impl FileMode {
    pub const DEFAULT_ROOT_MODE: FileMode =
        FileMode::from_bits_truncate(FileMode::S_IFDIR.bits() | 0o755);

    pub fn new(mode: u32) -> Self {
        FileMode::from_bits_truncate(mode)
    }

    pub fn is_dir(&self) -> bool {
        (self.bits() & Self::S_IFMT.bits()) == Self::S_IFDIR.bits()
    }

    pub fn is_regular(&self) -> bool {
        (self.bits() & Self::S_IFMT.bits()) == Self::S_IFREG.bits()
    }

    pub fn is_symlink(&self) -> bool {
        (self.bits() & Self::S_IFMT.bits()) == Self::S_IFLNK.bits()
    }

    pub fn permissions(&self) -> u32 {
        self.bits() & Self::PERM_MASK.bits()
    }
}

/// uid/gid sentinel meaning "leave this column unchanged" in `chown`.
pub const NO_CHANGE: u32 = u32::MAX;

/// Everything `getattr` reports about one inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: u64,
    pub mode: FileMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub ctime: i64,
    pub mtime: i64,
    pub atime: i64,
    pub nlink: u64,
}

/// Current time as seconds since the epoch, the unit every timestamp column
/// in `inodes` uses.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_type_bits_round_trip() {
        let dir = FileMode::new(0o040755);
        assert!(dir.is_dir());
        assert!(!dir.is_regular());
        assert_eq!(dir.permissions(), 0o755);

        let file = FileMode::new(0o100644);
        assert!(file.is_regular());
        assert_eq!(file.permissions(), 0o644);

        let link = FileMode::new(0o120777);
        assert!(link.is_symlink());
    }

    #[test]
    fn default_root_mode_is_a_directory() {
        assert!(FileMode::DEFAULT_ROOT_MODE.is_dir());
        assert_eq!(FileMode::DEFAULT_ROOT_MODE.permissions(), 0o755);
    }

    #[test]
    fn no_change_sentinel_is_all_ones() {
        assert_eq!(NO_CHANGE, u32::MAX);
    }
}
