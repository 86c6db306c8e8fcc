//! Per-inode mutex table
//!
//! `write`'s block loop and `truncate`'s delete-then-pad sequence both issue
//! several statements that must appear atomic to other callers touching the
//! same inode. The database gives us no cross-statement exclusion on its
//! own, so this table hands out one `Mutex<()>` per inode id, created on
//! first use and dropped once nobody holds a strong reference to it anymore.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Lazily-allocated, weak-referenced table of per-inode mutexes.
#[derive(Default)]
pub struct InodeLocks {
    table: Mutex<HashMap<u64, Weak<Mutex<()>>>>,
}

impl InodeLocks {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` with exclusive access to `inode`'s multi-statement sequence.
    /// Blocks until any other in-flight sequence for the same inode finishes.
    pub fn with_lock<T>(&self, inode: u64, f: impl FnOnce() -> T) -> T {
        let mutex = self.mutex_for(inode);
        let _guard = mutex.lock().unwrap();
        f()
    }

    fn mutex_for(&self, inode: u64) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap();
        match table.get(&inode).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                let fresh = Arc::new(Mutex::new(()));
                table.insert(inode, Arc::downgrade(&fresh));
                fresh
            }
        }
    }

    /// Drop dead weak entries. Not required for correctness (an entry with
    /// no live strong reference is simply recreated on next use), but keeps
    /// the table from growing without bound across a long-running mount.
    pub fn reap(&self) {
        let mut table = self.table.lock().unwrap();
        table.retain(|_, weak| weak.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn serializes_access_to_the_same_inode() {
        let locks = Arc::new(InodeLocks::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                locks.with_lock(42, || {
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(before, 0, "overlapping access to the same inode");
                    counter.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn different_inodes_do_not_contend() {
        let locks = InodeLocks::new();
        locks.with_lock(1, || {
            locks.with_lock(2, || {}); // must not deadlock
        });
    }

    #[test]
    fn reap_drops_entries_with_no_live_reference() {
        let locks = InodeLocks::new();
        locks.with_lock(7, || {});
        locks.reap();
        assert!(locks.table.lock().unwrap().get(&7).is_none());
    }
}
