//! mysqlfs-rs
//!
//! A userspace filesystem that keeps its directory tree, inode metadata, and
//! file contents in a MySQL database instead of on a local disk. The
//! layering, bottom to top: [`block`] (pure block arithmetic), [`fs`] (the
//! operations themselves, each taking anything that can run SQL), [`pool`]
//! (connection lifecycle), [`locks`] (per-inode exclusion), [`dispatcher`]
//! (the path-based operation table a kernel bridge is written against), and
//! [`bridge`] (the `fuser::Filesystem` adapter that's actually mounted).

pub mod block;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fs;
pub mod locks;
pub mod pool;
