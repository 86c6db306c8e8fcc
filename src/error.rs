//! Error kinds and their POSIX errno mapping
//!
//! Every fallible operation in the core returns `FsResult<T>`. The
//! dispatcher and the FUSE bridge are the only places that ever call
//! [`FsError::to_errno`] — everything upstream of that boundary works with
//! the typed enum.

use thiserror::Error;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("path or component name too long")]
    NameTooLong,

    #[error("directory not empty")]
    NotEmpty,

    #[error("file exists")]
    Exists,

    #[error("database error: {0}")]
    Database(#[from] mysql::Error),

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("server version {found} is older than the minimum supported {minimum}")]
    UnsupportedServerVersion { found: String, minimum: String },

    /// Internal sentinel raised by the block probe in `write_one_block` when
    /// a row doesn't exist yet. Always caught inside the data engine; never
    /// returned from a public operation.
    #[error("no such block (internal)")]
    NoSuchBlock,

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid argument")]
    InvalidArgument,
}

impl FsError {
    /// Map to a negative-free POSIX errno, as returned by the operation
    /// table and surfaced through the FUSE bridge.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::Exists => libc::EEXIST,
            FsError::Database(err) => {
                log::error!("database error: {err}");
                libc::EIO
            }
            FsError::PoolExhausted => libc::EMFILE,
            FsError::UnsupportedServerVersion { .. } => {
                log::error!("{self}");
                libc::ENOENT
            }
            FsError::NoSuchBlock => libc::ENXIO,
            FsError::OutOfMemory => libc::ENOMEM,
            FsError::InvalidArgument => libc::EINVAL,
        }
    }
}
