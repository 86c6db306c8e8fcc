//! Connection pool
//!
//! A LIFO stack of idle `mysql::Conn` sessions behind a single mutex.
//! `acquire` pops the stack or opens a fresh session if it's empty;
//! `release` (via [`PooledConn`]'s `Drop`) pushes back onto the stack unless
//! the idle count is already at the configured ceiling, in which case the
//! session is simply closed. The mutex is never held across a database
//! round-trip — only around the stack push/pop itself.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};

use crate::config::Config;
use crate::error::{FsError, FsResult};
use crate::fs::lifecycle;

/// Oldest MySQL server version this crate has been checked against.
const MIN_SERVER_VERSION: (u32, u32, u32) = (5, 5, 0);

struct Inner {
    idle: Mutex<Vec<Conn>>,
    opts: Opts,
    max_idling_conns: usize,
}

/// Bounded LIFO cache of reusable database sessions.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

/// A session on loan from the pool. Returned to the pool (or closed, past
/// the ceiling) when dropped — every exit path, including early returns and
/// panics during unwind, releases it.
pub struct PooledConn {
    conn: Option<Conn>,
    pool: Pool,
}

impl Deref for PooledConn {
    type Target = Conn;
    fn deref(&self) -> &Conn {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Any type a resolver/metadata/data/lifecycle routine can issue statements
/// against — `mysql::Conn`, a `PooledConn` (via `Deref`), or a test double.
pub trait SqlExecutor: Queryable {}
impl<T: Queryable> SqlExecutor for T {}

/// Connection defaults read out of one `[group]` section of `~/.my.cnf`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MycnfDefaults {
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    socket: Option<String>,
}

/// Parse `~/.my.cnf` and pull out the named `[group]` section's `host`,
/// `user`, `password`, `port`, and `socket` keys. Missing file or missing
/// group both resolve to empty defaults rather than an error — a client
/// that doesn't have one configured simply falls back to the explicit
/// fields, exactly like `MYSQL_READ_DEFAULT_GROUP` does in the C client.
fn read_mycnf_group(group: &str) -> MycnfDefaults {
    let Some(home) = std::env::var_os("HOME") else {
        return MycnfDefaults::default();
    };
    let path = std::path::Path::new(&home).join(".my.cnf");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return MycnfDefaults::default();
    };
    parse_mycnf(&text, group)
}

fn parse_mycnf(text: &str, group: &str) -> MycnfDefaults {
    let mut defaults = MycnfDefaults::default();
    let mut in_group = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            in_group = section == group;
            continue;
        }
        if !in_group {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').to_string();
        match key {
            "host" => defaults.host = Some(value),
            "user" => defaults.user = Some(value),
            "password" => defaults.password = Some(value),
            "port" => defaults.port = value.parse().ok(),
            "socket" => defaults.socket = Some(value),
            _ => {}
        }
    }
    defaults
}

impl Pool {
    fn opts_from_config(config: &Config) -> Opts {
        let mycnf = config
            .mycnf_group
            .as_deref()
            .map(read_mycnf_group)
            .unwrap_or_default();

        let host = mycnf.host.unwrap_or_else(|| config.host.clone());
        let user = mycnf.user.unwrap_or_else(|| config.user.clone());
        let password = mycnf.password.or_else(|| config.password.clone());
        let port = mycnf.port.unwrap_or(config.port);
        let socket = mycnf.socket.or_else(|| config.socket.clone());

        let mut builder = OptsBuilder::new()
            .ip_or_hostname(Some(host))
            .user(Some(user))
            .pass(password)
            .db_name(Some(config.database.clone()))
            .tcp_port(port);

        if let Some(socket) = socket {
            builder = builder.socket(Some(socket));
        }

        Opts::from(builder)
    }

    /// Preallocate `config.init_conns` sessions, verify the server meets the
    /// minimum version, ensure the root tree entry exists, and — if
    /// configured — run `fsck` once before the pool is handed to callers.
    pub fn init(config: &Config) -> FsResult<Self> {
        let opts = Self::opts_from_config(config);
        let mut idle = Vec::with_capacity(config.init_conns);
        for _ in 0..config.init_conns {
            idle.push(Conn::new(opts.clone())?);
        }

        let pool = Pool {
            inner: Arc::new(Inner {
                idle: Mutex::new(idle),
                opts,
                max_idling_conns: config.max_idling_conns,
            }),
        };

        {
            let mut setup_conn = pool.acquire()?;
            check_server_version(&mut setup_conn)?;
            ensure_root_exists(&mut setup_conn)?;
            if config.fsck {
                log::info!("running fsck before mount");
                lifecycle::fsck(&mut *setup_conn)?;
            }
        }

        Ok(pool)
    }

    /// Pop an idle session or open a fresh one. Returns `PoolExhausted` if a
    /// fresh connection can't be opened (translated to EMFILE at the
    /// dispatcher boundary).
    pub fn acquire(&self) -> FsResult<PooledConn> {
        let existing = {
            let mut idle = self.inner.idle.lock().unwrap();
            idle.pop()
        };

        let conn = match existing {
            Some(conn) => conn,
            None => Conn::new(self.inner.opts.clone()).map_err(|_| FsError::PoolExhausted)?,
        };

        Ok(PooledConn {
            conn: Some(conn),
            pool: self.clone(),
        })
    }

    fn release(&self, conn: Conn) {
        let mut idle = self.inner.idle.lock().unwrap();
        if idle.len() < self.inner.max_idling_conns {
            idle.push(conn);
        }
        // else: drop `conn` here, closing the session.
    }

    /// Close every idle session. In-flight `PooledConn`s finish their
    /// operation and are closed individually when dropped, since their
    /// release would otherwise push onto an idle stack nobody will drain.
    pub fn shutdown(&self) {
        let mut idle = self.inner.idle.lock().unwrap();
        idle.clear();
    }
}

fn check_server_version(conn: &mut PooledConn) -> FsResult<()> {
    let version: String = conn
        .query_first("SELECT VERSION()")?
        .unwrap_or_default();
    let parsed = parse_version(&version).unwrap_or((0, 0, 0));
    if parsed < MIN_SERVER_VERSION {
        return Err(FsError::UnsupportedServerVersion {
            found: version,
            minimum: format!(
                "{}.{}.{}",
                MIN_SERVER_VERSION.0, MIN_SERVER_VERSION.1, MIN_SERVER_VERSION.2
            ),
        });
    }
    Ok(())
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split(|c: char| c == '.' || c == '-');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some((major, minor, patch))
}

fn ensure_root_exists(conn: &mut PooledConn) -> FsResult<()> {
    let existing: Option<u64> = conn.exec_first(
        "SELECT inode FROM tree WHERE parent IS NULL LIMIT 1",
        (),
    )?;
    if existing.is_some() {
        return Ok(());
    }

    log::info!("no root directory entry found, creating one");
    let now = crate::fs::stat::now();
    conn.exec_drop(
        "INSERT INTO inodes (mode, uid, gid, ctime, mtime, atime, size, inuse, deleted) \
         VALUES (?, 0, 0, ?, ?, ?, 0, 0, 0)",
        (crate::fs::stat::FileMode::DEFAULT_ROOT_MODE.bits(), now, now, now),
    )?;
    let inode = conn.last_insert_id();
    conn.exec_drop(
        "INSERT INTO tree (name, parent, inode) VALUES ('/', NULL, ?)",
        (inode,),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_handles_typical_mysql_strings() {
        assert_eq!(parse_version("8.0.34"), Some((8, 0, 34)));
        assert_eq!(parse_version("5.7.42-log"), Some((5, 7, 42)));
        assert_eq!(parse_version("10.11.4-MariaDB"), Some((10, 11, 4)));
    }

    #[test]
    fn parse_version_rejects_garbage() {
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("not-a-version"), None);
    }

    #[test]
    fn parse_mycnf_reads_only_the_named_group() {
        let text = "\
[client]
host = client-host
user = client-user

[mysqlfs]
host = fs-host
user = fs-user
password = \"secret\"
port = 3307
socket = /tmp/mysqld.sock
";
        let defaults = parse_mycnf(text, "mysqlfs");
        assert_eq!(defaults.host.as_deref(), Some("fs-host"));
        assert_eq!(defaults.user.as_deref(), Some("fs-user"));
        assert_eq!(defaults.password.as_deref(), Some("secret"));
        assert_eq!(defaults.port, Some(3307));
        assert_eq!(defaults.socket.as_deref(), Some("/tmp/mysqld.sock"));
    }

    #[test]
    fn parse_mycnf_returns_empty_defaults_for_a_missing_group() {
        let text = "[client]\nhost = client-host\n";
        assert_eq!(parse_mycnf(text, "mysqlfs"), MycnfDefaults::default());
    }
}
