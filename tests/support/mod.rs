//! Shared harness for the database-backed integration tests.
//!
//! Every test in this crate's `tests/` directory needs a real MySQL server
//! with `schema.sql` already applied. Point `MYSQLFS_TEST_DATABASE_URL` at
//! one (e.g. `mysql://root@127.0.0.1:3306/mysqlfs_test`) to run them; they
//! skip themselves otherwise rather than failing a checkout that has no
//! database handy.

use mysql::prelude::Queryable;
use mysql::{Conn, Opts};

pub fn connect() -> Option<Conn> {
    let url = std::env::var("MYSQLFS_TEST_DATABASE_URL").ok()?;
    let opts = Opts::from_url(&url).expect("MYSQLFS_TEST_DATABASE_URL must be a valid mysql:// URL");
    let mut conn = Conn::new(opts).expect("connecting to the test database");
    reset_schema(&mut conn);
    Some(conn)
}

fn reset_schema(conn: &mut Conn) {
    conn.query_drop("DELETE FROM data_blocks").unwrap();
    conn.query_drop("DELETE FROM tree").unwrap();
    conn.query_drop("DELETE FROM inodes").unwrap();

    let now = mysqlfs_rs::fs::stat::now();
    let root_mode = mysqlfs_rs::fs::stat::FileMode::DEFAULT_ROOT_MODE.bits();
    conn.exec_drop(
        "INSERT INTO inodes (inode, mode, uid, gid, ctime, mtime, atime, size, inuse, deleted) \
         VALUES (1, ?, 0, 0, ?, ?, ?, 0, 0, 0)",
        (root_mode, now, now, now),
    )
    .unwrap();
    conn.query_drop("INSERT INTO tree (name, parent, inode) VALUES ('/', NULL, 1)")
        .unwrap();
}

/// Skips the calling test (by returning early) when no test database is
/// configured, printing why.
#[macro_export]
macro_rules! require_db {
    () => {
        match $crate::support::connect() {
            Some(conn) => conn,
            None => {
                eprintln!("skipping: MYSQLFS_TEST_DATABASE_URL not set");
                return;
            }
        }
    };
}
