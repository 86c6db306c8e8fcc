//! Path resolution
//!
//! Turns a slash-delimited absolute path into an inode id by building one
//! query that joins `tree` against itself once per path component, anchored
//! at the row whose `parent IS NULL` (the root). A path resolves to exactly
//! one row; zero rows means a missing component, more than one means the
//! tree itself is corrupt and is reported as a database error rather than
//! silently picking a row.

use mysql::prelude::Queryable;
use mysql::Row;

use crate::error::{FsError, FsResult};
use crate::pool::SqlExecutor;

/// Longest path this resolver will accept, matching the historical
/// `PATH_MAX` the on-disk format was sized against.
pub const PATH_MAX: usize = 1024;

/// Longest single path component, matching `tree.name`'s column width.
pub const NAME_MAX: usize = 255;

/// The result of resolving a path: its inode, its local (base) name, its
/// parent's inode (`None` only for the root), and its link count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub inode: u64,
    pub name: String,
    pub parent: Option<u64>,
    pub nlinks: u64,
}

fn split_components(path: &str) -> FsResult<Vec<&str>> {
    if path.len() >= PATH_MAX {
        return Err(FsError::NameTooLong);
    }
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    for component in &components {
        if component.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
    }
    Ok(components)
}

/// Resolve `path` (e.g. `"/a/b/c"`) to its entry. `"/"` resolves to the root.
pub fn resolve(conn: &mut impl SqlExecutor, path: &str) -> FsResult<Resolved> {
    let components = split_components(path)?;

    if components.is_empty() {
        // The root itself: the one tree row with parent IS NULL.
        let row: Option<(u64, u64)> = conn.exec_first(
            "SELECT t0.inode, \
                (SELECT COUNT(*) FROM tree WHERE tree.inode = t0.inode) AS nlinks \
             FROM tree t0 WHERE t0.parent IS NULL",
            (),
        )?;
        let (inode, nlinks) = row.ok_or(FsError::NotFound)?;
        return Ok(Resolved {
            inode,
            name: "/".to_string(),
            parent: None,
            nlinks,
        });
    }

    let (query, params) = build_join_query(&components);
    let rows: Vec<Row> = conn.exec(query, params)?;

    match rows.len() {
        0 => Err(FsError::NotFound),
        1 => {
            let mut row = rows.into_iter().next().unwrap();
            let inode: u64 = row.take("inode").expect("projection includes inode");
            let name: String = row.take("name").expect("projection includes name");
            let parent: Option<u64> = row.take("parent").expect("projection includes parent");
            let nlinks: u64 = row.take("nlinks").expect("projection includes nlinks");
            Ok(Resolved {
                inode,
                name,
                parent,
                nlinks,
            })
        }
        _ => Err(FsError::Database(mysql::Error::from(
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "path resolved to more than one row; tree is corrupt",
            ),
        ))),
    }
}

/// Convenience wrapper for callers that only need the inode id.
pub fn inode_of(conn: &mut impl SqlExecutor, path: &str) -> FsResult<u64> {
    resolve(conn, path).map(|r| r.inode)
}

/// Build the self-join query for a non-root path. One alias (`t0`, `t1`,
/// ...) per component, each joined to the next via `parent`, with `t0`
/// pinned to the root row. Names are bound as parameters, never interpolated.
fn build_join_query(components: &[&str]) -> (String, Vec<mysql::Value>) {
    let mut from = String::from("tree t0");
    for i in 1..components.len() {
        from.push_str(&format!(
            " JOIN tree t{cur} ON t{cur}.parent = t{prev}.inode",
            cur = i,
            prev = i - 1
        ));
    }

    let last = components.len() - 1;
    let query = format!(
        "SELECT t{last}.inode AS inode, t{last}.name AS name, t{last}.parent AS parent, \
            (SELECT COUNT(*) FROM tree WHERE tree.inode = t{last}.inode) AS nlinks \
         FROM {from} \
         WHERE t0.parent IS NULL AND {conditions}",
        last = last,
        from = from,
        conditions = (0..components.len())
            .map(|i| format!("t{i}.name = ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    );

    let params = components
        .iter()
        .map(|c| mysql::Value::from(*c))
        .collect();

    (query, params)
}

/// Split a path into `(dirname, basename)`, the way callers of `mknod` and
/// friends need it. `dirname("/a/b")` is `"/a"`; `dirname("/a")` is `"/"`.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_components_ignores_adjacent_slashes() {
        assert_eq!(split_components("/a//b/c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_components("/").unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn split_components_rejects_long_component() {
        let long_name = "x".repeat(NAME_MAX + 1);
        let path = format!("/{long_name}");
        assert!(matches!(split_components(&path), Err(FsError::NameTooLong)));
    }

    #[test]
    fn split_components_rejects_long_path() {
        let long_path = format!("/{}", "a/".repeat(PATH_MAX));
        assert!(matches!(split_components(&long_path), Err(FsError::NameTooLong)));
    }

    #[test]
    fn build_join_query_has_one_alias_per_component() {
        let (query, params) = build_join_query(&["a", "b"]);
        assert!(query.contains("tree t0"));
        assert!(query.contains("JOIN tree t1 ON t1.parent = t0.inode"));
        assert!(query.contains("t0.parent IS NULL"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn split_parent_handles_top_level_and_nested_paths() {
        assert_eq!(split_parent("/a"), ("/", "a"));
        assert_eq!(split_parent("/a/b"), ("/a", "b"));
        assert_eq!(split_parent("/a/b/c"), ("/a/b", "c"));
    }
}
