//! Data engine
//!
//! `read`, `write`, and `truncate` over the fixed-size `data_blocks` rows
//! addressed by [`crate::block::split`]. Missing blocks read back as zeros
//! (sparse files); writes only ever touch the blocks the range actually
//! spans, and never grow `inodes.size` by less than the write actually
//! extended the file.

use mysql::prelude::Queryable;
use mysql::Row;

use crate::block::{self, BLOCK_SIZE};
use crate::error::FsResult;
use crate::pool::SqlExecutor;

/// `read(inode, buf, size=buf.len(), offset)`. Returns bytes actually
/// copied into `buf`, which can be less than `buf.len()` at EOF.
pub fn read(conn: &mut impl SqlExecutor, inode: u64, buf: &mut [u8], offset: u64) -> FsResult<usize> {
    let size = buf.len() as u64;
    if size == 0 {
        return Ok(0);
    }
    let span = block::split(offset, size);

    let rows: Vec<Row> = conn.exec(
        "SELECT seq, data FROM data_blocks WHERE inode = ? AND seq BETWEEN ? AND ? ORDER BY seq ASC",
        (inode, span.seq_first, span.seq_last),
    )?;
    let mut rows = rows.into_iter().peekable();

    let mut copied = 0usize;
    let mut dst_pos = 0usize;

    for seq in span.seq_first..=span.seq_last {
        while let Some(row) = rows.peek() {
            let row_seq: u64 = row.get("seq").expect("projection includes seq");
            if row_seq < seq {
                rows.next();
            } else {
                break;
            }
        }

        let present: Option<Vec<u8>> = match rows.peek() {
            Some(row) => {
                let row_seq: u64 = row.get("seq").expect("projection includes seq");
                if row_seq == seq {
                    let mut row = rows.next().unwrap();
                    Some(row.take("data").expect("projection includes data"))
                } else {
                    None
                }
            }
            None => None,
        };

        let (local_offset, local_len) = if seq == span.seq_first && seq == span.seq_last {
            (span.offset_first, span.length_first)
        } else if seq == span.seq_first {
            (span.offset_first, span.length_first)
        } else if seq == span.seq_last {
            (0, span.length_last)
        } else {
            (0, BLOCK_SIZE)
        };

        if local_len == 0 {
            continue;
        }

        match present {
            Some(data) => {
                let row_len = data.len() as u64;
                if local_offset >= row_len {
                    // Sparse EOF: a present-but-short first block halts the
                    // read right here, returning what's been copied so far.
                    return Ok(copied);
                }
                let copy_len = local_len.min(row_len - local_offset) as usize;
                let start = local_offset as usize;
                buf[dst_pos..dst_pos + copy_len].copy_from_slice(&data[start..start + copy_len]);
                dst_pos += copy_len;
                copied += copy_len;
                if (copy_len as u64) < local_len {
                    // Row ran out before covering the rest of this block;
                    // the remainder reads back as zero, same as a hole, and
                    // the loop continues into later blocks.
                    let remainder = local_len as usize - copy_len;
                    for b in &mut buf[dst_pos..dst_pos + remainder] {
                        *b = 0;
                    }
                    dst_pos += remainder;
                    copied += remainder;
                }
            }
            None => {
                let copy_len = local_len as usize;
                // Hole: zero-filled, nothing to copy from — buf is already
                // zero-initialized by convention of read's caller, but don't
                // rely on that.
                for b in &mut buf[dst_pos..dst_pos + copy_len] {
                    *b = 0;
                }
                dst_pos += copy_len;
                copied += copy_len;
            }
        }
    }

    Ok(copied)
}

/// `write(inode, buf, offset)`. Returns total bytes written.
pub fn write(conn: &mut impl SqlExecutor, inode: u64, buf: &[u8], offset: u64) -> FsResult<usize> {
    let size = buf.len() as u64;
    if size == 0 {
        return Ok(0);
    }
    let span = block::split(offset, size);

    let mut written = 0usize;

    if span.single_block() {
        written += write_one_block(
            conn,
            inode,
            span.seq_first,
            &buf[..span.length_first as usize],
            span.offset_first,
        )?;
    } else {
        written += write_one_block(
            conn,
            inode,
            span.seq_first,
            &buf[..span.length_first as usize],
            span.offset_first,
        )?;

        let mut src_pos = span.length_first as usize;
        for seq in (span.seq_first + 1)..span.seq_last {
            let chunk = &buf[src_pos..src_pos + BLOCK_SIZE as usize];
            written += write_one_block(conn, inode, seq, chunk, 0)?;
            src_pos += BLOCK_SIZE as usize;
        }

        if span.length_last > 0 {
            let chunk = &buf[src_pos..src_pos + span.length_last as usize];
            written += write_one_block(conn, inode, span.seq_last, chunk, 0)?;
        }
    }

    clamp_size_after_write(conn, inode, offset, written as u64)?;
    Ok(written)
}

/// Writes one block's worth of data (possibly less than `BLOCK_SIZE`) at
/// `off_in_block` within block `seq`. Returns the number of bytes written
/// (always `data.len()`, or 0 if `data` is empty — the zero-length "last
/// block" case produced whenever a write lands exactly on a block boundary).
fn write_one_block(
    conn: &mut impl SqlExecutor,
    inode: u64,
    seq: u64,
    data: &[u8],
    off_in_block: u64,
) -> FsResult<usize> {
    if data.is_empty() {
        return Ok(0);
    }

    let current_len: Option<u64> = conn.exec_first(
        "SELECT LENGTH(data) FROM data_blocks WHERE inode = ? AND seq = ?",
        (inode, seq),
    )?;

    let current_len = match current_len {
        Some(len) => len,
        None => {
            conn.exec_drop(
                "INSERT INTO data_blocks (inode, seq, data) VALUES (?, ?, '')",
                (inode, seq),
            )?;
            0
        }
    };

    if off_in_block == 0 && current_len == 0 {
        conn.exec_drop(
            "UPDATE data_blocks SET data = ? WHERE inode = ? AND seq = ?",
            (data, inode, seq),
        )?;
    } else if off_in_block == current_len {
        conn.exec_drop(
            "UPDATE data_blocks SET data = CONCAT(data, ?) WHERE inode = ? AND seq = ?",
            (data, inode, seq),
        )?;
    } else {
        let end = off_in_block + data.len() as u64;
        if end < current_len {
            conn.exec_drop(
                "UPDATE data_blocks SET data = CONCAT(RPAD(data, ?, '\0'), ?, SUBSTRING(data FROM ?)) \
                 WHERE inode = ? AND seq = ?",
                (off_in_block, data, end + 1, inode, seq),
            )?;
        } else {
            conn.exec_drop(
                "UPDATE data_blocks SET data = CONCAT(RPAD(data, ?, '\0'), ?) WHERE inode = ? AND seq = ?",
                (off_in_block, data, inode, seq),
            )?;
        }
    }

    conn.exec_drop(
        "UPDATE inodes SET size = GREATEST(size, ( \
            SELECT seq * ? + LENGTH(data) FROM data_blocks \
            WHERE inode = ? AND seq = (SELECT MAX(seq) FROM data_blocks WHERE inode = ?) \
         )) WHERE inode = ?",
        (BLOCK_SIZE, inode, inode, inode),
    )?;

    Ok(data.len())
}

/// Final safety net after a whole `write` call: never let `inodes.size` end
/// up smaller than `offset + bytes_written`, regardless of what the
/// per-block recompute inside `write_one_block` landed on. See the data
/// engine's sparse-write note for why the per-block recompute alone isn't
/// always trustworthy.
fn clamp_size_after_write(conn: &mut impl SqlExecutor, inode: u64, offset: u64, written: u64) -> FsResult<()> {
    conn.exec_drop(
        "UPDATE inodes SET size = GREATEST(size, ?) WHERE inode = ?",
        (offset + written, inode),
    )?;
    Ok(())
}

/// `truncate(inode, length)`. Deletes blocks beyond the new end, pads the
/// boundary block with NULs to exactly `length`'s remainder, and sets
/// `inodes.size` unconditionally (truncate can grow the file too, leaving
/// an implicit hole).
pub fn truncate(conn: &mut impl SqlExecutor, inode: u64, length: u64) -> FsResult<()> {
    let span = block::split(length, 0);

    conn.exec_drop(
        "DELETE FROM data_blocks WHERE inode = ? AND seq > ?",
        (inode, span.seq_last),
    )?;
    conn.exec_drop(
        "UPDATE data_blocks SET data = RPAD(data, ?, '\0') WHERE inode = ? AND seq = ?",
        (span.length_last, inode, span.seq_last),
    )?;

    let now = crate::fs::stat::now();
    conn.exec_drop(
        "UPDATE inodes SET size = ?, mtime = ?, ctime = ? WHERE inode = ?",
        (length, now, now, inode),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_of_size_zero_is_a_no_op_without_touching_the_database() {
        // write() returns immediately on size == 0 before issuing any SQL,
        // so this is checked purely at the Rust level via the early return
        // in `write` (full coverage with a live server lives in
        // tests/data_engine_scenarios.rs).
        let span = block::split(0, 0);
        assert_eq!(span.length_first, 0);
        assert_eq!(span.length_last, 0);
    }
}
