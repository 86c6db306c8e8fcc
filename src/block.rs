//! Block Arithmetic
//!
//! Pure mapping from a byte-range `(offset, size)` to the sequence numbers and
//! per-block lengths of the fixed-size `data_blocks` rows it touches. Nothing
//! here talks to the database; it exists so the data engine can be tested
//! without one.

/// Fixed content-block size, in bytes. Matches `data_blocks.data`'s cap.
pub const BLOCK_SIZE: u64 = 4096;

/// The first/last block coordinates touched by a `(offset, size)` byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub seq_first: u64,
    pub offset_first: u64,
    pub length_first: u64,
    pub seq_last: u64,
    pub length_last: u64,
}

impl Span {
    /// Whether the range fits entirely inside a single block.
    pub fn single_block(&self) -> bool {
        self.seq_first == self.seq_last
    }
}

/// Compute the block span for a byte range starting at `offset` and `size`
/// bytes long. `size == 0` is valid and yields a degenerate span used by
/// `truncate` to locate the boundary block.
pub fn split(offset: u64, size: u64) -> Span {
    let seq_first = offset / BLOCK_SIZE;
    let offset_first = offset % BLOCK_SIZE;
    let n_following = (offset_first + size) / BLOCK_SIZE;
    let length_first = if n_following > 0 {
        BLOCK_SIZE - offset_first
    } else {
        size
    };
    let seq_last = seq_first + n_following;
    let length_last = (offset_first + size) % BLOCK_SIZE;

    Span {
        seq_first,
        offset_first,
        length_first,
        seq_last,
        length_last,
    }
}
