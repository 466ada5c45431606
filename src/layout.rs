//! The size calculator: pure functions from a file size in bytes to the
//! number of blocks backing it. These are the only functions in the
//! crate that translate sizes to block counts.
//!
//! A file owns `data_blocks(size)` content blocks. The first [`NDIRECT`]
//! of them hang off the inode's direct slots; the rest are addressed
//! through a chain of index blocks, [`NINDIRECT`] pointers apiece.

use crate::param::{BSIZE, NDIRECT, NINDIRECT};

/// Content blocks holding a file of `size` bytes. 0 iff the file is empty.
pub const fn data_blocks(size: u64) -> u64 {
    (size + BSIZE as u64 - 1) / BSIZE as u64
}

/// Content blocks addressed through the index chain.
pub const fn indirect_data_blocks(size: u64) -> u64 {
    data_blocks(size).saturating_sub(NDIRECT as u64)
}

/// Index blocks needed to address the indirect content blocks.
pub const fn index_blocks(size: u64) -> u64 {
    (indirect_data_blocks(size) + NINDIRECT as u64 - 1) / NINDIRECT as u64
}

/// Every block a file of `size` bytes owns: content plus index.
pub const fn total_blocks_needed(size: u64) -> u64 {
    data_blocks(size) + index_blocks(size)
}
