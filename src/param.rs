//! File system geometry. Everything else is derived from these.

use core::mem;

/// Block size.
pub const BSIZE: usize = 64;

/// Direct data-block slots per inode.
pub const NDIRECT: usize = 4;

/// Data-block pointers per index block. The last entry of an index
/// block is not a data pointer but a link to the next index block.
pub const NINDIRECT: usize = BSIZE / mem::size_of::<u32>() - 1;

/// Byte offset of the chain link inside an index block.
pub const NEXT_OFFSET: usize = BSIZE - mem::size_of::<u32>();

/// Maximum length of a file name, in bytes.
pub const DIRSIZ: usize = 14;

/// Root directory i-number. Fixed at creation, never claimed or released.
pub const ROOTINO: u16 = 0;
