//! memfs: an in-memory UNIX-style file system. Five layers:
//!   + Blocks: a fixed pool of 64-byte data blocks with a free bitmap.
//!   + Inodes: a fixed table of file records with a free bitmap.
//!   + Files: block-chain navigation, reading, writing, shrinking.
//!   + Directories: files whose payload is a list of 16-byte entries.
//!   + Names: paths like /usr/rtm/notes for convenient naming.
//!
//! The whole file system is one exclusively owned value; operations
//! mutate it in place and are never interleaved. All storage is
//! reserved up front when the value is created.
//!
//! Every size-to-block-count translation goes through [`layout`], and
//! every mutating operation checks feasibility against the free count
//! before touching state, so a failed call leaves the image
//! byte-identical to what it was.

mod bitmap;
mod block;
mod dirent;
mod error;
mod file;
mod fs;
mod image;
mod inode;
mod le;
pub mod layout;
pub mod param;
mod path;
mod term;

pub use dirent::{Dirent, DIRENT_SIZE};
pub use error::{FsError, Result};
pub use file::{File, SeekMode};
pub use fs::{FileSystem, Ino};
pub use inode::{FileName, Inode, InodeType, Perm};
pub use path::Path;
pub use term::{Entry, Terminal};
