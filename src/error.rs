//! Error taxonomy. Engine calls return one of the first three kinds;
//! the rest belong to the directory and image layers above it.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    /// A caller-side programming error: out-of-range inode, offset past
    /// the end of the file, malformed name. Retrying cannot help.
    #[error("invalid input")]
    InvalidInput,

    /// Not enough free data blocks to satisfy the request. The call
    /// left no trace; retry after a shrink or release.
    #[error("insufficient data blocks")]
    InsufficientDblocks,

    /// The inode table is exhausted.
    #[error("no free inode")]
    NoFreeInode,

    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("file exists")]
    AlreadyExists,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("file name too long")]
    NameTooLong,

    #[error("malformed file system image")]
    InvalidImage,

    #[error("image i/o failed")]
    Io(#[from] std::io::Error),
}
