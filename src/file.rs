//! Cursor-style handles over data files. A `File` is just an inode
//! number plus a byte position; the engine does the work, so a handle
//! stays cheap and carries no borrow of the file system.

use crate::error::{FsError, Result};
use crate::fs::{FileSystem, Ino};
use crate::inode::InodeType;
use crate::path::Path;
use crate::term::Terminal;

#[derive(Copy, Clone, Debug)]
pub enum SeekMode {
    /// From the start of the file.
    Set,
    /// From the current position.
    Current,
    /// From the end of the file.
    End,
}

#[derive(Copy, Clone, Debug)]
pub struct File {
    ino: Ino,
    pos: u64,
}

impl File {
    pub(crate) fn new(ino: Ino) -> File {
        File { ino, pos: 0 }
    }

    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Read into `buf` at the cursor, advancing it by the bytes read.
    pub fn read(&mut self, fs: &FileSystem, buf: &mut [u8]) -> Result<usize> {
        let n = fs.read_at(self.ino, self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Overwrite-or-extend at the cursor, advancing it past the bytes
    /// written. A failed write moves nothing.
    pub fn write(&mut self, fs: &mut FileSystem, data: &[u8]) -> Result<usize> {
        fs.write_at(self.ino, self.pos, data)?;
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    /// Move the cursor. The result is clamped to `[0, file_size]`.
    pub fn seek(&mut self, fs: &FileSystem, mode: SeekMode, delta: i64) -> Result<u64> {
        let size = fs.inode(self.ino)?.size;
        let base = match mode {
            SeekMode::Set => 0,
            SeekMode::Current => self.pos,
            SeekMode::End => size,
        };
        let target = base as i64 + delta;
        self.pos = target.clamp(0, size as i64) as u64;
        Ok(self.pos)
    }
}

impl Terminal {
    /// Open a data file by path. Directories cannot be opened.
    pub fn open(&self, path: &str) -> Result<File> {
        let ino = self.walk(Path::new(path))?;
        if self.fs().inode(ino)?.typ != InodeType::Data {
            return Err(FsError::IsADirectory);
        }
        Ok(File::new(ino))
    }
}
