//! Directories are ordinary files whose payload is a sequence of
//! fixed-width entries: a 16-bit little-endian inode index followed by
//! the name, truncated to DIRSIZ bytes and zero-padded. An all-zero
//! record is a tombstone, free for reuse.
//!
//! Tombstone reuse overwrites in place through `write_at`, which never
//! changes the file size for an in-bounds write; only a directory with
//! no tombstones grows.
//!
//! `inum` 0 is the root, which is a legal target (`.` and `..` in the
//! root point there), so a tombstone is recognized by the whole record
//! being zero, never by its index alone.

use core::mem;

use log::debug;
use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{FsError, Result};
use crate::fs::{FileSystem, Ino};
use crate::inode::{FileName, InodeType};
use crate::param::{DIRSIZ, ROOTINO};

/// Size of one directory entry.
pub const DIRENT_SIZE: usize = mem::size_of::<Dirent>();

const_assert!(DIRENT_SIZE == 16);

#[repr(C)]
#[derive(Copy, Clone, Default, AsBytes, FromBytes)]
pub struct Dirent {
    /// Target inode index, little-endian.
    inum: u16,
    name: [u8; DIRSIZ],
}

impl Dirent {
    pub fn new(ino: Ino, name: &FileName) -> Dirent {
        Dirent {
            inum: ino.to_le(),
            name: name.to_record(),
        }
    }

    pub fn ino(&self) -> Ino {
        u16::from_le(self.inum)
    }

    pub fn name(&self) -> FileName {
        FileName::from_record(&self.name)
    }

    pub fn is_tombstone(&self) -> bool {
        self.inum == 0 && self.name == [0; DIRSIZ]
    }
}

impl FileSystem {
    /// Give the newborn root its `.` and `..` entries, both pointing at
    /// itself.
    pub(crate) fn init_root(&mut self) -> Result<()> {
        let dot = FileName::new(".")?;
        let dotdot = FileName::new("..")?;
        let mut payload = [0; 2 * DIRENT_SIZE];
        payload[..DIRENT_SIZE].copy_from_slice(Dirent::new(ROOTINO, &dot).as_bytes());
        payload[DIRENT_SIZE..].copy_from_slice(Dirent::new(ROOTINO, &dotdot).as_bytes());
        self.append(ROOTINO, &payload)
    }

    fn dirent_at(&self, dir: Ino, off: u64) -> Result<Dirent> {
        let mut de = Dirent::default();
        let n = self.read_at(dir, off, de.as_bytes_mut())?;
        if n != DIRENT_SIZE {
            return Err(FsError::InvalidInput);
        }
        Ok(de)
    }

    fn require_dir(&self, dir: Ino) -> Result<u64> {
        let inode = self.inode(dir)?;
        if inode.typ != InodeType::Dir {
            return Err(FsError::NotADirectory);
        }
        Ok(inode.size)
    }

    /// Look a name up in a directory. Returns the target inode and the
    /// byte offset of the entry.
    pub fn dirlookup(&self, dir: Ino, name: &FileName) -> Result<(Ino, u64)> {
        let size = self.require_dir(dir)?;
        for off in (0..size).step_by(DIRENT_SIZE) {
            let de = self.dirent_at(dir, off)?;
            if !de.is_tombstone() && de.name() == *name {
                return Ok((de.ino(), off));
            }
        }
        Err(FsError::NotFound)
    }

    /// Write a new entry `(ino, name)` into a directory, reusing the
    /// first tombstone if there is one and appending otherwise.
    pub fn dirlink(&mut self, dir: Ino, name: &FileName, ino: Ino) -> Result<()> {
        let size = self.require_dir(dir)?;
        if self.dirlookup(dir, name).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let mut off = size;
        for cand in (0..size).step_by(DIRENT_SIZE) {
            if self.dirent_at(dir, cand)?.is_tombstone() {
                off = cand;
                break;
            }
        }
        debug!("dirlink {} -> ino {} in dir {} at {}", name, ino, dir, off);
        self.write_at(dir, off, Dirent::new(ino, name).as_bytes())
    }

    /// Remove a name from a directory by overwriting its entry with a
    /// tombstone. Returns the inode the entry pointed at.
    pub fn dirunlink(&mut self, dir: Ino, name: &FileName) -> Result<Ino> {
        let (ino, off) = self.dirlookup(dir, name)?;
        self.write_at(dir, off, &[0; DIRENT_SIZE])?;
        debug!("dirunlink {} from dir {}", name, dir);
        Ok(ino)
    }

    /// Live entries of a directory, `.` and `..` included.
    pub fn read_dir(&self, dir: Ino) -> Result<Vec<(Ino, FileName)>> {
        let size = self.require_dir(dir)?;
        let mut entries = Vec::new();
        for off in (0..size).step_by(DIRENT_SIZE) {
            let de = self.dirent_at(dir, off)?;
            if !de.is_tombstone() {
                entries.push((de.ino(), de.name()));
            }
        }
        Ok(entries)
    }

    /// Is the directory empty except for `.` and `..`?
    pub fn is_dir_empty(&self, dir: Ino) -> Result<bool> {
        Ok(self
            .read_dir(dir)?
            .iter()
            .all(|(_, name)| name.as_bytes() == b"." || name.as_bytes() == b".."))
    }
}
