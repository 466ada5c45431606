//! Inodes.
//!
//! An inode is a fixed-size record describing one file or directory:
//! its type, permission bits, name, byte size, and the block pointers
//! holding its content. The first NDIRECT content blocks hang off the
//! `direct` slots; everything past them is addressed through the index
//! chain rooted at `indirect`.
//!
//! Pointer values are not self-describing: block 0 is a legal content
//! block, so a zero slot does not by itself mean "unused". How many
//! slots and chain entries are live is always derived from `size`
//! through the size calculator.

use core::fmt;

use arrayvec::ArrayVec;
use bitflags::bitflags;
use log::trace;
use static_assertions::const_assert;

use crate::bitmap::Bitmap;
use crate::error::{FsError, Result};
use crate::le;
use crate::param::{DIRSIZ, NDIRECT, ROOTINO};

bitflags! {
    /// Permission bits carried in the inode record. Stored, not enforced.
    pub struct Perm: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum InodeType {
    Data = 0,
    Dir = 1,
}

impl InodeType {
    pub(crate) fn from_u8(v: u8) -> Option<InodeType> {
        match v {
            0 => Some(InodeType::Data),
            1 => Some(InodeType::Dir),
            _ => None,
        }
    }
}

/// A file name: 1..=DIRSIZ bytes, no NUL and no '/'. The root
/// directory's record alone carries the empty name.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FileName {
    bytes: ArrayVec<u8, DIRSIZ>,
}

impl FileName {
    pub fn new(name: &str) -> Result<FileName> {
        if name.is_empty() || name.bytes().any(|b| b == 0 || b == b'/') {
            return Err(FsError::InvalidInput);
        }
        let mut bytes = ArrayVec::new();
        bytes
            .try_extend_from_slice(name.as_bytes())
            .map_err(|_| FsError::NameTooLong)?;
        Ok(FileName { bytes })
    }

    /// Decode the name field of a record: bytes up to the first NUL,
    /// or all DIRSIZ bytes if none.
    pub(crate) fn from_record(field: &[u8; DIRSIZ]) -> FileName {
        let len = field.iter().position(|b| *b == 0).unwrap_or(DIRSIZ);
        let mut bytes = ArrayVec::new();
        bytes.extend(field[..len].iter().copied());
        FileName { bytes }
    }

    /// Encode as a record field: truncated to DIRSIZ, zero-padded.
    pub(crate) fn to_record(&self) -> [u8; DIRSIZ] {
        let mut field = [0; DIRSIZ];
        field[..self.bytes.len()].copy_from_slice(&self.bytes);
        field
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(&self.bytes).fmt(f)
    }
}

/// Byte length of an inode record in the image: type, perms, name,
/// size u64, NDIRECT direct pointers u16, indirect pointer u16.
pub(crate) const INODE_RECORD_SIZE: usize = 2 + DIRSIZ + 8 + 2 * NDIRECT + 2;

const_assert!(INODE_RECORD_SIZE == 34);

#[derive(Clone, Debug)]
pub struct Inode {
    pub typ: InodeType,
    pub perm: Perm,
    pub name: FileName,
    pub size: u64,
    pub direct: [u32; NDIRECT],
    pub indirect: u32,
}

impl Inode {
    pub(crate) fn empty() -> Inode {
        Inode {
            typ: InodeType::Data,
            perm: Perm::empty(),
            name: FileName {
                bytes: ArrayVec::new(),
            },
            size: 0,
            direct: [0; NDIRECT],
            indirect: 0,
        }
    }

    pub(crate) fn write_record(&self, out: &mut [u8]) {
        out[0] = self.typ as u8;
        out[1] = self.perm.bits();
        out[2..2 + DIRSIZ].copy_from_slice(&self.name.to_record());
        le::write_u64(&mut out[16..], self.size);
        for (i, d) in self.direct.iter().enumerate() {
            le::write_u16(&mut out[24 + 2 * i..], *d as u16);
        }
        le::write_u16(&mut out[32..], self.indirect as u16);
    }

    pub(crate) fn read_record(record: &[u8]) -> Result<Inode> {
        let typ = InodeType::from_u8(record[0]).ok_or(FsError::InvalidImage)?;
        let perm = Perm::from_bits(record[1]).ok_or(FsError::InvalidImage)?;
        let mut name_field = [0; DIRSIZ];
        name_field.copy_from_slice(&record[2..2 + DIRSIZ]);
        let mut direct = [0; NDIRECT];
        for (i, d) in direct.iter_mut().enumerate() {
            *d = le::read_u16(&record[24 + 2 * i..]) as u32;
        }
        Ok(Inode {
            typ,
            perm,
            name: FileName::from_record(&name_field),
            size: le::read_u64(&record[16..]),
            direct,
            indirect: le::read_u16(&record[32..]) as u32,
        })
    }
}

/// The fixed inode table plus its free bitmap. Inode 0 is the root
/// directory: live from birth, never handed out by `claim`.
pub struct InodeTable {
    inodes: Vec<Inode>,
    freemap: Bitmap,
}

impl InodeTable {
    pub fn new(count: usize) -> InodeTable {
        assert!(count > 0, "inode table needs room for the root");
        let mut freemap = Bitmap::new(count);
        freemap.clear(ROOTINO as usize);
        let mut inodes = vec![Inode::empty(); count];
        inodes[ROOTINO as usize].typ = InodeType::Dir;
        inodes[ROOTINO as usize].perm = Perm::all();
        InodeTable { inodes, freemap }
    }

    pub fn count(&self) -> usize {
        self.inodes.len()
    }

    pub fn available(&self) -> usize {
        self.freemap.free_count()
    }

    pub fn is_live(&self, i: u16) -> bool {
        (i as usize) < self.inodes.len() && !self.freemap.get(i as usize)
    }

    /// Reserve the lowest-indexed free inode, reset to an empty record.
    pub fn claim(&mut self) -> Option<u16> {
        let i = self.freemap.first_free()?;
        self.freemap.clear(i);
        self.inodes[i] = Inode::empty();
        trace!("claim inode {}", i);
        Some(i as u16)
    }

    /// Return an inode to the table. The caller must have released its
    /// data first; the record is wiped.
    pub fn release(&mut self, i: u16) {
        assert_ne!(i, ROOTINO, "releasing the root");
        debug_assert!(self.is_live(i), "releasing a free inode");
        self.inodes[i as usize] = Inode::empty();
        self.freemap.set(i as usize);
        trace!("release inode {}", i);
    }

    pub fn get(&self, i: u16) -> &Inode {
        &self.inodes[i as usize]
    }

    pub fn get_mut(&mut self, i: u16) -> &mut Inode {
        &mut self.inodes[i as usize]
    }

    /// The inode the next `claim` will hand out, `None` when full.
    pub(crate) fn next_free(&self) -> Option<u16> {
        self.freemap.first_free().map(|i| i as u16)
    }

    pub(crate) fn freemap_bytes(&self) -> &[u8] {
        self.freemap.as_bytes()
    }

    pub(crate) fn from_image(inodes: Vec<Inode>, freemap: Bitmap) -> InodeTable {
        InodeTable { inodes, freemap }
    }
}
