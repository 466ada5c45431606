//! The file system image, reproduced bit-exactly for interchange:
//!
//! ```text
//! [ header | free-inode bitmap | free-dblock bitmap | inode table | blocks ]
//! ```
//!
//! The header is four little-endian u16 fields: inode count, block
//! count, and the claim cursors (the index the next inode/block claim
//! would hand out, or the count when nothing is free). Since claims
//! are lowest-free-first, the cursors are derived state; a load
//! rejects an image whose cursors disagree with its bitmaps.
//!
//! Inode records are 34 bytes: type u8, perms u8, name (14 bytes,
//! zero-padded, unterminated when full), size u64 LE, four direct
//! pointers u16 LE, indirect pointer u16 LE. Released records are
//! wiped, so they serialize as zeros.

use std::io::{Read, Write};

use crate::bitmap::Bitmap;
use crate::block::{Block, BlockPool};
use crate::error::{FsError, Result};
use crate::fs::FileSystem;
use crate::inode::{Inode, InodeTable, InodeType, INODE_RECORD_SIZE};
use crate::layout::total_blocks_needed;
use crate::le;
use crate::param::{BSIZE, ROOTINO};

const HEADER_SIZE: usize = 8;

impl FileSystem {
    /// Serialize the whole file system.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut header = [0; HEADER_SIZE];
        le::write_u16(&mut header[0..], self.inodes.count() as u16);
        le::write_u16(&mut header[2..], self.blocks.count() as u16);
        le::write_u16(
            &mut header[4..],
            self.inodes.next_free().unwrap_or(self.inodes.count() as u16),
        );
        le::write_u16(
            &mut header[6..],
            self.blocks
                .next_free()
                .unwrap_or(self.blocks.count() as u32) as u16,
        );
        w.write_all(&header)?;
        w.write_all(self.inodes.freemap_bytes())?;
        w.write_all(self.blocks.freemap_bytes())?;

        let mut record = [0; INODE_RECORD_SIZE];
        for i in 0..self.inodes.count() {
            self.inodes.get(i as u16).write_record(&mut record);
            w.write_all(&record)?;
        }
        for b in 0..self.blocks.count() {
            w.write_all(self.blocks.block(b as u32))?;
        }
        Ok(())
    }

    /// Rebuild a file system from an image, validating its shape.
    pub fn load<R: Read>(r: &mut R) -> Result<FileSystem> {
        let mut header = [0; HEADER_SIZE];
        r.read_exact(&mut header)?;
        let inode_count = le::read_u16(&header[0..]) as usize;
        let dblock_count = le::read_u16(&header[2..]) as usize;
        let inode_cursor = le::read_u16(&header[4..]) as usize;
        let dblock_cursor = le::read_u16(&header[6..]) as usize;
        if inode_count == 0 || dblock_count == 0 {
            return Err(FsError::InvalidImage);
        }

        let mut inode_bits = vec![0; (inode_count + 7) / 8];
        r.read_exact(&mut inode_bits)?;
        let inode_map =
            Bitmap::from_bytes(&inode_bits, inode_count).ok_or(FsError::InvalidImage)?;
        let mut dblock_bits = vec![0; (dblock_count + 7) / 8];
        r.read_exact(&mut dblock_bits)?;
        let dblock_map =
            Bitmap::from_bytes(&dblock_bits, dblock_count).ok_or(FsError::InvalidImage)?;

        // The cursors carry no state of their own; they just have to
        // agree with the bitmaps.
        if inode_cursor != inode_map.first_free().unwrap_or(inode_count)
            || dblock_cursor != dblock_map.first_free().unwrap_or(dblock_count)
        {
            return Err(FsError::InvalidImage);
        }
        if inode_map.get(ROOTINO as usize) {
            return Err(FsError::InvalidImage);
        }

        let mut inodes = Vec::with_capacity(inode_count);
        let mut record = [0; INODE_RECORD_SIZE];
        for i in 0..inode_count {
            r.read_exact(&mut record)?;
            let inode = Inode::read_record(&record)?;
            if !inode_map.get(i) && total_blocks_needed(inode.size) > dblock_count as u64 {
                return Err(FsError::InvalidImage);
            }
            inodes.push(inode);
        }
        if inodes[ROOTINO as usize].typ != InodeType::Dir {
            return Err(FsError::InvalidImage);
        }

        let mut blocks: Vec<Block> = Vec::with_capacity(dblock_count);
        for _ in 0..dblock_count {
            let mut block = [0; BSIZE];
            r.read_exact(&mut block)?;
            blocks.push(block);
        }

        Ok(FileSystem::bare(
            BlockPool::from_image(blocks, dblock_map),
            InodeTable::from_image(inodes, inode_map),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::Perm;
    use crate::term::Terminal;

    fn populated() -> FileSystem {
        let mut t = Terminal::new(FileSystem::new(8, 32));
        t.new_directory("/d").unwrap();
        t.new_file("/d/f", Perm::READ | Perm::WRITE).unwrap();
        let ino = t.walk(crate::path::Path::new("/d/f")).unwrap();
        let data: Vec<u8> = (0..400).map(|v| v as u8).collect();
        t.fs_mut().append(ino, &data).unwrap();
        t.into_fs()
    }

    #[test]
    fn image_layout_is_exact() {
        let fs = FileSystem::new(8, 4);
        let mut img = Vec::new();
        fs.save(&mut img).unwrap();
        assert_eq!(img.len(), 8 + 1 + 1 + 8 * 34 + 4 * 64);
        // counts, then cursors: inode 1 is next, block 1 is next (the
        // root's entry block took block 0).
        assert_eq!(&img[..8], &[8, 0, 4, 0, 1, 0, 1, 0]);
        // Inode freemap: root in use. Dblock freemap: block 0 in use.
        assert_eq!(img[8], 0b1111_1110);
        assert_eq!(img[9], 0b1110);
    }

    #[test]
    fn save_load_save_is_bit_identical() {
        let fs = populated();
        let mut img = Vec::new();
        fs.save(&mut img).unwrap();
        let loaded = FileSystem::load(&mut img.as_slice()).unwrap();
        let mut img2 = Vec::new();
        loaded.save(&mut img2).unwrap();
        assert_eq!(img, img2);
        assert_eq!(loaded.available_dblocks(), fs.available_dblocks());
        assert_eq!(loaded.available_inodes(), fs.available_inodes());
    }

    #[test]
    fn loaded_trees_are_usable() {
        let fs = populated();
        let mut img = Vec::new();
        fs.save(&mut img).unwrap();
        let loaded = FileSystem::load(&mut img.as_slice()).unwrap();
        let t = Terminal::new(loaded);
        let ino = t.walk(crate::path::Path::new("/d/f")).unwrap();
        let mut buf = vec![0; 400];
        assert_eq!(t.fs().read_at(ino, 0, &mut buf).unwrap(), 400);
        assert!(buf.iter().enumerate().all(|(i, v)| *v == i as u8));
    }

    #[test]
    fn truncated_and_corrupt_images_are_rejected() {
        let fs = populated();
        let mut img = Vec::new();
        fs.save(&mut img).unwrap();

        let truncated = &img[..img.len() - 1];
        assert!(FileSystem::load(&mut &truncated[..]).is_err());

        // A cursor that disagrees with the bitmap.
        let mut bad = img.clone();
        bad[6] = 0;
        assert!(matches!(
            FileSystem::load(&mut bad.as_slice()),
            Err(FsError::InvalidImage)
        ));

        // A root that is not a directory. The inode table starts after
        // the 8-byte header, 1 bitmap byte for 8 inodes, and 4 bitmap
        // bytes for 32 blocks.
        let mut bad = img;
        bad[8 + 1 + 4] = 0;
        assert!(matches!(
            FileSystem::load(&mut bad.as_slice()),
            Err(FsError::InvalidImage)
        ));
    }
}
