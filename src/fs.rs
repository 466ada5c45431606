//! The file system value and its inode data engine.
//!
//! All content lives in the block pool; which blocks an inode owns is
//! fully determined by its size through the size calculator, in claim
//! order: direct slots first, then for each index block the block
//! itself followed by the data blocks it addresses. Claims hand out the
//! lowest free block, so the whole layout is deterministic.
//!
//! Mutating operations plan their allocations up front and check the
//! plan against the pool before touching anything; a call that fails
//! leaves the image byte-identical. Freeing walks the claim order
//! backwards.

use std::vec;

use log::debug;

use crate::block::BlockPool;
use crate::error::{FsError, Result};
use crate::inode::{Inode, InodeTable};
use crate::layout::{data_blocks, index_blocks, total_blocks_needed};
use crate::param::{BSIZE, NDIRECT, NINDIRECT, ROOTINO};

/// An inode number. Handed out by `claim_inode`, valid until released.
pub type Ino = u16;

pub struct FileSystem {
    pub(crate) blocks: BlockPool,
    pub(crate) inodes: InodeTable,
}

impl FileSystem {
    /// A fresh file system: every inode and block free except the root
    /// directory, which is born with its `.` and `..` entries.
    pub fn new(inode_count: u16, dblock_count: u16) -> FileSystem {
        assert!(dblock_count > 0, "no room for the root directory");
        let mut fs = FileSystem {
            blocks: BlockPool::new(dblock_count as usize),
            inodes: InodeTable::new(inode_count as usize),
        };
        fs.init_root().expect("root directory setup");
        fs
    }

    pub(crate) fn bare(blocks: BlockPool, inodes: InodeTable) -> FileSystem {
        FileSystem { blocks, inodes }
    }

    pub fn available_dblocks(&self) -> usize {
        self.blocks.available()
    }

    pub fn available_inodes(&self) -> usize {
        self.inodes.available()
    }

    pub fn claim_inode(&mut self) -> Result<Ino> {
        self.inodes.claim().ok_or(FsError::NoFreeInode)
    }

    /// Return an inode to the table. Its data must have been released.
    pub fn release_inode(&mut self, ino: Ino) -> Result<()> {
        if ino == ROOTINO || !self.inodes.is_live(ino) || self.inodes.get(ino).size != 0 {
            return Err(FsError::InvalidInput);
        }
        self.inodes.release(ino);
        Ok(())
    }

    /// Borrow a live inode's record.
    pub fn inode(&self, ino: Ino) -> Result<&Inode> {
        if !self.inodes.is_live(ino) {
            return Err(FsError::InvalidInput);
        }
        Ok(self.inodes.get(ino))
    }

    pub(crate) fn inode_mut(&mut self, ino: Ino) -> Result<&mut Inode> {
        if !self.inodes.is_live(ino) {
            return Err(FsError::InvalidInput);
        }
        Ok(self.inodes.get_mut(ino))
    }

    /// Resolve the block holding byte `off` of an inode's content:
    /// logical block `off / BSIZE` is a direct slot if below NDIRECT,
    /// otherwise entry `k % NINDIRECT` of the index block reached in
    /// `k / NINDIRECT` chain hops, where `k` counts past the direct
    /// slots. Never mutates.
    fn locate(&self, ino: Ino, off: u64) -> (u32, usize) {
        let inode = self.inodes.get(ino);
        debug_assert!(off < inode.size, "locate past end of file");
        let b = (off / BSIZE as u64) as usize;
        let r = (off % BSIZE as u64) as usize;
        if b < NDIRECT {
            return (inode.direct[b], r);
        }
        let k = b - NDIRECT;
        let mut idx = inode.indirect;
        for _ in 0..k / NINDIRECT {
            idx = self.blocks.link(idx);
        }
        (self.blocks.entry(idx, k % NINDIRECT), r)
    }

    /// Read up to `buf.len()` bytes starting at `off` into `buf`.
    /// Reading at or past the end of the file reads zero bytes.
    pub fn read_at(&self, ino: Ino, off: u64, buf: &mut [u8]) -> Result<usize> {
        let inode = self.inode(ino)?;
        if off >= inode.size {
            return Ok(0);
        }
        let n = (inode.size - off).min(buf.len() as u64) as usize;
        let mut tot = 0;
        while tot < n {
            let (phys, r) = self.locate(ino, off + tot as u64);
            let m = (BSIZE - r).min(n - tot);
            buf[tot..tot + m].copy_from_slice(&self.blocks.block(phys)[r..r + m]);
            tot += m;
        }
        Ok(tot)
    }

    /// Append `data` to the end of the inode's content, claiming data
    /// and index blocks as needed. All-or-nothing: if the pool cannot
    /// cover the whole request, nothing changes.
    pub fn append(&mut self, ino: Ino, data: &[u8]) -> Result<()> {
        let size = self.inode(ino)?.size;
        let new_size = size + data.len() as u64;

        let needed = total_blocks_needed(new_size) - total_blocks_needed(size);
        let plan = self
            .blocks
            .plan(needed as usize)
            .ok_or(FsError::InsufficientDblocks)?;
        let mut plan = plan.into_iter();

        // Free bytes in the current last block come first.
        let mut written = 0;
        let tail = (size % BSIZE as u64) as usize;
        if tail != 0 {
            let (phys, _) = self.locate(ino, size - 1);
            let m = (BSIZE - tail).min(data.len());
            self.blocks.block_mut(phys)[tail..tail + m].copy_from_slice(&data[..m]);
            written = m;
        }

        // Tail of the index chain, if the file already has one.
        let chain_len = index_blocks(size);
        let mut tail_index = self.inodes.get(ino).indirect;
        for _ in 1..chain_len {
            tail_index = self.blocks.link(tail_index);
        }

        // Claim fresh content blocks, opening or extending the chain as
        // logical block numbers pass NDIRECT. An index block is always
        // claimed before the data blocks recorded in it.
        let mut logical = data_blocks(size) as usize;
        while written < data.len() {
            let phys;
            if logical < NDIRECT {
                phys = self.claim_from(&mut plan);
                self.inodes.get_mut(ino).direct[logical] = phys;
            } else {
                let k = logical - NDIRECT;
                let slot = k % NINDIRECT;
                if k == 0 {
                    tail_index = self.claim_from(&mut plan);
                    self.inodes.get_mut(ino).indirect = tail_index;
                } else if slot == 0 {
                    let next = self.claim_from(&mut plan);
                    self.blocks.set_link(tail_index, next);
                    tail_index = next;
                }
                phys = self.claim_from(&mut plan);
                self.blocks.set_entry(tail_index, slot, phys);
            }
            let m = BSIZE.min(data.len() - written);
            self.blocks.block_mut(phys)[..m].copy_from_slice(&data[written..written + m]);
            written += m;
            logical += 1;
        }
        debug_assert!(plan.next().is_none(), "allocation plan not consumed");

        self.inodes.get_mut(ino).size = new_size;
        debug!("append ino={} n={} size {}->{}", ino, data.len(), size, new_size);
        Ok(())
    }

    fn claim_from(&mut self, plan: &mut vec::IntoIter<u32>) -> u32 {
        let b = plan.next().expect("allocation plan exhausted");
        self.blocks.claim_planned(b);
        b
    }

    /// Overwrite `data.len()` bytes starting at `off`, extending the
    /// file when the range runs past the current end. `off` itself must
    /// not. The size only ever grows: an in-bounds overwrite leaves it
    /// untouched.
    pub fn write_at(&mut self, ino: Ino, off: u64, data: &[u8]) -> Result<()> {
        let size = self.inode(ino)?.size;
        if off > size {
            return Err(FsError::InvalidInput);
        }
        let overlap = (size - off).min(data.len() as u64) as usize;
        let extend = data.len() - overlap;

        // Feasibility first: the overlap region must not be touched on
        // an INSUFFICIENT_DBLOCKS return.
        let needed = total_blocks_needed(size + extend as u64) - total_blocks_needed(size);
        if needed as usize > self.blocks.available() {
            return Err(FsError::InsufficientDblocks);
        }

        let mut tot = 0;
        while tot < overlap {
            let (phys, r) = self.locate(ino, off + tot as u64);
            let m = (BSIZE - r).min(overlap - tot);
            self.blocks.block_mut(phys)[r..r + m].copy_from_slice(&data[tot..tot + m]);
            tot += m;
        }

        if extend > 0 {
            self.append(ino, &data[overlap..])?;
        }
        Ok(())
    }

    /// Cut the file down to `new_size` bytes, releasing every block no
    /// longer needed in exact reverse claim order: the last data block
    /// first, then backwards, with each index block released once the
    /// data blocks it addressed are gone.
    pub fn shrink(&mut self, ino: Ino, new_size: u64) -> Result<()> {
        let size = self.inode(ino)?.size;
        if new_size > size {
            return Err(FsError::InvalidInput);
        }

        let owned = self.owned_blocks(ino);
        let keep = total_blocks_needed(new_size) as usize;
        for b in owned[keep..].iter().rev() {
            self.blocks.release(*b);
        }

        // Vacated pointers go back to zero: direct slots, the chain
        // root when the whole chain is gone, and the surviving tail
        // index block's spare entries and link otherwise.
        let chain_len = index_blocks(new_size);
        if chain_len == 0 {
            self.inodes.get_mut(ino).indirect = 0;
        } else {
            let mut tail = self.inodes.get(ino).indirect;
            for _ in 1..chain_len {
                tail = self.blocks.link(tail);
            }
            let live = data_blocks(new_size) as usize - NDIRECT - (chain_len as usize - 1) * NINDIRECT;
            for slot in live..NINDIRECT {
                self.blocks.set_entry(tail, slot, 0);
            }
            self.blocks.set_link(tail, 0);
        }
        let inode = self.inodes.get_mut(ino);
        for slot in data_blocks(new_size) as usize..NDIRECT {
            inode.direct[slot] = 0;
        }
        inode.size = new_size;
        debug!("shrink ino={} size {}->{}", ino, size, new_size);
        Ok(())
    }

    /// Drop all content. The inode record itself stays claimed.
    pub fn release_data(&mut self, ino: Ino) -> Result<()> {
        self.shrink(ino, 0)
    }

    /// Every block the inode owns, in the order it was claimed: direct
    /// slots, then each index block followed by the data blocks it
    /// addresses.
    pub fn owned_blocks(&self, ino: Ino) -> Vec<u32> {
        let inode = self.inodes.get(ino);
        let total = data_blocks(inode.size);
        let mut owned = Vec::with_capacity(total_blocks_needed(inode.size) as usize);
        for slot in 0..total.min(NDIRECT as u64) as usize {
            owned.push(inode.direct[slot]);
        }
        let mut remaining = total.saturating_sub(NDIRECT as u64) as usize;
        let mut idx = inode.indirect;
        while remaining > 0 {
            owned.push(idx);
            for slot in 0..remaining.min(NINDIRECT) {
                owned.push(self.blocks.entry(idx, slot));
            }
            remaining -= remaining.min(NINDIRECT);
            idx = self.blocks.link(idx);
        }
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(dblocks: u16) -> (FileSystem, Ino) {
        let mut fs = FileSystem::new(8, dblocks);
        let ino = fs.claim_inode().unwrap();
        (fs, ino)
    }

    fn bytes(range: core::ops::Range<usize>) -> Vec<u8> {
        range.map(|v| v as u8).collect()
    }

    #[test]
    fn append_packs_direct_slots_first() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..200)).unwrap();
        let inode = fs.inode(ino).unwrap();
        assert_eq!(inode.size, 200);
        assert_eq!(inode.indirect, 0);
        assert_eq!(fs.owned_blocks(ino).len(), 4);

        let mut buf = vec![0; 200];
        assert_eq!(fs.read_at(ino, 0, &mut buf).unwrap(), 200);
        assert_eq!(buf, bytes(0..200));
    }

    #[test]
    fn append_fills_the_tail_before_claiming() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..10)).unwrap();
        let before = fs.available_dblocks();
        fs.append(ino, &bytes(10..54)).unwrap();
        // 54 bytes still fit in the first block.
        assert_eq!(fs.available_dblocks(), before);

        let mut buf = vec![0; 54];
        fs.read_at(ino, 0, &mut buf).unwrap();
        assert_eq!(buf, bytes(0..54));
    }

    #[test]
    fn crossing_the_direct_boundary_claims_the_index_block_first() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..256)).unwrap();
        let planned = fs.blocks.plan(2).unwrap();
        fs.append(ino, &[0xee; 64]).unwrap();
        let inode = fs.inode(ino).unwrap();
        // The first planned block became the index block, the second
        // the data block it addresses.
        assert_eq!(inode.indirect, planned[0]);
        assert_eq!(fs.blocks.entry(inode.indirect, 0), planned[1]);
    }

    #[test]
    fn reads_are_clamped_and_offset_reads_work() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..100)).unwrap();
        let mut buf = vec![0; 64];
        assert_eq!(fs.read_at(ino, 90, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], &bytes(90..100)[..]);
        assert_eq!(fs.read_at(ino, 100, &mut buf).unwrap(), 0);
        assert_eq!(fs.read_at(ino, 4000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn failed_append_leaves_no_trace() {
        let (mut fs, ino) = fresh(4);
        // Root holds one block; 3 free. 200 bytes need 4.
        assert_eq!(fs.available_dblocks(), 3);
        assert!(matches!(
            fs.append(ino, &bytes(0..200)),
            Err(FsError::InsufficientDblocks)
        ));
        assert_eq!(fs.available_dblocks(), 3);
        assert_eq!(fs.inode(ino).unwrap().size, 0);
    }

    #[test]
    fn write_at_rejects_offsets_past_the_end() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..10)).unwrap();
        assert!(matches!(
            fs.write_at(ino, 11, &[1]),
            Err(FsError::InvalidInput)
        ));
    }

    #[test]
    fn in_bounds_overwrite_keeps_the_size() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..200)).unwrap();
        fs.write_at(ino, 64, &[0xaa; 64]).unwrap();
        assert_eq!(fs.inode(ino).unwrap().size, 200);

        let mut buf = vec![0; 200];
        fs.read_at(ino, 0, &mut buf).unwrap();
        assert_eq!(&buf[64..128], &[0xaa; 64][..]);
        assert_eq!(&buf[..64], &bytes(0..64)[..]);
        assert_eq!(&buf[128..], &bytes(128..200)[..]);
    }

    #[test]
    fn write_at_extends_past_the_end() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..100)).unwrap();
        fs.write_at(ino, 90, &bytes(0..30)).unwrap();
        assert_eq!(fs.inode(ino).unwrap().size, 120);
        let mut buf = vec![0; 30];
        fs.read_at(ino, 90, &mut buf).unwrap();
        assert_eq!(buf, bytes(0..30));
    }

    #[test]
    fn shrink_releases_in_reverse_claim_order() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &bytes(0..200)).unwrap();
        let owned = fs.owned_blocks(ino);
        let before = fs.available_dblocks();
        fs.shrink(ino, 64).unwrap();
        assert_eq!(fs.available_dblocks(), before + 3);

        let inode = fs.inode(ino).unwrap();
        assert_eq!(inode.size, 64);
        assert_eq!(inode.direct[0], owned[0]);
        assert_eq!(&inode.direct[1..], &[0, 0, 0]);
        // Freed blocks are claimed back lowest-first.
        let mut freed = owned[1..].to_vec();
        freed.sort_unstable();
        assert_eq!(fs.blocks.plan(3).unwrap(), freed);
    }

    #[test]
    fn release_data_empties_the_inode() {
        let (mut fs, ino) = fresh(64);
        fs.append(ino, &vec![7; 1000]).unwrap();
        let before_root = fs.available_dblocks();
        fs.release_data(ino).unwrap();
        let inode = fs.inode(ino).unwrap();
        assert_eq!(inode.size, 0);
        assert_eq!(inode.direct, [0; NDIRECT]);
        assert_eq!(inode.indirect, 0);
        assert_eq!(
            fs.available_dblocks(),
            before_root + total_blocks_needed(1000) as usize
        );
    }

    #[test]
    fn released_inodes_are_invalid_input() {
        let (mut fs, ino) = fresh(16);
        fs.release_inode(ino).unwrap();
        assert!(matches!(fs.inode(ino), Err(FsError::InvalidInput)));
        assert!(matches!(
            fs.append(ino, &[1]),
            Err(FsError::InvalidInput)
        ));
    }

    #[test]
    fn release_inode_requires_released_data() {
        let (mut fs, ino) = fresh(16);
        fs.append(ino, &[1, 2, 3]).unwrap();
        assert!(matches!(fs.release_inode(ino), Err(FsError::InvalidInput)));
        fs.release_data(ino).unwrap();
        fs.release_inode(ino).unwrap();
    }
}
